use crate::algebra::operator::Operator;
use crate::algebra::value::{format_number, Environment, Value, ValueType, MAX_SAFE_INTEGER};
use crate::dialect::SqlDialect;
use crate::utils::error::{AlgebraError, QuarryError, QuarryResult};
use crate::utils::helpers::safe_add;
use regex::Regex;
use std::cmp::Ordering;

/// An immutable operator-tree node.
///
/// Children are acquired at construction and never replaced, so sharing a
/// node across queries is always safe and no cycles can form. Equality is
/// structural. Simplification returns a new node (or the node itself when
/// already simplest), it never mutates.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    operator: Operator,
    operand: Option<Box<Expression>>,
    secondary: Option<Box<Expression>>,
    result_type: ValueType,
}

impl Expression {
    /// Type-checked construction. Fails when the operand arity or type tags
    /// are outside the operator's declared accepted sets.
    pub fn new(
        operator: Operator,
        operand: Option<Expression>,
        secondary: Option<Expression>,
    ) -> Result<Expression, AlgebraError> {
        let expected = operator.operand_count();
        let actual = operand.iter().count() + secondary.iter().count();
        if actual != expected || (expected == 1 && operand.is_none()) {
            return Err(AlgebraError::WrongArity {
                operator: operator.name().to_string(),
                expected,
                actual,
            });
        }

        if let Some(op) = &operand {
            let accepted = operator.accepted_operand_types();
            if !accepted.contains(&op.result_type) {
                return Err(AlgebraError::TypeMismatch {
                    operator: operator.name().to_string(),
                    position: "primary",
                    actual: op.result_type.label().to_string(),
                });
            }
        }
        if let Some(sec) = &secondary {
            let accepted = operator.accepted_secondary_types();
            if !accepted.contains(&sec.result_type) {
                return Err(AlgebraError::TypeMismatch {
                    operator: operator.name().to_string(),
                    position: "secondary",
                    actual: sec.result_type.label().to_string(),
                });
            }
        }

        if let Operator::Extract { pattern } = &operator {
            Regex::new(pattern).map_err(|e| AlgebraError::InvalidPattern(e.to_string()))?;
        }

        let result_type = operator.output_type();
        Ok(Self::assemble(operator, operand, secondary, result_type))
    }

    // Internal constructor for nodes whose types are already known valid.
    fn assemble(
        operator: Operator,
        operand: Option<Expression>,
        secondary: Option<Expression>,
        result_type: ValueType,
    ) -> Expression {
        Expression {
            operator,
            operand: operand.map(Box::new),
            secondary: secondary.map(Box::new),
            result_type,
        }
    }

    pub fn literal(value: Value) -> Expression {
        let result_type = value.value_type();
        Self::assemble(Operator::Literal(value), None, None, result_type)
    }

    pub fn number(n: f64) -> Expression {
        Self::literal(Value::Number(n))
    }

    pub fn string(s: &str) -> Expression {
        Self::literal(Value::string(s))
    }

    pub fn reference(name: &str, value_type: ValueType) -> Expression {
        Self::assemble(
            Operator::Ref {
                name: name.to_string(),
                value_type,
            },
            None,
            None,
            value_type,
        )
    }

    fn zero() -> Expression {
        Expression::number(0.0)
    }

    fn max_safe() -> Expression {
        Expression::number(MAX_SAFE_INTEGER)
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn operand(&self) -> Option<&Expression> {
        self.operand.as_deref()
    }

    pub fn secondary(&self) -> Option<&Expression> {
        self.secondary.as_deref()
    }

    pub fn result_type(&self) -> ValueType {
        self.result_type
    }

    pub fn is_commutative(&self) -> bool {
        self.operator.is_commutative()
    }

    pub fn is_associative(&self) -> bool {
        self.operator.is_associative()
    }

    fn as_literal(&self) -> Option<&Value> {
        match &self.operator {
            Operator::Literal(v) => Some(v),
            _ => None,
        }
    }

    fn is_literal_number(&self, n: f64) -> bool {
        matches!(self.as_literal(), Some(Value::Number(x)) if *x == n)
    }

    fn is_literal_bool(&self, b: bool) -> bool {
        matches!(self.as_literal(), Some(Value::Boolean(x)) if *x == b)
    }
}

// Chainable combinators.
impl Expression {
    pub fn add(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Add, Some(self), Some(other))
    }

    pub fn subtract(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Subtract, Some(self), Some(other))
    }

    pub fn multiply(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Multiply, Some(self), Some(other))
    }

    pub fn divide(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Divide, Some(self), Some(other))
    }

    pub fn bitwise_and(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::BitwiseAnd, Some(self), Some(other))
    }

    pub fn bitwise_or(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::BitwiseOr, Some(self), Some(other))
    }

    pub fn bitwise_xor(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::BitwiseXor, Some(self), Some(other))
    }

    pub fn and(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::And, Some(self), Some(other))
    }

    pub fn or(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Or, Some(self), Some(other))
    }

    pub fn not(self) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Not, Some(self), None)
    }

    pub fn is(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Is, Some(self), Some(other))
    }

    pub fn is_not_distinct_from(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::IsNotDistinctFrom, Some(self), Some(other))
    }

    pub fn less_than(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::LessThan, Some(self), Some(other))
    }

    pub fn less_than_or_equal(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::LessThanOrEqual, Some(self), Some(other))
    }

    pub fn greater_than(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::GreaterThan, Some(self), Some(other))
    }

    pub fn greater_than_or_equal(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::GreaterThanOrEqual, Some(self), Some(other))
    }

    pub fn concat(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Concat, Some(self), Some(other))
    }

    pub fn contains(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Contains, Some(self), Some(other))
    }

    pub fn index_of(self, other: Expression) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::IndexOf, Some(self), Some(other))
    }

    pub fn extract(self, pattern: &str) -> Result<Expression, AlgebraError> {
        Expression::new(
            Operator::Extract {
                pattern: pattern.to_string(),
            },
            Some(self),
            None,
        )
    }

    pub fn time_floor(
        self,
        granularity: crate::utils::time::Granularity,
        timezone: crate::utils::time::Timezone,
    ) -> Result<Expression, AlgebraError> {
        Expression::new(
            Operator::TimeFloor {
                granularity,
                timezone,
            },
            Some(self),
            None,
        )
    }

    pub fn time_bucket(
        self,
        granularity: crate::utils::time::Granularity,
        timezone: crate::utils::time::Timezone,
    ) -> Result<Expression, AlgebraError> {
        Expression::new(
            Operator::TimeBucket {
                granularity,
                timezone,
            },
            Some(self),
            None,
        )
    }

    pub fn time_part(
        self,
        part: crate::utils::time::TimePartKind,
        timezone: crate::utils::time::Timezone,
    ) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::TimePart { part, timezone }, Some(self), None)
    }

    pub fn time_shift(
        self,
        duration: crate::utils::time::DurationSpans,
        timezone: crate::utils::time::Timezone,
    ) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::TimeShift { duration, timezone }, Some(self), None)
    }

    pub fn cast(self, output: ValueType) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Cast { output }, Some(self), None)
    }

    pub fn count(self) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Count, Some(self), None)
    }

    pub fn sum(self) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Sum, Some(self), None)
    }

    pub fn min(self) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Min, Some(self), None)
    }

    pub fn max(self) -> Result<Expression, AlgebraError> {
        Expression::new(Operator::Max, Some(self), None)
    }
}

// Native evaluation.
impl Expression {
    /// Pure evaluation over concrete values. Unbound references resolve to
    /// the null marker; a null operand short-circuits to null; set operands
    /// apply the operator pairwise over the cross product.
    pub fn evaluate(&self, env: &Environment) -> Value {
        match &self.operator {
            Operator::Literal(v) => v.clone(),
            Operator::Ref { name, .. } => env.get(name).cloned().unwrap_or(Value::Null),

            Operator::Add => self.eval_numeric(env, |a, b| Value::Number(safe_add(a, b))),
            Operator::Subtract => self.eval_numeric(env, |a, b| Value::Number(a - b)),
            Operator::Multiply => self.eval_numeric(env, |a, b| Value::Number(a * b)),
            Operator::Divide => self.eval_numeric(env, |a, b| {
                if a == 0.0 {
                    Value::Number(0.0)
                } else if b == 0.0 {
                    Value::Number(MAX_SAFE_INTEGER)
                } else {
                    Value::Number(a / b)
                }
            }),

            Operator::BitwiseAnd => {
                self.eval_numeric(env, |a, b| Value::Number(((a as i64) & (b as i64)) as f64))
            }
            Operator::BitwiseOr => {
                self.eval_numeric(env, |a, b| Value::Number(((a as i64) | (b as i64)) as f64))
            }
            Operator::BitwiseXor => {
                self.eval_numeric(env, |a, b| Value::Number(((a as i64) ^ (b as i64)) as f64))
            }

            Operator::And => self.eval_boolean(env, |a, b| Value::Boolean(a && b)),
            Operator::Or => self.eval_boolean(env, |a, b| Value::Boolean(a || b)),
            Operator::Not => {
                let v = self.eval_operand(env);
                Value::map_unary(&v, |x| match x.as_bool() {
                    Some(b) => Value::Boolean(!b),
                    None => Value::Null,
                })
            }

            Operator::Is => self.eval_binary(env, |a, b| Value::Boolean(a == b)),
            Operator::IsNotDistinctFrom => {
                // Null-safe equality: null matches null instead of
                // propagating.
                let a = self.eval_operand(env);
                let b = self.eval_secondary(env);
                Value::Boolean(a == b)
            }
            Operator::LessThan => self.eval_ordering(env, |o| o == Ordering::Less),
            Operator::LessThanOrEqual => self.eval_ordering(env, |o| o != Ordering::Greater),
            Operator::GreaterThan => self.eval_ordering(env, |o| o == Ordering::Greater),
            Operator::GreaterThanOrEqual => self.eval_ordering(env, |o| o != Ordering::Less),

            Operator::Concat => self.eval_string(env, |a, b| Value::String(format!("{}{}", a, b))),
            Operator::Contains => self.eval_string(env, |a, b| Value::Boolean(a.contains(b))),
            Operator::IndexOf => self.eval_string(env, |a, b| match a.find(b) {
                Some(byte_pos) => Value::Number(a[..byte_pos].chars().count() as f64),
                None => Value::Number(-1.0),
            }),
            Operator::Extract { pattern } => {
                let v = self.eval_operand(env);
                let compiled = Regex::new(pattern).ok();
                Value::map_unary(&v, |x| {
                    let (Some(s), Some(re)) = (x.as_str(), compiled.as_ref()) else {
                        return Value::Null;
                    };
                    match re.captures(s).and_then(|c| c.get(1)) {
                        Some(m) => Value::string(m.as_str()),
                        None => Value::Null,
                    }
                })
            }

            Operator::TimeFloor {
                granularity,
                timezone,
            }
            | Operator::TimeBucket {
                granularity,
                timezone,
            } => {
                let v = self.eval_operand(env);
                Value::map_unary(&v, |x| match x.as_time() {
                    Some(t) => Value::Time(granularity.floor(t, timezone)),
                    None => Value::Null,
                })
            }
            Operator::TimePart { part, timezone } => {
                let v = self.eval_operand(env);
                Value::map_unary(&v, |x| match x.as_time() {
                    Some(t) => Value::Number(part.extract(t, timezone) as f64),
                    None => Value::Null,
                })
            }
            Operator::TimeShift { duration, timezone } => {
                let v = self.eval_operand(env);
                Value::map_unary(&v, |x| match x.as_time() {
                    Some(t) => Value::Time(duration.shift(t, timezone)),
                    None => Value::Null,
                })
            }

            Operator::Cast { output } => {
                let v = self.eval_operand(env);
                let output = *output;
                Value::map_unary(&v, |x| cast_value(x, output))
            }

            Operator::Count => self.eval_aggregate(env, |members| {
                Value::Number(members.len() as f64)
            }),
            Operator::Sum => self.eval_aggregate(env, |members| {
                let mut total = 0.0;
                for m in members {
                    match m.as_number() {
                        Some(n) => total = safe_add(total, n),
                        None => return Value::Null,
                    }
                }
                Value::Number(total)
            }),
            Operator::Min => self.eval_aggregate(env, |members| fold_extreme(members, Ordering::Less)),
            Operator::Max => {
                self.eval_aggregate(env, |members| fold_extreme(members, Ordering::Greater))
            }
        }
    }

    fn eval_operand(&self, env: &Environment) -> Value {
        self.operand
            .as_ref()
            .map(|e| e.evaluate(env))
            .unwrap_or(Value::Null)
    }

    fn eval_secondary(&self, env: &Environment) -> Value {
        self.secondary
            .as_ref()
            .map(|e| e.evaluate(env))
            .unwrap_or(Value::Null)
    }

    fn eval_binary<F>(&self, env: &Environment, f: F) -> Value
    where
        F: Fn(&Value, &Value) -> Value,
    {
        let a = self.eval_operand(env);
        let b = self.eval_secondary(env);
        Value::cross_binary(&a, &b, f)
    }

    fn eval_numeric<F>(&self, env: &Environment, f: F) -> Value
    where
        F: Fn(f64, f64) -> Value,
    {
        self.eval_binary(env, |a, b| match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => f(a, b),
            _ => Value::Null,
        })
    }

    fn eval_boolean<F>(&self, env: &Environment, f: F) -> Value
    where
        F: Fn(bool, bool) -> Value,
    {
        self.eval_binary(env, |a, b| match (a.as_bool(), b.as_bool()) {
            (Some(a), Some(b)) => f(a, b),
            _ => Value::Null,
        })
    }

    fn eval_string<F>(&self, env: &Environment, f: F) -> Value
    where
        F: Fn(&str, &str) -> Value,
    {
        self.eval_binary(env, |a, b| match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => f(a, b),
            _ => Value::Null,
        })
    }

    fn eval_ordering<F>(&self, env: &Environment, f: F) -> Value
    where
        F: Fn(Ordering) -> bool,
    {
        self.eval_binary(env, |a, b| match compare_values(a, b) {
            Some(ordering) => Value::Boolean(f(ordering)),
            None => Value::Null,
        })
    }

    fn eval_aggregate<F>(&self, env: &Environment, f: F) -> Value
    where
        F: Fn(&[Value]) -> Value,
    {
        match self.eval_operand(env) {
            Value::Null => Value::Null,
            Value::Set(members) => f(&members),
            single => f(&[single]),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn fold_extreme(members: &[Value], keep: Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for m in members {
        if m.is_null() {
            continue;
        }
        best = match best {
            None => Some(m),
            Some(current) => match compare_values(m, current) {
                Some(o) if o == keep => Some(m),
                Some(_) => Some(current),
                None => return Value::Null,
            },
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

fn cast_value(v: &Value, output: ValueType) -> Value {
    match (v, output) {
        (Value::Number(n), ValueType::Time) => {
            // FROM_UNIXTIME(x / 1000): the number is epoch milliseconds.
            match chrono::DateTime::from_timestamp_millis(*n as i64) {
                Some(t) => Value::Time(t),
                None => Value::Null,
            }
        }
        (Value::Time(t), ValueType::Number) => Value::Number(t.timestamp_millis() as f64),
        (Value::String(s), ValueType::Number) => {
            // CAST(x AS SIGNED) semantics: parse a leading integer, 0 when
            // there is none.
            Value::Number(parse_leading_integer(s) as f64)
        }
        (Value::Number(n), ValueType::String) => Value::String(format_number(*n)),
        _ => Value::Null,
    }
}

fn parse_leading_integer(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if (i == 0 && (c == '-' || c == '+')) || c.is_ascii_digit() {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse::<i64>().unwrap_or(0)
}

// Script-fragment generation.
impl Expression {
    /// Produce a fragment in an embeddable scripting language (JavaScript
    /// expression syntax) that evaluates this node. Reference leaves read
    /// from a `datum` binding; the null and division policies match native
    /// evaluation exactly.
    pub fn script_fragment(&self) -> String {
        let a = self.operand.as_ref().map(|e| e.script_fragment());
        let b = self.secondary.as_ref().map(|e| e.script_fragment());
        let a = a.as_deref().unwrap_or("null");
        let b = b.as_deref().unwrap_or("null");

        match &self.operator {
            Operator::Literal(v) => v.to_script_literal(),
            Operator::Ref { name, .. } => format!(
                "datum[{}]",
                serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string())
            ),

            Operator::Add => guarded_binary(a, b, "_o+_e"),
            Operator::Subtract => guarded_binary(a, b, "_o-_e"),
            Operator::Multiply => guarded_binary(a, b, "_o*_e"),
            Operator::Divide => guarded_binary(
                a,
                b,
                "(_o===0?0:(_e===0?9007199254740991:_o/_e))",
            ),

            Operator::BitwiseAnd => guarded_binary(a, b, "_o&_e"),
            Operator::BitwiseOr => guarded_binary(a, b, "_o|_e"),
            Operator::BitwiseXor => guarded_binary(a, b, "_o^_e"),

            Operator::And => guarded_binary(a, b, "_o&&_e"),
            Operator::Or => guarded_binary(a, b, "_o||_e"),
            Operator::Not => guarded_unary(a, "!_o"),

            Operator::Is => guarded_binary(a, b, "_o===_e"),
            Operator::IsNotDistinctFrom => format!("(({})===({}))", a, b),
            Operator::LessThan => guarded_binary(a, b, "_o<_e"),
            Operator::LessThanOrEqual => guarded_binary(a, b, "_o<=_e"),
            Operator::GreaterThan => guarded_binary(a, b, "_o>_e"),
            Operator::GreaterThanOrEqual => guarded_binary(a, b, "_o>=_e"),

            Operator::Concat => guarded_binary(a, b, "''+_o+_e"),
            Operator::Contains => guarded_binary(a, b, "_o.indexOf(_e)>-1"),
            Operator::IndexOf => guarded_binary(a, b, "_o.indexOf(_e)"),
            Operator::Extract { pattern } => {
                let pattern_js =
                    serde_json::to_string(pattern).unwrap_or_else(|_| "\"\"".to_string());
                guarded_unary(
                    a,
                    &format!("(_m=new RegExp({}).exec(_o),_m?_m[1]:null)", pattern_js),
                )
            }

            Operator::TimeFloor {
                granularity,
                timezone,
            } => format!("_timeFloor({},'{}','{}')", a, granularity.iso(), timezone),
            Operator::TimeBucket {
                granularity,
                timezone,
            } => format!("_timeBucket({},'{}','{}')", a, granularity.iso(), timezone),
            Operator::TimePart { part, timezone } => {
                format!("_timePart({},'{}','{}')", a, part.label(), timezone)
            }
            Operator::TimeShift { duration, timezone } => {
                format!("_timeShift({},'{}','{}')", a, duration.to_iso(), timezone)
            }

            Operator::Cast { output } => match output {
                ValueType::Time => guarded_unary(a, "new Date(_o)"),
                ValueType::Number => match self.operand().map(|o| o.result_type()) {
                    Some(ValueType::String) => guarded_unary(a, "(parseInt(_o,10)||0)"),
                    _ => guarded_unary(a, "_o.valueOf()"),
                },
                _ => guarded_unary(a, "''+_o"),
            },

            Operator::Count => guarded_unary(a, "_o.length"),
            Operator::Sum => {
                guarded_unary(a, "_o.reduce(function(x,y){return x+y;},0)")
            }
            Operator::Min => guarded_unary(a, "Math.min.apply(null,_o)"),
            Operator::Max => guarded_unary(a, "Math.max.apply(null,_o)"),
        }
    }
}

fn rendered<'a>(
    sql: Option<&'a str>,
    operator: &Operator,
    position: &str,
) -> QuarryResult<&'a str> {
    sql.ok_or_else(|| {
        QuarryError::Internal(format!(
            "operator '{}' requires a rendered {} operand",
            operator.name(),
            position
        ))
    })
}

fn guarded_binary(a: &str, b: &str, body: &str) -> String {
    format!("(_o={},_e={},(_o==null||_e==null?null:{}))", a, b, body)
}

fn guarded_unary(a: &str, body: &str) -> String {
    format!("(_o={},(_o==null?null:{}))", a, body)
}

// Query-fragment generation.
impl Expression {
    /// Produce dialect-specific query text for this node alone. Children
    /// are pre-rendered by the caller's tree walk; this keeps dialect
    /// concerns to leaf-level text templates per operator.
    pub fn query_fragment(
        &self,
        dialect: &dyn SqlDialect,
        operand_sql: Option<&str>,
        secondary_sql: Option<&str>,
    ) -> QuarryResult<String> {
        match &self.operator {
            Operator::Literal(v) => return Ok(dialect.literal_to_sql(v)),
            Operator::Ref { name, .. } => return Ok(dialect.escape_identifier(name)),
            _ => {}
        }
        let a = rendered(operand_sql, &self.operator, "primary")?;
        let b = if self.operator.operand_count() == 2 {
            rendered(secondary_sql, &self.operator, "secondary")?
        } else {
            ""
        };

        Ok(match &self.operator {
            Operator::Literal(_) | Operator::Ref { .. } => String::new(),

            Operator::Add => format!("({}+{})", a, b),
            Operator::Subtract => format!("({}-{})", a, b),
            Operator::Multiply => format!("({}*{})", a, b),
            Operator::Divide => format!(
                "(CASE WHEN {} = 0 THEN 0 WHEN {} = 0 THEN 9007199254740991 ELSE ({}/{}) END)",
                a, b, a, b
            ),

            Operator::BitwiseAnd => format!("({}&{})", a, b),
            Operator::BitwiseOr => format!("({}|{})", a, b),
            Operator::BitwiseXor => format!("({}^{})", a, b),

            Operator::And => format!("({} AND {})", a, b),
            Operator::Or => format!("({} OR {})", a, b),
            Operator::Not => format!("(NOT({}))", a),

            Operator::Is => format!("({}={})", a, b),
            Operator::IsNotDistinctFrom => dialect.is_not_distinct_from_expression(a, b),
            Operator::LessThan => format!("({}<{})", a, b),
            Operator::LessThanOrEqual => format!("({}<={})", a, b),
            Operator::GreaterThan => format!("({}>{})", a, b),
            Operator::GreaterThanOrEqual => format!("({}>={})", a, b),

            Operator::Concat => dialect.concat_expression(a, b),
            Operator::Contains => dialect.contains_expression(a, b),
            Operator::IndexOf => dialect.index_of_expression(a, b),
            Operator::Extract { pattern } => dialect.extract_expression(a, pattern)?,

            Operator::TimeFloor {
                granularity,
                timezone,
            } => dialect.time_floor_expression(a, *granularity, timezone)?,
            Operator::TimeBucket {
                granularity,
                timezone,
            } => dialect.time_bucket_expression(a, *granularity, timezone)?,
            Operator::TimePart { part, timezone } => {
                dialect.time_part_expression(a, *part, timezone)?
            }
            Operator::TimeShift { duration, timezone } => {
                dialect.time_shift_expression(a, duration, timezone)
            }

            Operator::Cast { output } => {
                let input = self
                    .operand()
                    .map(|o| o.result_type())
                    .unwrap_or(ValueType::Null);
                dialect.cast_expression(input, a, *output)?
            }

            Operator::Count => format!("COUNT({})", a),
            Operator::Sum => format!("SUM({})", a),
            Operator::Min => format!("MIN({})", a),
            Operator::Max => format!("MAX({})", a),
        })
    }

    /// Render the whole tree to query text with a post-order walk; each
    /// node only ever sees its children's pre-rendered fragments.
    pub fn to_query_text(&self, dialect: &dyn SqlDialect) -> QuarryResult<String> {
        let operand_sql = match &self.operand {
            Some(e) => Some(e.to_query_text(dialect)?),
            None => None,
        };
        let secondary_sql = match &self.secondary {
            Some(e) => Some(e.to_query_text(dialect)?),
            None => None,
        };
        self.query_fragment(dialect, operand_sql.as_deref(), secondary_sql.as_deref())
    }
}

// Simplification.
impl Expression {
    /// Return an equivalent, cheaper expression. Re-simplifying a
    /// simplified expression returns it unchanged.
    pub fn simplify(&self) -> Expression {
        let operand = self.operand.as_ref().map(|e| e.simplify());
        let secondary = self.secondary.as_ref().map(|e| e.simplify());

        match (&self.operator, &operand, &secondary) {
            (Operator::Divide, Some(op), Some(sec)) => {
                if op.is_literal_number(0.0) {
                    return Expression::zero();
                }
                if sec.is_literal_number(0.0) {
                    return Expression::max_safe();
                }
                if sec.is_literal_number(1.0) {
                    return op.clone();
                }
            }
            (Operator::Add, Some(op), Some(sec)) => {
                if op.is_literal_number(0.0) {
                    return sec.clone();
                }
                if sec.is_literal_number(0.0) {
                    return op.clone();
                }
            }
            (Operator::Subtract, Some(op), Some(sec)) => {
                if sec.is_literal_number(0.0) {
                    return op.clone();
                }
            }
            (Operator::Multiply, Some(op), Some(sec)) => {
                if op.is_literal_number(0.0) || sec.is_literal_number(0.0) {
                    return Expression::zero();
                }
                if op.is_literal_number(1.0) {
                    return sec.clone();
                }
                if sec.is_literal_number(1.0) {
                    return op.clone();
                }
            }
            (Operator::And, Some(op), Some(sec)) => {
                if op.is_literal_bool(false) || sec.is_literal_bool(false) {
                    return Expression::literal(Value::Boolean(false));
                }
                if op.is_literal_bool(true) {
                    return sec.clone();
                }
                if sec.is_literal_bool(true) {
                    return op.clone();
                }
            }
            (Operator::Or, Some(op), Some(sec)) => {
                if op.is_literal_bool(true) || sec.is_literal_bool(true) {
                    return Expression::literal(Value::Boolean(true));
                }
                if op.is_literal_bool(false) {
                    return sec.clone();
                }
                if sec.is_literal_bool(false) {
                    return op.clone();
                }
            }
            (Operator::Not, Some(op), None) => {
                if let (Operator::Not, Some(inner)) = (&op.operator, op.operand()) {
                    return inner.clone();
                }
            }
            _ => {}
        }

        let foldable = !matches!(
            self.operator,
            Operator::Literal(_) | Operator::Ref { .. }
        );
        if foldable
            && operand.as_ref().map_or(true, |e| e.as_literal().is_some())
            && secondary.as_ref().map_or(true, |e| e.as_literal().is_some())
            && self.operand.is_some()
        {
            let folded = Expression::assemble(
                self.operator.clone(),
                operand.clone(),
                secondary.clone(),
                self.result_type,
            );
            return Expression::literal(folded.evaluate(&Environment::new()));
        }

        Expression::assemble(
            self.operator.clone(),
            operand,
            secondary,
            self.result_type,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_rejects_wrong_types() {
        let err = Expression::string("text")
            .divide(Expression::number(2.0))
            .unwrap_err();
        match err {
            AlgebraError::TypeMismatch { operator, position, actual } => {
                assert_eq!(operator, "divide");
                assert_eq!(position, "primary");
                assert_eq!(actual, "STRING");
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_construction_rejects_wrong_arity() {
        let err = Expression::new(Operator::Divide, Some(Expression::number(1.0)), None)
            .unwrap_err();
        assert!(matches!(err, AlgebraError::WrongArity { .. }));
    }

    #[test]
    fn test_construction_rejects_bad_extract_pattern() {
        let err = Expression::string("abc").extract("(unclosed").unwrap_err();
        assert!(matches!(err, AlgebraError::InvalidPattern(_)));
    }

    #[test]
    fn test_result_type_fixed_at_construction() {
        let e = Expression::number(6.0)
            .divide(Expression::number(2.0))
            .unwrap();
        assert_eq!(e.result_type(), ValueType::Number);
        let c = Expression::string("a").contains(Expression::string("b")).unwrap();
        assert_eq!(c.result_type(), ValueType::Boolean);
    }

    #[test]
    fn test_divide_policy_native() {
        let env = Environment::new();
        let div = |a: f64, b: f64| {
            Expression::number(a)
                .divide(Expression::number(b))
                .unwrap()
                .evaluate(&env)
        };
        assert_eq!(div(6.0, 2.0), Value::Number(3.0));
        assert_eq!(div(5.0, 0.0), Value::Number(MAX_SAFE_INTEGER));
        assert_eq!(div(0.0, 0.0), Value::Number(0.0));
        assert_eq!(div(0.0, 7.0), Value::Number(0.0));
    }

    #[test]
    fn test_null_short_circuits_binary_operators() {
        let env = Environment::new();
        let e = Expression::literal(Value::Null)
            .add(Expression::number(3.0))
            .unwrap();
        assert_eq!(e.evaluate(&env), Value::Null);
    }

    #[test]
    fn test_unbound_reference_is_null() {
        let env = Environment::new();
        let e = Expression::reference("missing", ValueType::Number)
            .add(Expression::number(1.0))
            .unwrap();
        assert_eq!(e.evaluate(&env), Value::Null);
    }

    #[test]
    fn test_simplify_divide_identities() {
        let x = Expression::reference("x", ValueType::Number);

        let zero_over_x = Expression::number(0.0).divide(x.clone()).unwrap();
        assert_eq!(zero_over_x.simplify(), Expression::number(0.0));

        let x_over_zero = x.clone().divide(Expression::number(0.0)).unwrap();
        assert_eq!(x_over_zero.simplify(), Expression::number(MAX_SAFE_INTEGER));

        let x_over_one = x.clone().divide(Expression::number(1.0)).unwrap();
        assert_eq!(x_over_one.simplify(), x);
    }

    #[test]
    fn test_simplify_is_idempotent() {
        let x = Expression::reference("x", ValueType::Number);
        let e = x
            .clone()
            .multiply(Expression::number(1.0))
            .unwrap()
            .add(Expression::number(2.0).add(Expression::number(3.0)).unwrap())
            .unwrap();
        let once = e.simplify();
        assert_eq!(once.simplify(), once);
    }

    #[test]
    fn test_simplify_constant_folding() {
        let e = Expression::number(2.0)
            .add(Expression::number(3.0))
            .unwrap();
        assert_eq!(e.simplify(), Expression::number(5.0));
    }

    #[test]
    fn test_structural_equality() {
        let a = Expression::number(1.0).add(Expression::number(2.0)).unwrap();
        let b = Expression::number(1.0).add(Expression::number(2.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_script_fragment_divide_policy() {
        let e = Expression::reference("x", ValueType::Number)
            .divide(Expression::reference("y", ValueType::Number))
            .unwrap();
        let js = e.script_fragment();
        assert!(js.contains("9007199254740991"));
        assert!(js.contains("_o===0?0"));
        assert!(js.contains("null"));
    }
}
