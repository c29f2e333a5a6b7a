use crate::algebra::value::{Value, ValueType};
use crate::utils::time::{DurationSpans, Granularity, TimePartKind, Timezone};

/// The closed set of operator kinds. Adding a variant forces every backend
/// (native evaluation, script fragment, query fragment) to handle it at
/// compile time through exhaustive matching.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    // Leaves
    Literal(Value),
    Ref { name: String, value_type: ValueType },

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Bitwise
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,

    // Boolean
    And,
    Or,
    Not,

    // Comparison
    Is,
    IsNotDistinctFrom,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // String
    Concat,
    Contains,
    IndexOf,
    Extract { pattern: String },

    // Temporal
    TimeFloor { granularity: Granularity, timezone: Timezone },
    TimeBucket { granularity: Granularity, timezone: Timezone },
    TimePart { part: TimePartKind, timezone: Timezone },
    TimeShift { duration: DurationSpans, timezone: Timezone },

    // Type conversion
    Cast { output: ValueType },

    // Aggregates
    Count,
    Sum,
    Min,
    Max,
}

const NUMERIC: &[ValueType] = &[ValueType::Number, ValueType::Set, ValueType::Null];
const BOOLEAN: &[ValueType] = &[ValueType::Boolean, ValueType::Set, ValueType::Null];
const STRINGY: &[ValueType] = &[ValueType::String, ValueType::Set, ValueType::Null];
const COMPARABLE: &[ValueType] = &[
    ValueType::Number,
    ValueType::String,
    ValueType::Time,
    ValueType::Set,
    ValueType::Null,
];
const EQUATABLE: &[ValueType] = &[
    ValueType::Number,
    ValueType::String,
    ValueType::Time,
    ValueType::Boolean,
    ValueType::Set,
    ValueType::Null,
];
const TEMPORAL: &[ValueType] = &[ValueType::Time, ValueType::Set, ValueType::Null];
const AGGREGABLE: &[ValueType] = &[ValueType::Set, ValueType::Dataset, ValueType::Null];
const CAST_FROM_TIME_SOURCES: &[ValueType] = &[ValueType::Number, ValueType::Null];
const CAST_FROM_NUMBER_SOURCES: &[ValueType] =
    &[ValueType::Time, ValueType::String, ValueType::Null];
const CAST_FROM_STRING_SOURCES: &[ValueType] = &[ValueType::Number, ValueType::Null];
const NONE: &[ValueType] = &[];

impl Operator {
    /// Lower-case operator name, used in error messages and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Literal(_) => "literal",
            Operator::Ref { .. } => "ref",
            Operator::Add => "add",
            Operator::Subtract => "subtract",
            Operator::Multiply => "multiply",
            Operator::Divide => "divide",
            Operator::BitwiseAnd => "bitwiseAnd",
            Operator::BitwiseOr => "bitwiseOr",
            Operator::BitwiseXor => "bitwiseXor",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::Is => "is",
            Operator::IsNotDistinctFrom => "isNotDistinctFrom",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqual => "lessThanOrEqual",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqual => "greaterThanOrEqual",
            Operator::Concat => "concat",
            Operator::Contains => "contains",
            Operator::IndexOf => "indexOf",
            Operator::Extract { .. } => "extract",
            Operator::TimeFloor { .. } => "timeFloor",
            Operator::TimeBucket { .. } => "timeBucket",
            Operator::TimePart { .. } => "timePart",
            Operator::TimeShift { .. } => "timeShift",
            Operator::Cast { .. } => "cast",
            Operator::Count => "count",
            Operator::Sum => "sum",
            Operator::Min => "min",
            Operator::Max => "max",
        }
    }

    /// Number of child expressions this operator requires.
    pub fn operand_count(&self) -> usize {
        match self {
            Operator::Literal(_) | Operator::Ref { .. } => 0,
            Operator::Not
            | Operator::Extract { .. }
            | Operator::TimeFloor { .. }
            | Operator::TimeBucket { .. }
            | Operator::TimePart { .. }
            | Operator::TimeShift { .. }
            | Operator::Cast { .. }
            | Operator::Count
            | Operator::Sum
            | Operator::Min
            | Operator::Max => 1,
            _ => 2,
        }
    }

    /// Type tags accepted for the primary operand.
    pub fn accepted_operand_types(&self) -> &'static [ValueType] {
        match self {
            Operator::Literal(_) | Operator::Ref { .. } => NONE,
            Operator::Add
            | Operator::Subtract
            | Operator::Multiply
            | Operator::Divide
            | Operator::BitwiseAnd
            | Operator::BitwiseOr
            | Operator::BitwiseXor => NUMERIC,
            Operator::And | Operator::Or | Operator::Not => BOOLEAN,
            Operator::Is | Operator::IsNotDistinctFrom => EQUATABLE,
            Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual => COMPARABLE,
            Operator::Concat | Operator::Contains | Operator::IndexOf => STRINGY,
            Operator::Extract { .. } => STRINGY,
            Operator::TimeFloor { .. }
            | Operator::TimeBucket { .. }
            | Operator::TimePart { .. }
            | Operator::TimeShift { .. } => TEMPORAL,
            Operator::Cast { output } => match output {
                ValueType::Time => CAST_FROM_TIME_SOURCES,
                ValueType::Number => CAST_FROM_NUMBER_SOURCES,
                ValueType::String => CAST_FROM_STRING_SOURCES,
                _ => NONE,
            },
            Operator::Count | Operator::Sum | Operator::Min | Operator::Max => AGGREGABLE,
        }
    }

    /// Type tags accepted for the secondary operand of binary operators.
    pub fn accepted_secondary_types(&self) -> &'static [ValueType] {
        if self.operand_count() < 2 {
            return NONE;
        }
        self.accepted_operand_types()
    }

    /// The result type tag, fixed per operator kind.
    pub fn output_type(&self) -> ValueType {
        match self {
            Operator::Literal(v) => v.value_type(),
            Operator::Ref { value_type, .. } => *value_type,
            Operator::Add
            | Operator::Subtract
            | Operator::Multiply
            | Operator::Divide
            | Operator::BitwiseAnd
            | Operator::BitwiseOr
            | Operator::BitwiseXor
            | Operator::IndexOf
            | Operator::TimePart { .. }
            | Operator::Count
            | Operator::Sum
            | Operator::Min
            | Operator::Max => ValueType::Number,
            Operator::And
            | Operator::Or
            | Operator::Not
            | Operator::Is
            | Operator::IsNotDistinctFrom
            | Operator::LessThan
            | Operator::LessThanOrEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::Contains => ValueType::Boolean,
            Operator::Concat | Operator::Extract { .. } => ValueType::String,
            Operator::TimeFloor { .. }
            | Operator::TimeBucket { .. }
            | Operator::TimeShift { .. } => ValueType::Time,
            Operator::Cast { output } => *output,
        }
    }

    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Multiply
                | Operator::BitwiseAnd
                | Operator::BitwiseOr
                | Operator::BitwiseXor
                | Operator::And
                | Operator::Or
                | Operator::Is
                | Operator::IsNotDistinctFrom
        )
    }

    pub fn is_associative(&self) -> bool {
        matches!(
            self,
            Operator::Add
                | Operator::Multiply
                | Operator::BitwiseAnd
                | Operator::BitwiseOr
                | Operator::BitwiseXor
                | Operator::And
                | Operator::Or
        )
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Operator::Count | Operator::Sum | Operator::Min | Operator::Max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_counts() {
        assert_eq!(Operator::Literal(Value::Number(1.0)).operand_count(), 0);
        assert_eq!(Operator::Not.operand_count(), 1);
        assert_eq!(Operator::Count.operand_count(), 1);
        assert_eq!(Operator::Divide.operand_count(), 2);
    }

    #[test]
    fn test_output_types() {
        assert_eq!(Operator::Divide.output_type(), ValueType::Number);
        assert_eq!(Operator::Contains.output_type(), ValueType::Boolean);
        assert_eq!(
            Operator::TimeFloor {
                granularity: Granularity::Day,
                timezone: Timezone::utc()
            }
            .output_type(),
            ValueType::Time
        );
        assert_eq!(
            Operator::Cast {
                output: ValueType::String
            }
            .output_type(),
            ValueType::String
        );
    }

    #[test]
    fn test_commutativity_facts() {
        assert!(Operator::Add.is_commutative());
        assert!(Operator::BitwiseXor.is_commutative());
        assert!(!Operator::Subtract.is_commutative());
        assert!(!Operator::Divide.is_commutative());
        assert!(!Operator::IndexOf.is_commutative());
    }

    #[test]
    fn test_associativity_facts() {
        assert!(Operator::Multiply.is_associative());
        assert!(Operator::And.is_associative());
        assert!(!Operator::Is.is_associative());
        assert!(!Operator::Subtract.is_associative());
    }

    #[test]
    fn test_cast_accepted_inputs_depend_on_output() {
        let to_time = Operator::Cast {
            output: ValueType::Time,
        };
        assert!(to_time
            .accepted_operand_types()
            .contains(&ValueType::Number));
        assert!(!to_time
            .accepted_operand_types()
            .contains(&ValueType::String));

        let to_number = Operator::Cast {
            output: ValueType::Number,
        };
        assert!(to_number
            .accepted_operand_types()
            .contains(&ValueType::String));
        assert!(to_number.accepted_operand_types().contains(&ValueType::Time));
    }
}
