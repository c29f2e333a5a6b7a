use crate::algebra::value::ValueType;
use serde::{Deserialize, Serialize};

/// An introspected column: its name, the type tag it maps to, and the
/// engine's raw type string, retained for diagnostics and future cast
/// decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value_type: ValueType,
    pub native_type: String,
}

impl Attribute {
    pub fn new(name: &str, value_type: ValueType, native_type: &str) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            native_type: native_type.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_retains_native_type() {
        let attr = Attribute::new("added", ValueType::Number, "UInt64");
        assert_eq!(attr.name, "added");
        assert_eq!(attr.value_type, ValueType::Number);
        assert_eq!(attr.native_type, "UInt64");
    }
}
