/// Add two floats while compensating for the decimal scale of the delta.
///
/// Plain `f64` addition of decimal fractions accumulates representation
/// noise (`0.1 + 0.2`); scaling both sides to the delta's decimal precision
/// first keeps repeated additions stable.
pub fn safe_add(num: f64, delta: f64) -> f64 {
    let string_delta = delta.to_string();
    match string_delta.find('.') {
        None => num + delta,
        Some(_) if string_delta.len() >= 18 => num + delta,
        Some(dot_index) => {
            let scale = 10f64.powi((string_delta.len() - dot_index - 1) as i32);
            (num * scale + delta * scale) / scale
        }
    }
}

/// Sort a list of strings and drop adjacent duplicates.
pub fn deduplicate_sort(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_add_decimal_fractions() {
        assert_eq!(safe_add(0.1, 0.2), 0.3);
        assert_eq!(safe_add(1.0, 0.05), 1.05);
        assert_eq!(safe_add(3.0, 4.0), 7.0);
    }

    #[test]
    fn test_deduplicate_sort() {
        let values = vec![
            "orders".to_string(),
            "events".to_string(),
            "orders".to_string(),
            "users".to_string(),
        ];
        assert_eq!(
            deduplicate_sort(values),
            vec!["events".to_string(), "orders".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn test_deduplicate_sort_empty() {
        assert!(deduplicate_sort(vec![]).is_empty());
    }
}
