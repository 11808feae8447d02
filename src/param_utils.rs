use std::collections::HashMap;

/// Get a parameter value with a default fallback
pub fn get_param(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

/// Get a parameter rounded to an i64
pub fn get_rounded_param(params: &HashMap<String, f64>, key: &str, default: i64) -> i64 {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round() as i64)
        .unwrap_or(default)
}

/// Get a parameter as usize with a minimum value
pub fn get_usize_param_min(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
    min: usize,
) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(min as f64) as usize)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let p = params(&[]);
        assert_eq!(get_param(&p, "x", 1.5), 1.5);
        assert_eq!(get_rounded_param(&p, "x", 30), 30);
        assert_eq!(get_usize_param_min(&p, "x", 20, 1), 20);
    }

    #[test]
    fn rounded_param_rejects_non_finite_values() {
        let p = params(&[("days", f64::NAN), ("hold", 19.6)]);
        assert_eq!(get_rounded_param(&p, "days", 5), 5);
        assert_eq!(get_rounded_param(&p, "hold", 30), 20);
    }

    #[test]
    fn usize_param_enforces_minimum() {
        let p = params(&[("lookback", 0.0)]);
        assert_eq!(get_usize_param_min(&p, "lookback", 20, 1), 1);
    }
}
