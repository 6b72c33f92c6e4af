//! Status page templates.
//!
//! Templates are compiled into the binary so the page renders regardless of
//! the working directory.

use tera::Tera;

use crate::error::AppError;

/// Latency at or below this is shown as fast
pub const LATENCY_FAST_MS: u64 = 100;

/// Latency at or below this (and above fast) is shown as moderate
pub const LATENCY_MODERATE_MS: u64 = 500;

const STATUS_TEMPLATE: &str = include_str!("../templates/status.html");

/// Initialize the Tera template engine
pub fn init_templates() -> Result<Tera, AppError> {
    let mut tera = Tera::default();
    tera.add_raw_template("status.html", STATUS_TEMPLATE)?;

    tera.register_filter("latency_class", latency_class_filter);

    Ok(tera)
}

/// Map a latency in milliseconds to a CSS class name.
pub fn latency_class(latency_ms: u64) -> &'static str {
    if latency_ms <= LATENCY_FAST_MS {
        "fast"
    } else if latency_ms <= LATENCY_MODERATE_MS {
        "moderate"
    } else {
        "slow"
    }
}

fn latency_class_filter(
    value: &tera::Value,
    _args: &std::collections::HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let ms = value
        .as_u64()
        .ok_or_else(|| tera::Error::msg("latency_class filter expects a non-negative integer"))?;
    Ok(tera::Value::String(latency_class(ms).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_class_boundaries() {
        assert_eq!(latency_class(0), "fast");
        assert_eq!(latency_class(100), "fast");
        assert_eq!(latency_class(101), "moderate");
        assert_eq!(latency_class(500), "moderate");
        assert_eq!(latency_class(501), "slow");
    }

    #[test]
    fn test_latency_class_filter_rejects_strings() {
        let args = std::collections::HashMap::new();
        assert!(latency_class_filter(&tera::Value::from("12"), &args).is_err());
        assert_eq!(
            latency_class_filter(&tera::Value::from(12u64), &args).unwrap(),
            tera::Value::from("fast")
        );
    }

    #[test]
    fn test_templates_load() {
        let tera = init_templates().unwrap();
        assert!(tera.get_template_names().any(|name| name == "status.html"));
    }
}
