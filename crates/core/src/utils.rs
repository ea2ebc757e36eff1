//! Small helpers shared across the Store, Scheduler, and API layers that don't
//! warrant their own module.

/// Masks a credential secret for API responses (§7: error and success payloads
/// alike must never echo a credential back in full). Keeps the last two
/// characters so an operator can sanity-check which secret is configured.
pub fn mask_secret(value: &str) -> String {
    let len = value.chars().count();
    if len <= 2 {
        return "*".repeat(len);
    }
    let visible: String = value.chars().skip(len - 2).collect();
    format!("{}{}", "*".repeat(len - 2), visible)
}

/// Interprets a `Setting.value` stored under `value_type = "bool"`. Unrecognized
/// values are treated as `false` rather than erroring, since a malformed setting
/// should degrade a feature rather than take down the service.
pub fn parse_setting_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secret_keeps_last_two_characters() {
        assert_eq!(mask_secret("hunter2"), "*****r2");
        assert_eq!(mask_secret("ab"), "**");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn parse_setting_bool_accepts_common_truthy_forms() {
        assert!(parse_setting_bool("true"));
        assert!(parse_setting_bool("1"));
        assert!(parse_setting_bool("On"));
        assert!(!parse_setting_bool("false"));
        assert!(!parse_setting_bool("garbage"));
    }
}
