//! Appliance app-name checks.

use crate::rules::APP_NAME_PATTERN;

pub const MIN_APP_NAME_LEN: usize = 2;
pub const MAX_APP_NAME_LEN: usize = 50;

/// Every constraint `name` violates, as human-readable text. An empty
/// list means the name is acceptable.
pub fn validate_app_name(name: &str) -> Vec<String> {
    let mut issues = Vec::new();

    if name.is_empty() {
        issues.push("App name cannot be empty".to_string());
        return issues;
    }

    let len = name.chars().count();
    if len < MIN_APP_NAME_LEN {
        issues.push(format!(
            "App name must be at least {} characters long",
            MIN_APP_NAME_LEN
        ));
    }
    if len > MAX_APP_NAME_LEN {
        issues.push(format!(
            "App name must be {} characters or less",
            MAX_APP_NAME_LEN
        ));
    }

    if !APP_NAME_PATTERN.is_match(name) {
        issues.push(
            "App name must start and end with alphanumeric characters, \
             and can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        );
    }

    if name.contains("--") {
        issues.push("App name cannot contain consecutive hyphens".to_string());
    }

    issues
}
