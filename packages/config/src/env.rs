// ABOUTME: Environment variable parsing utilities
// ABOUTME: Reads string overrides with defaults, warning when a set value is unusable

/// Read a non-blank string override
///
/// Unset variables silently yield the default. Variables that are set but
/// empty or whitespace-only are rejected with a warning.
pub fn string_env_or_default(var_name: &str, default: &str) -> String {
    match std::env::var(var_name) {
        Ok(raw_value) => {
            let trimmed = raw_value.trim();
            if trimmed.is_empty() {
                tracing::warn!(
                    "Environment variable {} is blank, using default: {}",
                    var_name,
                    default
                );
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}
