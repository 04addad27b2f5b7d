//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the config key for error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(
            expand_env("components.yaml", "source.components").unwrap(),
            "components.yaml"
        );
    }

    #[test]
    fn test_default_used_when_unset() {
        let value = "${HTMLIUM_TEST_SURELY_UNSET_VAR:-fallback.yaml}";
        assert_eq!(
            expand_env(value, "source.components").unwrap(),
            "fallback.yaml"
        );
    }

    #[test]
    fn test_unset_without_default_errors() {
        let err = expand_env("${HTMLIUM_TEST_SURELY_UNSET_VAR}", "source.components")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("source.components"));
        assert!(message.contains("HTMLIUM_TEST_SURELY_UNSET_VAR"));
    }
}
