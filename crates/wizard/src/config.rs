//! Wizard configuration loaded from environment variables.

use domain::{MAX_STORES, ScoringWeights};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Wizard configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `WIZARD_BRAND_PASS_LIMIT` - brand+name search limit (default: `20`)
/// - `WIZARD_NAME_PASS_LIMIT` - name-only search limit (default: `30`)
/// - `WIZARD_MAX_STORES` - store cap, clamped to `1..=2` (default: `2`)
/// - `WIZARD_MAX_SUGGESTIONS` - ranked suggestions kept per item (default: `10`)
/// - `WIZARD_DATASET_VERSION` - version stamped on new sessions (default: `1`)
/// - `RUST_LOG` - tracing filter directive (default: `"info"`)
/// - `WIZARD_LOG_FORMAT` - `text` or `json` (default: `text`)
///
/// Unset or unparsable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct WizardConfig {
    pub brand_pass_limit: usize,
    pub name_pass_limit: usize,
    pub max_stores: usize,
    pub max_suggestions: usize,
    pub dataset_version: i32,
    pub log_level: String,
    pub log_format: LogFormat,
    pub weights: ScoringWeights,
}

impl WizardConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse().ok());

        Self {
            brand_pass_limit: parsed("WIZARD_BRAND_PASS_LIMIT").unwrap_or(defaults.brand_pass_limit),
            name_pass_limit: parsed("WIZARD_NAME_PASS_LIMIT").unwrap_or(defaults.name_pass_limit),
            max_stores: parsed("WIZARD_MAX_STORES")
                .unwrap_or(defaults.max_stores)
                .clamp(1, MAX_STORES),
            max_suggestions: parsed("WIZARD_MAX_SUGGESTIONS").unwrap_or(defaults.max_suggestions),
            dataset_version: lookup("WIZARD_DATASET_VERSION")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.dataset_version),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("WIZARD_LOG_FORMAT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.log_format),
            weights: defaults.weights,
        }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            brand_pass_limit: 20,
            name_pass_limit: 30,
            max_stores: MAX_STORES,
            max_suggestions: 10,
            dataset_version: 1,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            weights: ScoringWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = WizardConfig::from_lookup(lookup(&[]));
        assert_eq!(config, WizardConfig::default());
        assert_eq!(config.brand_pass_limit, 20);
        assert_eq!(config.name_pass_limit, 30);
        assert_eq!(config.max_stores, 2);
        assert_eq!(config.weights.max_score(), 7.0);
    }

    #[test]
    fn test_overrides() {
        let config = WizardConfig::from_lookup(lookup(&[
            ("WIZARD_BRAND_PASS_LIMIT", "5"),
            ("WIZARD_MAX_SUGGESTIONS", " 3 "),
            ("WIZARD_DATASET_VERSION", "7"),
            ("RUST_LOG", "wizard=debug"),
            ("WIZARD_LOG_FORMAT", "JSON"),
        ]));

        assert_eq!(config.brand_pass_limit, 5);
        assert_eq!(config.max_suggestions, 3);
        assert_eq!(config.dataset_version, 7);
        assert_eq!(config.log_level, "wizard=debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_max_stores_is_clamped() {
        let high = WizardConfig::from_lookup(lookup(&[("WIZARD_MAX_STORES", "9")]));
        assert_eq!(high.max_stores, 2);

        let low = WizardConfig::from_lookup(lookup(&[("WIZARD_MAX_STORES", "0")]));
        assert_eq!(low.max_stores, 1);
    }

    #[test]
    fn test_garbage_falls_back_to_default() {
        let config = WizardConfig::from_lookup(lookup(&[
            ("WIZARD_NAME_PASS_LIMIT", "lots"),
            ("WIZARD_LOG_FORMAT", "xml"),
        ]));
        assert_eq!(config.name_pass_limit, 30);
        assert_eq!(config.log_format, LogFormat::Text);
    }
}
