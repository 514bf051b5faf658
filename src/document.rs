//! Server configuration
//!
//! Settings arrive as loose JSON, either in `initializationOptions` or in a
//! `workspace/didChangeConfiguration` notification. Unknown keys are ignored and
//! missing keys keep their current value.

use std::time::Duration;

use serde_json::Value;
use sklsp::debounce::DEFAULT_QUIET_PERIOD;

/// Section name clients may nest the settings under
pub const SETTINGS_SECTION: &str = "skript";

/// Configuration for the language server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub inlay_hints: bool,
    /// Quiet period between the first change of a burst and the re-index
    pub update_delay: Duration,
    pub diagnostics_enabled: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            inlay_hints: true,
            update_delay: DEFAULT_QUIET_PERIOD,
            diagnostics_enabled: true,
        }
    }
}

impl Configuration {
    /// Merge a settings object into this configuration
    pub fn apply(&mut self, value: &Value) {
        let value = value.get(SETTINGS_SECTION).unwrap_or(value);

        self.inlay_hints = value
            .get("inlayHints")
            .and_then(Value::as_bool)
            .unwrap_or(self.inlay_hints);

        self.update_delay = value
            .get("updateDelayMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.update_delay);

        self.diagnostics_enabled = value
            .get("diagnostics")
            .and_then(Value::as_bool)
            .unwrap_or(self.diagnostics_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_settings() {
        let mut config = Configuration::default();
        config.apply(&json!({ "inlayHints": false, "updateDelayMs": 200 }));
        assert!(!config.inlay_hints);
        assert_eq!(config.update_delay, Duration::from_millis(200));
        assert!(config.diagnostics_enabled);
    }

    #[test]
    fn nested_settings_and_bad_types() {
        let mut config = Configuration::default();
        config.apply(&json!({ "skript": { "diagnostics": false, "updateDelayMs": "fast" } }));
        assert!(!config.diagnostics_enabled);
        assert_eq!(config.update_delay, DEFAULT_QUIET_PERIOD);
        assert!(config.inlay_hints);
    }
}
