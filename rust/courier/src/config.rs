use serde::{Deserialize, Serialize};

/// Which host messaging namespace to bind to when more than one is present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespacePreference {
    /// Prefer the callback-style `chrome` namespace, fall back to `browser`
    #[default]
    Auto,
    /// Only bind to `chrome`
    Chrome,
    /// Only bind to `browser`
    Browser,
}

/// Settings for one messaging context.
///
/// Every field has a default, so partial JSON is accepted:
///
/// ```rust
/// use courier::{CourierConfig, NamespacePreference};
///
/// let config: CourierConfig =
///     serde_json::from_str(r#"{ "label": "popup", "namespace": "browser" }"#).unwrap();
///
/// assert_eq!(config.label, "popup");
/// assert_eq!(config.namespace, NamespacePreference::Browser);
/// assert!(config.log_handler_errors);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierConfig {
    /// Names this context in log output (e.g. "background", "popup")
    pub label: String,
    /// Host namespace selection
    pub namespace: NamespacePreference,
    /// Log handler failures on the receiving side before replying
    pub log_handler_errors: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            label: "extension".into(),
            namespace: NamespacePreference::default(),
            log_handler_errors: true,
        }
    }
}

impl CourierConfig {
    /// Sets [`CourierConfig::label`]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets [`CourierConfig::namespace`]
    pub fn with_namespace(mut self, namespace: NamespacePreference) -> Self {
        self.namespace = namespace;
        self
    }

    /// Sets [`CourierConfig::log_handler_errors`]
    pub fn with_handler_error_logging(mut self, enabled: bool) -> Self {
        self.log_handler_errors = enabled;
        self
    }
}
