//! Graph configuration.
//!
//! [`GraphConfig`] is plain serde data, so it can be built in code or loaded
//! from JSON:
//!
//! ```rust
//! use fbpweave::GraphConfig;
//!
//! let config = GraphConfig::from_json_str(r#"{ "name": "etl", "default_capacity": 16 }"#)?;
//! assert_eq!(config.default_capacity, Some(16));
//! assert!(!config.trace_state_changes);
//! # Ok::<(), fbpweave::ConfigError>(())
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Settings applied by [`crate::Graph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
  /// Graph name, used in log events and errors.
  pub name: String,
  /// Capacity for connections wired without an explicit one. `None` means
  /// unbounded.
  pub default_capacity: Option<usize>,
  /// Emit a trace event for every component status transition.
  pub trace_state_changes: bool,
}

impl Default for GraphConfig {
  fn default() -> Self {
    Self {
      name: "graph".to_string(),
      default_capacity: None,
      trace_state_changes: false,
    }
  }
}

impl GraphConfig {
  /// Default settings with the given name.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  /// Sets the default connection capacity.
  pub fn with_default_capacity(mut self, capacity: usize) -> Self {
    self.default_capacity = Some(capacity);
    self
  }

  /// Enables or disables state-change tracing.
  pub fn with_state_tracing(mut self, enabled: bool) -> Self {
    self.trace_state_changes = enabled;
    self
  }

  /// Parses and validates a JSON document.
  ///
  /// # Errors
  ///
  /// [`ConfigError::Parse`] for malformed JSON, [`ConfigError::Invalid`] for a
  /// zero default capacity.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Checks values that deserialize fine but cannot work.
  ///
  /// # Errors
  ///
  /// [`ConfigError::Invalid`] for a zero default capacity.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.default_capacity == Some(0) {
      return Err(ConfigError::Invalid(
        "default_capacity must be at least 1".to_string(),
      ));
    }
    Ok(())
  }
}
