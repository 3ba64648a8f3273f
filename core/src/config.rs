// actuate/src/config.rs

//! Dispatcher-wide defaults, optionally loaded from `ACTUATE_*` environment variables.

use crate::core::control::ExecutionMode;
use crate::error::{ActuateError, ActuateResult};
use std::env;
use std::time::Duration;
use tracing::{event, Level};

pub const ENV_STRICT_ACTIONS: &str = "ACTUATE_STRICT_ACTIONS";
pub const ENV_WARN_ON_DUPLICATE: &str = "ACTUATE_WARN_ON_DUPLICATE";
pub const ENV_DEFAULT_MODE: &str = "ACTUATE_DEFAULT_MODE";
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "ACTUATE_DEFAULT_TIMEOUT_MS";
pub const ENV_ENVIRONMENT: &str = "ACTUATE_ENVIRONMENT";

/// Defaults applied to every dispatch of a [`Dispatcher`](crate::Dispatcher).
///
/// Per-dispatch `ExecutionOptions` always take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
  /// Dispatching an action that never had a handler registered is an error.
  pub strict_actions: bool,
  /// Emit a WARN event when a registration is ignored because its id is taken.
  pub warn_on_duplicate: bool,
  pub default_mode: ExecutionMode,
  /// Collection timeout used when a dispatch does not set one.
  pub default_timeout: Option<Duration>,
  /// Filter environment used when a dispatch does not set one.
  pub environment: Option<String>,
}

impl Default for DispatcherConfig {
  fn default() -> Self {
    Self {
      strict_actions: false,
      warn_on_duplicate: true,
      default_mode: ExecutionMode::Sequential,
      default_timeout: None,
      environment: None,
    }
  }
}

impl DispatcherConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn strict_actions(mut self, strict: bool) -> Self {
    self.strict_actions = strict;
    self
  }

  pub fn warn_on_duplicate(mut self, warn: bool) -> Self {
    self.warn_on_duplicate = warn;
    self
  }

  pub fn default_mode(mut self, mode: ExecutionMode) -> Self {
    self.default_mode = mode;
    self
  }

  pub fn default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = Some(timeout);
    self
  }

  pub fn environment(mut self, environment: impl Into<String>) -> Self {
    self.environment = Some(environment.into());
    self
  }

  /// Reads the `ACTUATE_*` variables on top of the defaults. Unset variables
  /// keep their default; set but malformed ones are an error.
  pub fn from_env() -> ActuateResult<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Like [`from_env`](Self::from_env) with a custom variable source.
  pub fn from_lookup<F>(lookup: F) -> ActuateResult<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(raw) = lookup(ENV_STRICT_ACTIONS) {
      config.strict_actions = parse_flag(ENV_STRICT_ACTIONS, &raw)?;
    }
    if let Some(raw) = lookup(ENV_WARN_ON_DUPLICATE) {
      config.warn_on_duplicate = parse_flag(ENV_WARN_ON_DUPLICATE, &raw)?;
    }
    if let Some(raw) = lookup(ENV_DEFAULT_MODE) {
      config.default_mode = raw.parse::<ExecutionMode>().map_err(|message| ActuateError::Configuration {
        key: ENV_DEFAULT_MODE.to_string(),
        message,
      })?;
    }
    if let Some(raw) = lookup(ENV_DEFAULT_TIMEOUT_MS) {
      let millis = raw.trim().parse::<u64>().map_err(|e| ActuateError::Configuration {
        key: ENV_DEFAULT_TIMEOUT_MS.to_string(),
        message: format!("expected a number of milliseconds: {}", e),
      })?;
      if millis == 0 {
        return Err(ActuateError::Configuration {
          key: ENV_DEFAULT_TIMEOUT_MS.to_string(),
          message: "timeout must be greater than zero".to_string(),
        });
      }
      config.default_timeout = Some(Duration::from_millis(millis));
    }
    if let Some(raw) = lookup(ENV_ENVIRONMENT) {
      let trimmed = raw.trim();
      if !trimmed.is_empty() {
        config.environment = Some(trimmed.to_string());
      }
    }

    event!(Level::DEBUG, config = ?config, "Dispatcher configuration loaded.");
    Ok(config)
  }
}

fn parse_flag(key: &str, raw: &str) -> ActuateResult<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    other => Err(ActuateError::Configuration {
      key: key.to_string(),
      message: format!("expected a boolean, got '{}'", other),
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
  }

  #[test]
  fn empty_source_yields_defaults() {
    assert_eq!(DispatcherConfig::from_lookup(|_| None).unwrap(), DispatcherConfig::default());
  }

  #[test]
  fn every_variable_is_applied() {
    let config = DispatcherConfig::from_lookup(lookup_from(&[
      (ENV_STRICT_ACTIONS, "yes"),
      (ENV_WARN_ON_DUPLICATE, "0"),
      (ENV_DEFAULT_MODE, "Parallel"),
      (ENV_DEFAULT_TIMEOUT_MS, "250"),
      (ENV_ENVIRONMENT, " production "),
    ]))
    .unwrap();

    assert!(config.strict_actions);
    assert!(!config.warn_on_duplicate);
    assert_eq!(config.default_mode, ExecutionMode::Parallel);
    assert_eq!(config.default_timeout, Some(Duration::from_millis(250)));
    assert_eq!(config.environment.as_deref(), Some("production"));
  }

  #[test]
  fn malformed_values_name_the_variable() {
    for (key, value) in [
      (ENV_STRICT_ACTIONS, "maybe"),
      (ENV_DEFAULT_MODE, "broadcast"),
      (ENV_DEFAULT_TIMEOUT_MS, "soon"),
      (ENV_DEFAULT_TIMEOUT_MS, "0"),
    ] {
      match DispatcherConfig::from_lookup(lookup_from(&[(key, value)])) {
        Err(ActuateError::Configuration { key: reported, .. }) => assert_eq!(reported, key),
        other => panic!("expected a configuration error for {}={}, got {:?}", key, value, other),
      }
    }
  }

  #[test]
  fn builder_overrides_defaults() {
    let config = DispatcherConfig::new()
      .strict_actions(true)
      .default_mode(ExecutionMode::Race)
      .default_timeout(Duration::from_secs(1))
      .environment("staging");
    assert!(config.strict_actions);
    assert_eq!(config.default_mode, ExecutionMode::Race);
    assert_eq!(config.environment.as_deref(), Some("staging"));
  }
}
