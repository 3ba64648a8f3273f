// actuate/src/error.rs
use anyhow::Error as AnyhowError;
use std::sync::Arc;
use thiserror::Error;

/// Errors that cross the `dispatch`/`register` boundary.
///
/// These are caller-misuse errors only. Anything a handler does wrong is
/// captured as a [`HandlerError`] inside the `ExecutionResult` instead.
#[derive(Debug, Error)]
pub enum ActuateError {
  #[error("Invalid action name '{name}': {reason}")]
  InvalidActionName { name: String, reason: String },

  #[error("Invalid handler id '{id}' for action '{action}': {reason}")]
  InvalidHandlerId {
    action: String,
    id: String,
    reason: String,
  },

  #[error("Invalid execution options for action '{action}': {message}")]
  InvalidOptions { action: String, message: String },

  #[error("Unknown action '{action}' (strict mode is enabled)")]
  UnknownAction { action: String },

  #[error("Action '{action}' is bound to {registered_type}, not {requested_type}")]
  ActionTypeMismatch {
    action: String,
    registered_type: String,
    requested_type: String,
  },

  #[error("Configuration error for '{key}': {message}")]
  Configuration { key: String, message: String },

  #[error("Internal actuate error: {0}")]
  Internal(String),
}

pub type ActuateResult<T, E = ActuateError> = std::result::Result<T, E>;

/// How a handler invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
  /// The handler returned `Err(..)`.
  Failed,
  /// The handler panicked while running.
  Panicked,
}

impl std::fmt::Display for HandlerErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      HandlerErrorKind::Failed => f.write_str("failed"),
      HandlerErrorKind::Panicked => f.write_str("panicked"),
    }
  }
}

/// A failure of a single handler, recorded into `ExecutionResult::errors`.
///
/// Never returned from `dispatch` directly. The original cause is kept behind an
/// `Arc` so results stay cheap to clone.
#[derive(Debug, Clone, Error)]
#[error("Handler '{handler_id}' for action '{action}' {kind}: {cause}")]
pub struct HandlerError {
  pub handler_id: String,
  pub action: String,
  pub kind: HandlerErrorKind,
  pub cause: Arc<AnyhowError>,
}

impl HandlerError {
  pub(crate) fn failed(handler_id: &str, action: &str, cause: AnyhowError) -> Self {
    Self {
      handler_id: handler_id.to_string(),
      action: action.to_string(),
      kind: HandlerErrorKind::Failed,
      cause: Arc::new(cause),
    }
  }

  pub(crate) fn panicked(handler_id: &str, action: &str, panic_payload: Box<dyn std::any::Any + Send>) -> Self {
    let message = if let Some(s) = panic_payload.downcast_ref::<&'static str>() {
      (*s).to_string()
    } else if let Some(s) = panic_payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_string()
    };
    Self {
      handler_id: handler_id.to_string(),
      action: action.to_string(),
      kind: HandlerErrorKind::Panicked,
      cause: Arc::new(anyhow::anyhow!("panic: {}", message)),
    }
  }

  /// Attempts to view the underlying cause as a concrete error type.
  pub fn downcast_ref<E>(&self) -> Option<&E>
  where
    E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
  {
    self.cause.downcast_ref::<E>()
  }

  pub fn is_panic(&self) -> bool {
    self.kind == HandlerErrorKind::Panicked
  }
}
