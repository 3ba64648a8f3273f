// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every fixture

use actuate::{define_action, Controller, Dispatcher, DispatcherConfig};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

// --- Common Actions ---

// Payload is a counter handlers can rewrite; output is the handler's label.
define_action!(pub Step: "test.step" { payload: u32, output: i32 });

define_action!(pub Compose: "test.compose" { payload: String, output: String });

// --- Common Error Type for Tests ---
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Test handler failed: {0}")]
  Handler(String),

  #[error("Test validation failed: {0}")]
  Validation(String),
}

pub type TestFuture<O> = Pin<Box<dyn Future<Output = Result<Option<O>, TestError>> + Send>>;

/// Shared record of which handlers ran, in the order they ran.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<i32>>>);

impl CallLog {
  pub fn push(&self, label: i32) {
    self.0.lock().push(label);
  }

  pub fn entries(&self) -> Vec<i32> {
    self.0.lock().clone()
  }
}

// --- Common Handler Creators ---

/// Logs `label` and returns it as the handler result.
pub fn recorder(log: &CallLog, label: i32) -> impl Fn(u32, Controller<Step>) -> TestFuture<i32> + Send + Sync + 'static {
  let log = log.clone();
  move |_payload: u32, _ctrl: Controller<Step>| -> TestFuture<i32> {
    let log = log.clone();
    Box::pin(async move {
      tracing::debug!(target: "test_handlers", label, "recorder executed");
      log.push(label);
      Ok(Some(label))
    })
  }
}

/// Sleeps for `delay`, then logs and returns `label`.
pub fn sleeper(log: &CallLog, label: i32, delay: Duration) -> impl Fn(u32, Controller<Step>) -> TestFuture<i32> + Send + Sync + 'static {
  let log = log.clone();
  move |_payload: u32, _ctrl: Controller<Step>| -> TestFuture<i32> {
    let log = log.clone();
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      log.push(label);
      Ok(Some(label))
    })
  }
}

/// Logs `label` and fails with `TestError::Handler(message)`.
pub fn failer(log: &CallLog, label: i32, message: &'static str) -> impl Fn(u32, Controller<Step>) -> TestFuture<i32> + Send + Sync + 'static {
  let log = log.clone();
  move |_payload: u32, _ctrl: Controller<Step>| -> TestFuture<i32> {
    let log = log.clone();
    Box::pin(async move {
      log.push(label);
      tracing::warn!(target: "test_handlers", label, message, "failer executed");
      Err(TestError::Handler(message.to_string()))
    })
  }
}

/// Sleeps for `delay`, then returns `text`.
pub fn composer(text: &'static str, delay: Duration) -> impl Fn(String, Controller<Compose>) -> TestFuture<String> + Send + Sync + 'static {
  move |_payload: String, _ctrl: Controller<Compose>| -> TestFuture<String> {
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      Ok(Some(text.to_string()))
    })
  }
}

pub fn quiet_dispatcher() -> Dispatcher {
  Dispatcher::new(DispatcherConfig::default().warn_on_duplicate(false))
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
