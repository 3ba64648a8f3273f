// actuate/src/dispatcher.rs

//! Defines `Dispatcher`, the entry point that composes a [`Registry`] with
//! dispatcher-wide defaults, throttling and per-action statistics.

use crate::config::DispatcherConfig;
use crate::core::action::{validate_action_name, Action};
use crate::core::controller::Controller;
use crate::core::entry::{ActionHandler, HandlerConfig};
use crate::error::{ActuateError, ActuateResult};
use crate::options::ExecutionOptions;
use crate::pipeline::execution;
use crate::pipeline::result::{ActionStats, ExecutionResult};
use crate::registry::{HandlerRegistration, HandlerSnapshot, Registry};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{event, instrument, Level};

/// Routes typed actions through their registered handlers.
///
/// A dispatcher owns (a handle to) its registry; several dispatchers may share
/// one registry through [`Dispatcher::with_registry`]. Throttle windows and
/// statistics are per dispatcher.
pub struct Dispatcher {
  registry: Registry,
  config: DispatcherConfig,
  last_dispatch: Mutex<HashMap<String, Instant>>,
  stats: Mutex<HashMap<String, ActionStats>>,
}

impl Dispatcher {
  /// Creates a dispatcher with a fresh registry.
  pub fn new(config: DispatcherConfig) -> Self {
    let registry = Registry::with_duplicate_warnings(config.warn_on_duplicate);
    Self::with_registry(registry, config)
  }

  /// Creates a dispatcher over an existing registry. The registry keeps its own
  /// duplicate-warning setting.
  pub fn with_registry(registry: Registry, config: DispatcherConfig) -> Self {
    event!(Level::DEBUG, config = ?config, "Dispatcher created.");
    Self {
      registry,
      config,
      last_dispatch: Mutex::new(HashMap::new()),
      stats: Mutex::new(HashMap::new()),
    }
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn config(&self) -> &DispatcherConfig {
    &self.config
  }

  /// See [`Registry::register`].
  pub fn register<A, F, Fut, E>(&self, handler_fn: F, config: HandlerConfig<A>) -> ActuateResult<HandlerRegistration>
  where
    A: Action,
    F: Fn(A::Payload, Controller<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<A::Output>, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    self.registry.register(handler_fn, config)
  }

  /// See [`Registry::register_handler`].
  pub fn register_handler<A, H>(&self, handler: H, config: HandlerConfig<A>) -> ActuateResult<HandlerRegistration>
  where
    A: Action,
    H: ActionHandler<A>,
  {
    self.registry.register_handler(handler, config)
  }

  /// See [`Registry::unregister`].
  pub fn unregister(&self, id: &str) -> bool {
    self.registry.unregister(id)
  }

  /// Runs every matching handler of `A` against `payload`.
  ///
  /// Handler failures, aborts and timeouts are reported inside the returned
  /// [`ExecutionResult`]. An `Err` means the call itself was malformed: an
  /// invalid action name, invalid options, an action name bound to another
  /// type, or an unknown action under `strict_actions`.
  ///
  /// Must be awaited within a tokio runtime; handlers that suspend are moved
  /// onto tokio tasks.
  #[instrument(
        name = "Dispatcher::dispatch",
        skip_all,
        fields(action = A::NAME),
        err(Display)
    )]
  pub async fn dispatch<A: Action>(
    &self,
    payload: A::Payload,
    options: ExecutionOptions<A>,
  ) -> ActuateResult<ExecutionResult<A>> {
    validate_action_name(A::NAME)?;
    options.validate()?;

    let ExecutionOptions {
      mode,
      mut filter,
      result: mut result_options,
      throttle,
    } = options;
    let mode = mode.unwrap_or(self.config.default_mode);
    if result_options.timeout.is_none() {
      result_options.timeout = self.config.default_timeout;
    }
    if filter.environment.is_none() {
      filter.environment = self.config.environment.clone();
    }

    let snapshot = match self.registry.snapshot::<A>(&filter)? {
      Some(snapshot) => snapshot,
      None if self.config.strict_actions => {
        event!(Level::ERROR, "Dispatch of an action that has never been registered.");
        return Err(ActuateError::UnknownAction {
          action: A::NAME.to_string(),
        });
      }
      None => HandlerSnapshot {
        entries: Vec::new(),
        filtered_out: 0,
      },
    };

    if !self.pass_throttle(A::NAME, throttle) {
      event!(Level::INFO, window_ms = throttle.map(|w| w.as_millis() as u64), "Dispatch throttled.");
      let skipped = snapshot.filtered_out + snapshot.len();
      let result = ExecutionResult::idle(payload, mode, skipped, true);
      self.record_stats(A::NAME, &result);
      return Ok(result);
    }

    let result = execution::execute(&self.registry, snapshot, payload, mode, &result_options).await;
    self.record_stats(A::NAME, &result);
    Ok(result)
  }

  /// Counters for `action`, or `None` if it was never dispatched (or stats were reset).
  pub fn action_stats(&self, action: &str) -> Option<ActionStats> {
    self.stats.lock().get(action).cloned()
  }

  /// Counters for every dispatched action, sorted by action name.
  pub fn all_stats(&self) -> Vec<(String, ActionStats)> {
    let mut all: Vec<_> = self.stats.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    all.sort_by(|a, b| a.0.cmp(&b.0));
    all
  }

  pub fn reset_stats(&self) {
    self.stats.lock().clear();
  }

  /// Records this dispatch's start unless it falls inside `window` of the
  /// previous recorded one. Throttled dispatches do not move the window.
  fn pass_throttle(&self, action: &str, window: Option<Duration>) -> bool {
    let now = Instant::now();
    let mut last = self.last_dispatch.lock();
    if let (Some(window), Some(previous)) = (window, last.get(action)) {
      if now.duration_since(*previous) < window {
        return false;
      }
    }
    last.insert(action.to_string(), now);
    true
  }

  fn record_stats<A: Action>(&self, action: &str, result: &ExecutionResult<A>) {
    self
      .stats
      .lock()
      .entry(action.to_string())
      .or_default()
      .record(&result.execution, result.success);
  }
}

impl Default for Dispatcher {
  fn default() -> Self {
    Self::new(DispatcherConfig::default())
  }
}

impl std::fmt::Debug for Dispatcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Dispatcher")
      .field("config", &self.config)
      .field("registry", &self.registry)
      .finish()
  }
}
