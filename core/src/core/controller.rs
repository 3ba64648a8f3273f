// actuate/src/core/controller.rs

//! Defines `Controller<A>`, the handle through which a running handler steers
//! the dispatch it belongs to.

use super::action::Action;
use super::context::DispatchShared;
use super::control::ExecutionMode;
use super::entry::HandlerEntry;
use std::sync::Arc;

/// Per-dispatch flow control handed to every invoked handler.
///
/// All controllers of one dispatch share the same pipeline context; each
/// clone additionally knows which handler it was given to, for logging and
/// conflict resolution. Controllers are cheap to clone and may be moved into
/// spawned work.
pub struct Controller<A: Action> {
  shared: Arc<DispatchShared<A>>,
  handler_id: Arc<str>,
  priority: i32,
}

impl<A: Action> Controller<A> {
  pub(crate) fn for_handler(shared: Arc<DispatchShared<A>>, entry: &HandlerEntry<A>) -> Self {
    Self {
      shared,
      handler_id: Arc::from(entry.id.as_str()),
      priority: entry.priority,
    }
  }

  /// Stops the pipeline and marks the dispatch as failed.
  ///
  /// In sequential mode no further handler starts. In parallel and race mode
  /// handlers that already started keep running.
  pub fn abort(&self, reason: impl Into<String>) {
    self.shared.abort(&self.handler_id, reason.into());
  }

  /// Stops the pipeline with a final value. The dispatch counts as successful.
  pub fn terminate(&self, value: A::Output) {
    self.shared.terminate(&self.handler_id, value);
  }

  /// Adds a value to the collected results without affecting flow.
  pub fn set_result(&self, value: A::Output) {
    self.shared.set_result(&self.handler_id, value);
  }

  /// Replaces the working payload seen by handlers started after this call.
  ///
  /// Concurrent calls from other handlers of the same dispatch wait for this
  /// one to finish. `transform` may call [`Controller::payload`] but must not
  /// call `modify_payload` again; that would wait on itself.
  pub fn modify_payload(&self, transform: impl FnOnce(A::Payload) -> A::Payload) {
    self.shared.modify_payload(&self.handler_id, transform);
  }

  /// Current working payload.
  pub fn payload(&self) -> A::Payload {
    self.shared.payload()
  }

  /// Sequential mode only: after this handler, skip every remaining handler
  /// whose priority is greater than `priority`. A handler registered at exactly
  /// `priority` still runs.
  pub fn jump_to_priority(&self, priority: i32) {
    self.shared.jump_to_priority(&self.handler_id, priority);
  }

  pub fn is_aborted(&self) -> bool {
    self.shared.context.lock().aborted
  }

  pub fn is_terminated(&self) -> bool {
    self.shared.context.lock().terminated
  }

  /// `true` once the dispatch has returned without waiting for this handler
  /// (lost a race, missed the collection deadline). Work may stop early; any
  /// further result is discarded.
  pub fn is_abandoned(&self) -> bool {
    self.shared.is_abandoned()
  }

  /// Resolves when [`is_abandoned`](Self::is_abandoned) becomes `true`.
  ///
  /// Meant for `tokio::select!` inside long-running handlers.
  pub async fn abandoned(&self) {
    let mut rx = self.shared.subscribe_abandon();
    loop {
      let abandoned = *rx.borrow_and_update();
      if abandoned {
        return;
      }
      // The sender lives in the shared state this controller keeps alive.
      if rx.changed().await.is_err() {
        return;
      }
    }
  }

  pub fn handler_id(&self) -> &str {
    &self.handler_id
  }

  pub fn priority(&self) -> i32 {
    self.priority
  }

  pub fn action(&self) -> &'static str {
    self.shared.action
  }

  pub fn mode(&self) -> ExecutionMode {
    self.shared.mode
  }
}

impl<A: Action> Clone for Controller<A> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
      handler_id: Arc::clone(&self.handler_id),
      priority: self.priority,
    }
  }
}

impl<A: Action> std::fmt::Debug for Controller<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Controller")
      .field("action", &self.shared.action)
      .field("mode", &self.shared.mode)
      .field("handler_id", &self.handler_id)
      .field("priority", &self.priority)
      .finish()
  }
}
