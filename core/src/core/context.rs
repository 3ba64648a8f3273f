// actuate/src/core/context.rs

//! The per-dispatch pipeline context and the shared cell that the executor
//! and every controller of one dispatch point at.

use super::action::Action;
use super::control::ExecutionMode;
use crate::error::HandlerError;
use crate::options::ResultOptions;
use crate::pipeline::collector::ResultCollector;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{event, Level};

/// Mutable state of one dispatch. Never shared across dispatches.
///
/// Mutation rules when several handlers run at once: the first `modify_payload`
/// wins, every `set_result` is appended, and whichever of `abort`/`terminate`
/// lands first stops the pipeline (the other is ignored). Once the dispatch is
/// sealed, every further write is discarded.
pub(crate) struct PipelineContext<A: Action> {
  pub working_payload: A::Payload,
  payload_writer: Option<String>,
  pub aborted: bool,
  pub abort_reason: Option<String>,
  pub terminated: bool,
  pub termination_value: Option<A::Output>,
  pub jump_target: Option<i32>,
  pub collector: ResultCollector<A::Output>,
  pub sealed: bool,
}

impl<A: Action> PipelineContext<A> {
  pub(crate) fn new(payload: A::Payload, result_options: &ResultOptions<A::Output>) -> Self {
    Self {
      working_payload: payload,
      payload_writer: None,
      aborted: false,
      abort_reason: None,
      terminated: false,
      termination_value: None,
      jump_target: None,
      collector: ResultCollector::new(result_options),
      sealed: false,
    }
  }

  pub(crate) fn is_stopped(&self) -> bool {
    self.aborted || self.terminated
  }
}

/// Everything one dispatch's controllers share with its executor.
pub(crate) struct DispatchShared<A: Action> {
  pub action: &'static str,
  pub mode: ExecutionMode,
  pub context: Mutex<PipelineContext<A>>,
  /// Held across a whole `modify_payload`, so overlapping transforms apply one after another.
  write_gate: Mutex<()>,
  abandon_tx: watch::Sender<bool>,
}

impl<A: Action> DispatchShared<A> {
  pub(crate) fn new(mode: ExecutionMode, payload: A::Payload, result_options: &ResultOptions<A::Output>) -> Self {
    let (abandon_tx, _) = watch::channel(false);
    Self {
      action: A::NAME,
      mode,
      context: Mutex::new(PipelineContext::new(payload, result_options)),
      write_gate: Mutex::new(()),
      abandon_tx,
    }
  }

  pub(crate) fn abort(&self, handler_id: &str, reason: String) {
    let mut ctx = self.context.lock();
    if ctx.sealed {
      event!(Level::TRACE, handler_id, "abort after dispatch was sealed; ignored.");
      return;
    }
    if ctx.is_stopped() {
      event!(Level::DEBUG, handler_id, "Pipeline already stopped; abort ignored.");
      return;
    }
    event!(Level::INFO, handler_id, reason = %reason, "Pipeline aborted by handler.");
    ctx.aborted = true;
    ctx.abort_reason = Some(reason);
  }

  pub(crate) fn terminate(&self, handler_id: &str, value: A::Output) {
    let mut ctx = self.context.lock();
    if ctx.sealed {
      event!(Level::TRACE, handler_id, "terminate after dispatch was sealed; ignored.");
      return;
    }
    if ctx.is_stopped() {
      event!(Level::DEBUG, handler_id, "Pipeline already stopped; terminate ignored.");
      return;
    }
    event!(Level::INFO, handler_id, "Pipeline terminated by handler.");
    ctx.terminated = true;
    ctx.termination_value = Some(value);
  }

  pub(crate) fn set_result(&self, handler_id: &str, value: A::Output) {
    let mut ctx = self.context.lock();
    if ctx.sealed {
      event!(Level::TRACE, handler_id, "set_result after dispatch was sealed; ignored.");
      return;
    }
    if !ctx.collector.accept(value) {
      event!(Level::TRACE, handler_id, "Result not kept by collector.");
    }
  }

  pub(crate) fn payload(&self) -> A::Payload {
    self.context.lock().working_payload.clone()
  }

  /// Applies `transform` to the working payload.
  ///
  /// Writers are serialized by `write_gate` for the whole read, transform and
  /// write, so a detached handler running next to a sequential one cannot lose
  /// its update. The context lock itself is released while `transform` runs, so
  /// the transform may read the controller but must not call `modify_payload`.
  pub(crate) fn modify_payload(&self, handler_id: &str, transform: impl FnOnce(A::Payload) -> A::Payload) {
    let _writer = self.write_gate.lock();
    let current = {
      let mut ctx = self.context.lock();
      if ctx.sealed {
        event!(Level::TRACE, handler_id, "modify_payload after dispatch was sealed; ignored.");
        return;
      }
      if self.mode != ExecutionMode::Sequential {
        if let Some(writer) = &ctx.payload_writer {
          if writer != handler_id {
            event!(Level::WARN, handler_id, first_writer = %writer, "Conflicting modify_payload in concurrent dispatch; first writer wins.");
            return;
          }
        }
        ctx.payload_writer = Some(handler_id.to_string());
      }
      ctx.working_payload.clone()
    };

    let next = transform(current);

    let mut ctx = self.context.lock();
    if ctx.sealed {
      return;
    }
    ctx.working_payload = next;
    event!(Level::TRACE, handler_id, "Working payload replaced.");
  }

  pub(crate) fn jump_to_priority(&self, handler_id: &str, priority: i32) {
    if self.mode != ExecutionMode::Sequential {
      event!(Level::DEBUG, handler_id, mode = %self.mode, "jump_to_priority outside sequential mode; ignored.");
      return;
    }
    let mut ctx = self.context.lock();
    if ctx.sealed {
      return;
    }
    event!(Level::DEBUG, handler_id, target_priority = priority, "Jump requested.");
    // Two jumps before the executor looks again: the lower target wins, jumps never go back up.
    ctx.jump_target = Some(ctx.jump_target.map_or(priority, |t| t.min(priority)));
  }

  pub(crate) fn record_error(&self, error: HandlerError) {
    let mut ctx = self.context.lock();
    if ctx.sealed {
      event!(Level::TRACE, handler_id = %error.handler_id, "Late handler error after seal; discarded.");
      return;
    }
    ctx.collector.record_error(error);
  }

  /// Stops accepting writes and tells any handler still running that nobody is listening.
  pub(crate) fn seal(&self) {
    self.context.lock().sealed = true;
    self.abandon_tx.send_replace(true);
  }

  pub(crate) fn is_abandoned(&self) -> bool {
    *self.abandon_tx.borrow()
  }

  pub(crate) fn subscribe_abandon(&self) -> watch::Receiver<bool> {
    self.abandon_tx.subscribe()
  }
}
