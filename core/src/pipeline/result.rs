// actuate/src/pipeline/result.rs

//! What a dispatch hands back to its caller, plus the per-action counters the
//! dispatcher keeps across dispatches.

use crate::core::action::Action;
use crate::core::control::{ExecutionMode, PipelineOutcome};
use crate::error::HandlerError;
use std::time::Duration;

/// Bookkeeping for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStats {
  pub mode: ExecutionMode,
  pub duration: Duration,
  /// Handlers that were started.
  pub handlers_executed: usize,
  /// Registered handlers that were not started: filtered out, jumped over,
  /// refused by their condition or `once`, or left behind after the pipeline stopped.
  pub handlers_skipped: usize,
  /// The collection deadline passed before every started handler settled.
  pub timed_out: bool,
  /// The dispatch was dropped by the action's throttle window.
  pub throttled: bool,
  /// Results refused because `max_results` was reached.
  pub results_dropped: usize,
}

/// Outcome of one `dispatch` call.
///
/// Handler failures live in `errors`; `dispatch` itself only fails for caller
/// misuse, so callers can branch on `success` directly.
pub struct ExecutionResult<A: Action> {
  pub success: bool,
  pub outcome: PipelineOutcome,
  pub results: Vec<A::Output>,
  pub errors: Vec<HandlerError>,
  pub aborted: bool,
  pub abort_reason: Option<String>,
  pub terminated: bool,
  pub termination_value: Option<A::Output>,
  /// Working payload after every applied `modify_payload`.
  pub payload: A::Payload,
  pub execution: ExecutionStats,
}

impl<A: Action> ExecutionResult<A> {
  pub(crate) fn idle(payload: A::Payload, mode: ExecutionMode, skipped: usize, throttled: bool) -> Self {
    Self {
      success: true,
      outcome: PipelineOutcome::Completed,
      results: Vec::new(),
      errors: Vec::new(),
      aborted: false,
      abort_reason: None,
      terminated: false,
      termination_value: None,
      payload,
      execution: ExecutionStats {
        mode,
        duration: Duration::ZERO,
        handlers_executed: 0,
        handlers_skipped: skipped,
        timed_out: false,
        throttled,
        results_dropped: 0,
      },
    }
  }

  /// The single aggregated value under `First`, `Last` or `Merge`.
  pub fn result(&self) -> Option<&A::Output> {
    self.results.first()
  }

  pub fn into_results(self) -> Vec<A::Output> {
    self.results
  }
}

impl<A: Action> std::fmt::Debug for ExecutionResult<A>
where
  A::Output: std::fmt::Debug,
  A::Payload: std::fmt::Debug,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionResult")
      .field("action", &A::NAME)
      .field("success", &self.success)
      .field("outcome", &self.outcome)
      .field("results", &self.results)
      .field("errors", &self.errors)
      .field("abort_reason", &self.abort_reason)
      .field("termination_value", &self.termination_value)
      .field("payload", &self.payload)
      .field("execution", &self.execution)
      .finish()
  }
}

/// Running totals for one action on one dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionStats {
  pub dispatches: u64,
  pub successes: u64,
  pub failures: u64,
  pub throttled: u64,
  pub timeouts: u64,
  pub handlers_executed: u64,
  pub total_duration: Duration,
}

impl ActionStats {
  pub(crate) fn record(&mut self, stats: &ExecutionStats, success: bool) {
    self.dispatches += 1;
    if stats.throttled {
      self.throttled += 1;
      return;
    }
    if success {
      self.successes += 1;
    } else {
      self.failures += 1;
    }
    if stats.timed_out {
      self.timeouts += 1;
    }
    self.handlers_executed += stats.handlers_executed as u64;
    self.total_duration += stats.duration;
  }

  /// Mean duration of the dispatches that actually ran (throttled ones excluded).
  pub fn average_duration(&self) -> Duration {
    let ran = self.dispatches - self.throttled;
    if ran == 0 {
      return Duration::ZERO;
    }
    self.total_duration / ran as u32
  }
}
