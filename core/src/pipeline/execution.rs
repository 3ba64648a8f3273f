// actuate/src/pipeline/execution.rs

//! Runs one handler snapshot under a concurrency mode and turns the shared
//! dispatch state into an `ExecutionResult`.
//!
//! Every handler is started by polling its future once on the dispatching
//! task, so anything it does before its first suspension point (including
//! controller calls) is visible before the next handler is considered. A
//! handler still pending after that poll is moved onto a tokio task. Task
//! handles are never aborted: dropping one detaches the work, which is how
//! a collection deadline bounds collection and not execution.

use crate::core::action::Action;
use crate::core::context::DispatchShared;
use crate::core::control::{ExecutionMode, PipelineOutcome};
use crate::core::controller::Controller;
use crate::core::entry::HandlerEntry;
use crate::error::HandlerError;
use crate::options::ResultOptions;
use crate::pipeline::result::{ExecutionResult, ExecutionStats};
use crate::registry::{HandlerSnapshot, Registry};

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::Poll;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{event, instrument, Level};

/// What one handler invocation settled to.
type Settlement<O> = Result<Option<O>, HandlerError>;

/// A started handler still being awaited, tagged with its id.
type Joining<O> = BoxFuture<'static, (String, Settlement<O>)>;

enum Started<O> {
  Settled(Settlement<O>),
  Running(JoinHandle<Settlement<O>>),
}

struct RunState<O> {
  executed: usize,
  timed_out: bool,
  running: FuturesUnordered<Joining<O>>,
}

impl<O> RunState<O> {
  fn new() -> Self {
    Self {
      executed: 0,
      timed_out: false,
      running: FuturesUnordered::new(),
    }
  }
}

/// Executes `snapshot` for one dispatch.
///
/// Must be called from within a tokio runtime.
#[instrument(
        name = "pipeline::execute",
        skip_all,
        fields(action = A::NAME, mode = %mode, handlers = snapshot.len())
    )]
pub(crate) async fn execute<A: Action>(
  registry: &Registry,
  snapshot: HandlerSnapshot<A>,
  payload: A::Payload,
  mode: ExecutionMode,
  result_options: &ResultOptions<A::Output>,
) -> ExecutionResult<A> {
  let started_at = Instant::now();
  let deadline = result_options.timeout.map(|t| started_at + t);
  let shared = Arc::new(DispatchShared::<A>::new(mode, payload, result_options));
  event!(Level::DEBUG, "Dispatch starting.");

  let state = match mode {
    ExecutionMode::Sequential => run_sequential(registry, &snapshot, &shared, deadline).await,
    ExecutionMode::Parallel => run_parallel(registry, &snapshot, &shared, deadline).await,
    ExecutionMode::Race => run_race(registry, &snapshot, &shared, deadline).await,
  };

  // Whatever is still running from here on is abandoned.
  shared.seal();
  let abandoned = state.running.len();
  if abandoned > 0 {
    event!(Level::DEBUG, abandoned, "Handlers still running were abandoned.");
  }
  drop(state.running);

  let (collected, aborted, abort_reason, terminated, termination_value, payload) = {
    let mut ctx = shared.context.lock();
    (
      ctx.collector.finalize(A::NAME),
      ctx.aborted,
      ctx.abort_reason.clone(),
      ctx.terminated,
      ctx.termination_value.take(),
      ctx.working_payload.clone(),
    )
  };

  let success = !aborted && collected.errors.is_empty();
  let outcome = if terminated {
    PipelineOutcome::Terminated
  } else if aborted {
    PipelineOutcome::Aborted
  } else if !collected.errors.is_empty() {
    PipelineOutcome::Failed
  } else {
    PipelineOutcome::Completed
  };

  let execution = ExecutionStats {
    mode,
    duration: started_at.elapsed(),
    handlers_executed: state.executed,
    handlers_skipped: snapshot.filtered_out + (snapshot.entries.len() - state.executed),
    timed_out: state.timed_out,
    throttled: false,
    results_dropped: collected.dropped,
  };

  event!(
    Level::DEBUG,
    success,
    outcome = ?outcome,
    executed = execution.handlers_executed,
    skipped = execution.handlers_skipped,
    timed_out = execution.timed_out,
    duration_us = execution.duration.as_micros() as u64,
    "Dispatch finished."
  );

  ExecutionResult {
    success,
    outcome,
    results: collected.results,
    errors: collected.errors,
    aborted,
    abort_reason,
    terminated,
    termination_value,
    payload,
    execution,
  }
}

#[instrument(name = "pipeline::sequential", skip_all)]
async fn run_sequential<A: Action>(
  registry: &Registry,
  snapshot: &HandlerSnapshot<A>,
  shared: &Arc<DispatchShared<A>>,
  deadline: Option<Instant>,
) -> RunState<A::Output> {
  let mut state = RunState::new();

  for entry in snapshot.entries.iter() {
    let jump_target = {
      let ctx = shared.context.lock();
      if ctx.is_stopped() {
        event!(Level::DEBUG, "Pipeline stopped; remaining handlers are not started.");
        break;
      }
      ctx.jump_target
    };
    if deadline.is_some_and(|d| Instant::now() >= d) {
      event!(Level::WARN, "Collection deadline passed; remaining handlers are not started.");
      state.timed_out = true;
      break;
    }
    if jump_target.is_some_and(|target| entry.priority > target) {
      event!(Level::TRACE, handler_id = %entry.id, priority = entry.priority, "Skipped by jump.");
      continue;
    }
    let payload = shared.payload();
    if !admit(entry, shared, &payload) {
      continue;
    }

    state.executed += 1;
    let started = start(registry, entry, shared, payload).await;
    match started {
      Started::Settled(settlement) => record(shared, &entry.id, settlement),
      Started::Running(handle) if entry.blocking => {
        let joining = join(A::NAME, entry.id.clone(), handle);
        let settled = match deadline {
          Some(d) => timeout_at(d, joining).await.ok(),
          None => Some(joining.await),
        };
        match settled {
          Some((id, settlement)) => record(shared, &id, settlement),
          None => {
            event!(Level::WARN, handler_id = %entry.id, "Collection deadline passed while awaiting a blocking handler.");
            state.timed_out = true;
            break;
          }
        }
      }
      Started::Running(handle) => {
        event!(Level::TRACE, handler_id = %entry.id, "Non-blocking handler detached.");
        state.running.push(join(A::NAME, entry.id.clone(), handle));
      }
    }
  }

  if !state.timed_out {
    drain(shared, &mut state, deadline).await;
  }
  state
}

#[instrument(name = "pipeline::parallel", skip_all)]
async fn run_parallel<A: Action>(
  registry: &Registry,
  snapshot: &HandlerSnapshot<A>,
  shared: &Arc<DispatchShared<A>>,
  deadline: Option<Instant>,
) -> RunState<A::Output> {
  let mut state = RunState::new();

  for entry in snapshot.entries.iter() {
    if shared.context.lock().is_stopped() {
      event!(Level::DEBUG, "Pipeline stopped while starting handlers; the rest are not started.");
      break;
    }
    let payload = shared.payload();
    if !admit(entry, shared, &payload) {
      continue;
    }
    state.executed += 1;
    match start(registry, entry, shared, payload).await {
      Started::Settled(settlement) => record(shared, &entry.id, settlement),
      Started::Running(handle) => state.running.push(join(A::NAME, entry.id.clone(), handle)),
    }
  }

  drain(shared, &mut state, deadline).await;
  state
}

/// Conditions are checked and every invocation is built against one payload
/// snapshot before anything is spawned, so all racers see the initial payload
/// even if an early one rewrites it on another worker.
#[instrument(name = "pipeline::race", skip_all)]
async fn run_race<A: Action>(
  registry: &Registry,
  snapshot: &HandlerSnapshot<A>,
  shared: &Arc<DispatchShared<A>>,
  deadline: Option<Instant>,
) -> RunState<A::Output> {
  let mut state = RunState::new();

  let initial = shared.payload();
  let mut prepared = Vec::with_capacity(snapshot.len());
  for entry in snapshot.entries.iter() {
    if admit(entry, shared, &initial) {
      prepared.push((entry, invocation(entry, shared, initial.clone())));
    }
  }

  for (entry, fut) in prepared {
    state.executed += 1;
    let handle = tokio::spawn(fut);
    retire_once(registry, entry);
    state.running.push(join(A::NAME, entry.id.clone(), handle));
  }

  if state.running.is_empty() {
    return state;
  }

  let winner = match deadline {
    Some(d) => timeout_at(d, state.running.next()).await.ok().flatten(),
    None => state.running.next().await,
  };
  match winner {
    Some((id, settlement)) => {
      event!(Level::DEBUG, handler_id = %id, ok = settlement.is_ok(), "Race won.");
      record(shared, &id, settlement);
    }
    None => {
      event!(Level::WARN, "Collection deadline passed before any racing handler settled.");
      state.timed_out = true;
    }
  }
  state
}

/// Applies the handler's condition and `once` claim. Both count as a skip.
///
/// A panicking condition skips the handler and is recorded as that handler's
/// error.
fn admit<A: Action>(entry: &HandlerEntry<A>, shared: &DispatchShared<A>, payload: &A::Payload) -> bool {
  if entry.condition.is_some() {
    match std::panic::catch_unwind(AssertUnwindSafe(|| entry.condition_allows(payload))) {
      Ok(true) => {}
      Ok(false) => {
        event!(Level::TRACE, handler_id = %entry.id, "Skipped by condition.");
        return false;
      }
      Err(panic) => {
        let error = HandlerError::panicked(&entry.id, A::NAME, panic);
        event!(Level::ERROR, handler_id = %entry.id, error = %error.cause, "Handler condition panicked; handler skipped.");
        shared.record_error(error);
        return false;
      }
    }
  }
  if !entry.claim() {
    event!(Level::TRACE, handler_id = %entry.id, "Once-handler already used; skipped.");
    return false;
  }
  true
}

/// Builds the handler's future over `payload`. Errors and panics become a
/// `HandlerError` tagged with the handler id.
fn invocation<A: Action>(
  entry: &HandlerEntry<A>,
  shared: &Arc<DispatchShared<A>>,
  payload: A::Payload,
) -> BoxFuture<'static, Settlement<A::Output>> {
  let controller = Controller::for_handler(Arc::clone(shared), entry);
  let handler = Arc::clone(&entry.handler);
  let handler_id = entry.id.clone();
  event!(Level::TRACE, handler_id = %handler_id, priority = entry.priority, "Starting handler.");

  async move {
    match AssertUnwindSafe(async move { handler(payload, controller).await })
      .catch_unwind()
      .await
    {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(cause)) => Err(HandlerError::failed(&handler_id, A::NAME, cause)),
      Err(panic) => Err(HandlerError::panicked(&handler_id, A::NAME, panic)),
    }
  }
  .boxed()
}

async fn start<A: Action>(
  registry: &Registry,
  entry: &HandlerEntry<A>,
  shared: &Arc<DispatchShared<A>>,
  payload: A::Payload,
) -> Started<A::Output> {
  let mut fut = invocation(entry, shared, payload);
  let started = match futures::poll!(&mut fut) {
    Poll::Ready(settlement) => Started::Settled(settlement),
    Poll::Pending => Started::Running(tokio::spawn(fut)),
  };
  retire_once(registry, entry);
  started
}

fn retire_once<A: Action>(registry: &Registry, entry: &HandlerEntry<A>) {
  if entry.once && registry.retire(A::NAME, &entry.id, entry.sequence) {
    event!(Level::DEBUG, handler_id = %entry.id, "Once-handler removed from registry.");
  }
}

fn join<O: Send + 'static>(action: &'static str, handler_id: String, handle: JoinHandle<Settlement<O>>) -> Joining<O> {
  async move {
    let settlement = match handle.await {
      Ok(settlement) => settlement,
      // Handler tasks are never aborted and panics are caught inside them,
      // so this is the runtime shutting down underneath the dispatch.
      Err(join_error) => Err(HandlerError::failed(
        &handler_id,
        action,
        anyhow::Error::new(join_error),
      )),
    };
    (handler_id, settlement)
  }
  .boxed()
}

/// Collects running handlers in completion order until they are all done or
/// the deadline passes.
async fn drain<A: Action>(shared: &DispatchShared<A>, state: &mut RunState<A::Output>, deadline: Option<Instant>) {
  loop {
    let next = match deadline {
      Some(d) => match timeout_at(d, state.running.next()).await {
        Ok(next) => next,
        Err(_) => {
          event!(Level::WARN, pending = state.running.len(), "Collection deadline passed with handlers still running.");
          state.timed_out = true;
          return;
        }
      },
      None => state.running.next().await,
    };
    match next {
      Some((id, settlement)) => record(shared, &id, settlement),
      None => return,
    }
  }
}

fn record<A: Action>(shared: &DispatchShared<A>, handler_id: &str, settlement: Settlement<A::Output>) {
  match settlement {
    Ok(Some(value)) => shared.set_result(handler_id, value),
    Ok(None) => event!(Level::TRACE, handler_id, "Handler settled without a result."),
    Err(error) => {
      event!(Level::ERROR, handler_id, error = %error.cause, panicked = error.is_panic(), "Handler failed.");
      shared.record_error(error);
    }
  }
}
