// tests/registry_tests.rs
mod common;

use actuate::{
  define_action, Action, ActionHandler, ActuateError, Controller, Dispatcher, DispatcherConfig, ExecutionOptions,
  HandlerConfig, HandlerFilter, Registry,
};
use async_trait::async_trait;
use common::*;
use std::time::Duration;

define_action!(StepAsText: "test.step" { payload: String });
define_action!(BadName: "not a valid name" { payload: u8 });

#[tokio::test]
async fn test_duplicate_id_is_a_noop_and_original_still_fires() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();

  let original = dispatcher
    .register(recorder(&log, 1), HandlerConfig::<Step>::new().id("save").priority(1))
    .unwrap();
  let duplicate = dispatcher
    .register(recorder(&log, 2), HandlerConfig::<Step>::new().id("save").priority(99))
    .unwrap();

  assert!(original.is_active());
  assert!(!duplicate.is_active());
  assert_eq!(dispatcher.registry().handler_count(Step::NAME), 1);

  // The inert capability must not remove the original.
  assert!(!duplicate.unregister());
  dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert_eq!(log.entries(), vec![1]);
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();

  let registration = dispatcher.register(recorder(&log, 1), HandlerConfig::<Step>::new()).unwrap();
  dispatcher
    .register(recorder(&log, 2), HandlerConfig::<Step>::new().id("keep"))
    .unwrap();

  assert!(registration.unregister());
  assert!(!registration.unregister());
  assert!(!dispatcher.unregister(registration.id()));
  assert!(dispatcher.unregister("keep"));
  assert!(!dispatcher.unregister("keep"));

  let result = dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert!(result.results.is_empty());
  assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_registration_during_dispatch_only_affects_later_dispatches() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let registry = dispatcher.registry().clone();
  let log = CallLog::default();

  let inner_log = log.clone();
  dispatcher
    .register::<Step, _, _, TestError>(
      move |_p, _ctrl: Controller<Step>| {
        let registry = registry.clone();
        let log = inner_log.clone();
        async move {
          log.push(100);
          registry
            .register(recorder(&log, 50), HandlerConfig::<Step>::new().id("late").priority(50))
            .unwrap();
          Ok(None)
        }
      },
      HandlerConfig::new().priority(100).blocking(true),
    )
    .unwrap();

  let first = dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert_eq!(log.entries(), vec![100]);
  assert_eq!(first.execution.handlers_executed, 1);

  let second = dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert_eq!(log.entries(), vec![100, 100, 50]);
  assert_eq!(second.execution.handlers_executed, 2);
}

#[tokio::test]
async fn test_snapshot_reflects_filter_and_order() {
  setup_tracing();
  let registry = Registry::new();
  let log = CallLog::default();
  registry
    .register(recorder(&log, 1), HandlerConfig::<Step>::new().id("low").priority(-5).tag("x"))
    .unwrap();
  registry
    .register(recorder(&log, 2), HandlerConfig::<Step>::new().id("high").priority(5).tag("x"))
    .unwrap();
  registry
    .register(recorder(&log, 3), HandlerConfig::<Step>::new().id("untagged"))
    .unwrap();

  let snapshot = registry
    .snapshot::<Step>(&HandlerFilter::new().tags(["x"]))
    .unwrap()
    .expect("action is registered");
  assert_eq!(snapshot.ids(), vec!["high", "low"]);
  assert_eq!(snapshot.filtered_out(), 1);
  assert_eq!(
    registry.handler_ids(Step::NAME),
    vec!["high".to_string(), "untagged".to_string(), "low".to_string()]
  );
}

#[tokio::test]
async fn test_once_handler_runs_a_single_time() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();

  dispatcher
    .register(recorder(&log, 7), HandlerConfig::<Step>::new().once(true))
    .unwrap();
  dispatcher.register(recorder(&log, 1), HandlerConfig::<Step>::new()).unwrap();

  dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert_eq!(dispatcher.registry().handler_count(Step::NAME), 1);
  dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();

  assert_eq!(log.entries(), vec![7, 1, 1]);
}

#[tokio::test]
async fn test_once_handler_is_claimed_by_a_single_concurrent_dispatch() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  dispatcher
    .register(
      sleeper(&log, 7, Duration::from_millis(20)),
      HandlerConfig::<Step>::new().once(true).blocking(true),
    )
    .unwrap();

  let (a, b) = tokio::join!(
    dispatcher.dispatch::<Step>(0, ExecutionOptions::new()),
    dispatcher.dispatch::<Step>(0, ExecutionOptions::new()),
  );
  let executed = a.unwrap().execution.handlers_executed + b.unwrap().execution.handlers_executed;
  assert_eq!(executed, 1);
  assert_eq!(log.entries(), vec![7]);
}

#[tokio::test]
async fn test_action_name_bound_to_another_type_is_rejected() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  dispatcher.register(recorder(&log, 1), HandlerConfig::<Step>::new()).unwrap();

  let err = dispatcher
    .dispatch::<StepAsText>("hello".to_string(), ExecutionOptions::new())
    .await
    .unwrap_err();
  assert!(matches!(err, ActuateError::ActionTypeMismatch { .. }));

  let err = dispatcher
    .register::<StepAsText, _, _, TestError>(|_p, _c| async { Ok(None) }, HandlerConfig::new())
    .unwrap_err();
  assert!(matches!(err, ActuateError::ActionTypeMismatch { .. }));
}

#[tokio::test]
async fn test_invalid_action_name_is_rejected_at_both_call_sites() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();

  let err = dispatcher
    .register::<BadName, _, _, TestError>(|_p, _c| async { Ok(None) }, HandlerConfig::new())
    .unwrap_err();
  assert!(matches!(err, ActuateError::InvalidActionName { .. }));

  let err = dispatcher.dispatch::<BadName>(1, ExecutionOptions::new()).await.unwrap_err();
  assert!(matches!(err, ActuateError::InvalidActionName { .. }));
}

struct Doubler;

#[async_trait]
impl ActionHandler<Step> for Doubler {
  async fn handle(&self, payload: u32, controller: Controller<Step>) -> anyhow::Result<Option<i32>> {
    if payload > 1_000 {
      return Err(TestError::Validation(format!("{} is too large", payload)).into());
    }
    controller.modify_payload(|n| n * 2);
    Ok(Some(payload as i32 * 2))
  }
}

#[tokio::test]
async fn test_struct_handlers_behave_like_closures() {
  setup_tracing();
  let dispatcher = Dispatcher::new(DispatcherConfig::default());
  dispatcher
    .register_handler(Doubler, HandlerConfig::<Step>::new().id("doubler"))
    .unwrap();

  let ok = dispatcher.dispatch::<Step>(21, ExecutionOptions::new()).await.unwrap();
  assert_eq!(ok.results, vec![42]);
  assert_eq!(ok.payload, 42);

  let failed = dispatcher.dispatch::<Step>(5_000, ExecutionOptions::new()).await.unwrap();
  assert!(!failed.success);
  assert!(matches!(
    failed.errors[0].downcast_ref::<TestError>(),
    Some(TestError::Validation(_))
  ));
}

#[tokio::test]
async fn test_clear_action_forgets_type_binding() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  dispatcher.register(recorder(&log, 1), HandlerConfig::<Step>::new()).unwrap();
  assert_eq!(dispatcher.registry().actions(), vec![Step::NAME.to_string()]);

  assert!(dispatcher.registry().clear_action(Step::NAME));
  assert!(dispatcher
    .register::<StepAsText, _, _, TestError>(|_p, _c| async { Ok(None) }, HandlerConfig::new())
    .is_ok());
}
