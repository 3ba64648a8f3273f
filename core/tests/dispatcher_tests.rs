// tests/dispatcher_tests.rs
mod common;

use actuate::{
  Controller, Dispatcher, DispatcherConfig, ExecutionMode, ExecutionOptions, HandlerConfig, HandlerFilter,
  ResultOptions,
};
use common::*;
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn three_recorders(dispatcher: &Dispatcher, log: &CallLog) {
  for label in [3, 2, 1] {
    dispatcher
      .register(recorder(log, label), HandlerConfig::<Step>::new().priority(label))
      .unwrap();
  }
}

#[tokio::test]
async fn test_result_strategies() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  three_recorders(&dispatcher, &log);

  let first = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().result(ResultOptions::first()))
    .await
    .unwrap();
  assert_eq!(first.results, vec![3]);
  assert_eq!(first.result(), Some(&3));

  let last = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().result(ResultOptions::last()))
    .await
    .unwrap();
  assert_eq!(last.results, vec![1]);

  let sum = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().result(ResultOptions::merge(|a: i32, b: i32| a + b)))
    .await
    .unwrap();
  assert_eq!(sum.results, vec![6]);

  let uncollected = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().result(ResultOptions::all().collect(false)))
    .await
    .unwrap();
  assert!(uncollected.results.is_empty());
  assert_eq!(uncollected.execution.handlers_executed, 3);
}

#[tokio::test]
async fn test_max_results_caps_collection_without_stopping_handlers() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  three_recorders(&dispatcher, &log);

  let result = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().result(ResultOptions::all().max_results(2)))
    .await
    .unwrap();

  assert_eq!(result.results, vec![3, 2]);
  assert_eq!(result.execution.results_dropped, 1);
  assert_eq!(log.entries(), vec![3, 2, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_timeout_bounds_collection_not_execution() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  let abandoned = Arc::new(AtomicBool::new(false));

  dispatcher
    .register(recorder(&log, 100), HandlerConfig::<Step>::new().priority(100))
    .unwrap();
  let flag = abandoned.clone();
  dispatcher
    .register::<Step, _, _, TestError>(
      move |_p, ctrl: Controller<Step>| {
        let flag = flag.clone();
        async move {
          tokio::time::sleep(Duration::from_millis(300)).await;
          flag.store(ctrl.is_abandoned(), Ordering::SeqCst);
          Ok(Some(50))
        }
      },
      HandlerConfig::new().priority(50).blocking(true),
    )
    .unwrap();
  dispatcher
    .register(recorder(&log, 10), HandlerConfig::<Step>::new().priority(10))
    .unwrap();

  let started = Instant::now();
  let result = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().timeout(Duration::from_millis(40)))
    .await
    .unwrap();
  let elapsed = started.elapsed();

  assert!(result.execution.timed_out);
  assert!(result.success);
  assert_eq!(result.results, vec![100]);
  assert!(elapsed < Duration::from_millis(250), "dispatch took {:?}", elapsed);
  assert_eq!(log.entries(), vec![100]);

  // The slow handler keeps running and learns it was abandoned.
  tokio::time::sleep(Duration::from_millis(400)).await;
  assert!(abandoned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_detached_handler_missing_deadline_is_dropped_from_results() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  dispatcher
    .register(sleeper(&log, 9, Duration::from_millis(500)), HandlerConfig::<Step>::new().priority(9))
    .unwrap();
  dispatcher
    .register(recorder(&log, 1), HandlerConfig::<Step>::new().priority(1))
    .unwrap();

  let result = dispatcher
    .dispatch::<Step>(0, ExecutionOptions::new().timeout(Duration::from_millis(30)))
    .await
    .unwrap();
  assert!(result.execution.timed_out);
  assert_eq!(result.results, vec![1]);
  assert_eq!(result.execution.handlers_executed, 2);
}

#[tokio::test]
async fn test_config_default_timeout_applies_when_unset() {
  setup_tracing();
  let dispatcher = Dispatcher::new(
    DispatcherConfig::default()
      .warn_on_duplicate(false)
      .default_timeout(Duration::from_millis(30)),
  );
  let log = CallLog::default();
  dispatcher
    .register(
      sleeper(&log, 1, Duration::from_millis(500)),
      HandlerConfig::<Step>::new().blocking(true),
    )
    .unwrap();

  let result = dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert!(result.execution.timed_out);
}

#[tokio::test]
async fn test_config_default_mode_and_environment() {
  setup_tracing();
  let dispatcher = Dispatcher::new(
    DispatcherConfig::default()
      .default_mode(ExecutionMode::Parallel)
      .environment("production"),
  );
  let log = CallLog::default();
  dispatcher
    .register(recorder(&log, 1), HandlerConfig::<Step>::new().environment("development"))
    .unwrap();
  dispatcher
    .register(recorder(&log, 2), HandlerConfig::<Step>::new().environment("production"))
    .unwrap();
  dispatcher.register(recorder(&log, 3), HandlerConfig::<Step>::new()).unwrap();

  let result = dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  assert_eq!(result.execution.mode, ExecutionMode::Parallel);
  assert_eq!(log.entries(), vec![2, 3]);

  // An explicit filter environment overrides the configured one.
  let dev = ExecutionOptions::<Step>::sequential().filter(HandlerFilter::new().environment("development"));
  let result = dispatcher.dispatch::<Step>(0, dev).await.unwrap();
  assert_eq!(result.execution.mode, ExecutionMode::Sequential);
  assert_eq!(result.results, vec![1, 3]);
}

#[tokio::test]
async fn test_throttle_drops_dispatches_inside_the_window() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  dispatcher.register(recorder(&log, 1), HandlerConfig::<Step>::new()).unwrap();

  let throttled = || ExecutionOptions::<Step>::new().throttle(Duration::from_millis(150));

  let first = dispatcher.dispatch::<Step>(0, throttled()).await.unwrap();
  let second = dispatcher.dispatch::<Step>(0, throttled()).await.unwrap();
  assert!(!first.execution.throttled);
  assert!(second.execution.throttled);
  assert!(second.success);
  assert_eq!(second.execution.handlers_executed, 0);
  assert_eq!(second.execution.handlers_skipped, 1);

  tokio::time::sleep(Duration::from_millis(200)).await;
  let third = dispatcher.dispatch::<Step>(0, throttled()).await.unwrap();
  assert!(!third.execution.throttled);
  assert_eq!(log.entries(), vec![1, 1]);

  let stats = dispatcher.action_stats("test.step").unwrap();
  assert_eq!(stats.dispatches, 3);
  assert_eq!(stats.throttled, 1);
  assert_eq!(stats.handlers_executed, 2);
}

#[tokio::test]
async fn test_stats_track_outcomes_and_reset() {
  setup_tracing();
  let dispatcher = quiet_dispatcher();
  let log = CallLog::default();
  let registration = dispatcher.register(recorder(&log, 1), HandlerConfig::<Step>::new()).unwrap();

  dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();
  registration.unregister();
  dispatcher
    .register(failer(&log, 2, "nope"), HandlerConfig::<Step>::new())
    .unwrap();
  dispatcher.dispatch::<Step>(0, ExecutionOptions::new()).await.unwrap();

  let stats = dispatcher.action_stats("test.step").unwrap();
  assert_eq!(stats.dispatches, 3);
  assert_eq!(stats.successes, 2);
  assert_eq!(stats.failures, 1);
  assert_eq!(stats.handlers_executed, 3);
  assert_eq!(dispatcher.all_stats().len(), 1);

  dispatcher.reset_stats();
  assert!(dispatcher.action_stats("test.step").is_none());
}

#[test]
#[serial]
fn test_config_from_env() {
  std::env::set_var("ACTUATE_STRICT_ACTIONS", "true");
  std::env::set_var("ACTUATE_DEFAULT_MODE", "race");
  std::env::set_var("ACTUATE_DEFAULT_TIMEOUT_MS", "1500");
  let loaded = DispatcherConfig::from_env();
  std::env::set_var("ACTUATE_DEFAULT_MODE", "sideways");
  let broken = DispatcherConfig::from_env();
  for key in ["ACTUATE_STRICT_ACTIONS", "ACTUATE_DEFAULT_MODE", "ACTUATE_DEFAULT_TIMEOUT_MS"] {
    std::env::remove_var(key);
  }

  let config = loaded.unwrap();
  assert!(config.strict_actions);
  assert_eq!(config.default_mode, ExecutionMode::Race);
  assert_eq!(config.default_timeout, Some(Duration::from_millis(1500)));
  assert!(broken.is_err());
}
