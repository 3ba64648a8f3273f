// actuate/examples/concurrency_modes.rs

use actuate::{define_action, Controller, Dispatcher, ExecutionOptions, HandlerConfig, ResultOptions};
use std::time::{Duration, Instant};
use tracing::info;

define_action!(Lookup: "geo.lookup" { payload: String, output: String });

// Registers a provider that answers after `latency_ms`, unless the dispatch gives up on it first.
fn provider(dispatcher: &Dispatcher, name: &'static str, latency_ms: u64, priority: i32) {
  dispatcher
    .register::<Lookup, _, _, anyhow::Error>(
      move |query: String, ctrl: Controller<Lookup>| async move {
        tokio::select! {
          _ = tokio::time::sleep(Duration::from_millis(latency_ms)) => {
            Ok(Some(format!("{}:{}", name, query)))
          }
          _ = ctrl.abandoned() => {
            info!("{} stopped, the dispatch no longer needs it", name);
            Ok(None)
          }
        }
      },
      HandlerConfig::new().id(name).priority(priority).blocking(true),
    )
    .expect("register provider");
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Concurrency Modes Example ---");

  let dispatcher = Dispatcher::default();
  provider(&dispatcher, "primary", 120, 30);
  provider(&dispatcher, "mirror", 40, 20);
  provider(&dispatcher, "archive", 250, 10);

  // Sequential: one after another, latencies add up.
  let started = Instant::now();
  let sequential = dispatcher
    .dispatch::<Lookup>("berlin".to_string(), ExecutionOptions::sequential())
    .await
    .expect("sequential dispatch");
  info!("sequential took {:?}: {:?}", started.elapsed(), sequential.results);

  // Parallel: all at once, results arrive in completion order.
  let started = Instant::now();
  let parallel = dispatcher
    .dispatch::<Lookup>("berlin".to_string(), ExecutionOptions::parallel())
    .await
    .expect("parallel dispatch");
  info!("parallel took {:?}: {:?}", started.elapsed(), parallel.results);
  assert_eq!(parallel.results[0], "mirror:berlin");

  // Race: the first provider to answer wins, the rest are told to stop.
  let started = Instant::now();
  let race = dispatcher
    .dispatch::<Lookup>("berlin".to_string(), ExecutionOptions::race())
    .await
    .expect("race dispatch");
  info!("race took {:?}: {:?}", started.elapsed(), race.result());
  assert_eq!(race.result().map(String::as_str), Some("mirror:berlin"));

  // Parallel with a deadline: whatever has not answered in time is left out.
  let bounded = dispatcher
    .dispatch::<Lookup>(
      "berlin".to_string(),
      ExecutionOptions::parallel()
        .timeout(Duration::from_millis(150))
        .result(ResultOptions::merge(|a: String, b: String| format!("{}|{}", a, b))),
    )
    .await
    .expect("bounded dispatch");
  info!(
    "bounded parallel timed_out={} merged={:?}",
    bounded.execution.timed_out,
    bounded.result()
  );

  // Give abandoned providers a moment to log before the runtime shuts down.
  tokio::time::sleep(Duration::from_millis(50)).await;

  for (action, stats) in dispatcher.all_stats() {
    info!(
      "{}: {} dispatches, {} timeouts, avg {:?}",
      action,
      stats.dispatches,
      stats.timeouts,
      stats.average_duration()
    );
  }
}
