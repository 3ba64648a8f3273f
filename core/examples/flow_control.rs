// actuate/examples/flow_control.rs

use actuate::{define_action, Controller, Dispatcher, ExecutionOptions, HandlerConfig, PipelineOutcome};
use tracing::info;

define_action!(Checkout: "cart.checkout" { payload: u32, output: &'static str });

fn build_dispatcher() -> Dispatcher {
  let dispatcher = Dispatcher::default();

  // Rejects empty carts outright.
  dispatcher
    .register::<Checkout, _, _, anyhow::Error>(
      |items: u32, ctrl: Controller<Checkout>| async move {
        if items == 0 {
          ctrl.abort("cart is empty");
        }
        Ok(None)
      },
      HandlerConfig::new().id("validate").priority(100),
    )
    .expect("register validate");

  // Small orders skip the fraud checks and resume at priority 50.
  dispatcher
    .register::<Checkout, _, _, anyhow::Error>(
      |items: u32, ctrl: Controller<Checkout>| async move {
        if items < 3 {
          ctrl.jump_to_priority(50);
        }
        Ok(None)
      },
      HandlerConfig::new().id("route").priority(90),
    )
    .expect("register route");

  dispatcher
    .register::<Checkout, _, _, anyhow::Error>(
      |_items: u32, _ctrl: Controller<Checkout>| async move { Ok(Some("fraud-check")) },
      HandlerConfig::new().id("fraud").priority(70),
    )
    .expect("register fraud");

  // Bulk orders are handed off and the pipeline ends here.
  dispatcher
    .register::<Checkout, _, _, anyhow::Error>(
      |items: u32, ctrl: Controller<Checkout>| async move {
        if items > 100 {
          ctrl.terminate("bulk-desk");
        }
        Ok(None)
      },
      HandlerConfig::new().id("bulk").priority(60),
    )
    .expect("register bulk");

  dispatcher
    .register::<Checkout, _, _, anyhow::Error>(
      |_items: u32, _ctrl: Controller<Checkout>| async move { Ok(Some("charged")) },
      HandlerConfig::new().id("charge").priority(50),
    )
    .expect("register charge");

  dispatcher
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Flow Control Example ---");

  let dispatcher = build_dispatcher();

  for items in [0, 2, 5, 500] {
    let result = dispatcher
      .dispatch::<Checkout>(items, ExecutionOptions::new())
      .await
      .expect("well-formed dispatch");
    info!(
      items,
      outcome = ?result.outcome,
      results = ?result.results,
      abort_reason = ?result.abort_reason,
      termination = ?result.termination_value,
      skipped = result.execution.handlers_skipped,
      "checkout dispatched"
    );
    match items {
      0 => assert_eq!(result.outcome, PipelineOutcome::Aborted),
      2 => assert_eq!(result.results, vec!["charged"]),
      5 => assert_eq!(result.results, vec!["fraud-check", "charged"]),
      _ => assert_eq!(result.termination_value, Some("bulk-desk")),
    }
  }
}
