// actuate/examples/error_handling.rs

use actuate::{
  define_action, ActuateError, Controller, Dispatcher, DispatcherConfig, ExecutionOptions, HandlerConfig,
  HandlerErrorKind, ResultOptions, ResultStrategy,
};
use std::time::Duration;
use tracing::{error, info};

// 1. Define a custom application error type
#[derive(Debug, thiserror::Error)]
enum InventoryError {
  #[error("SKU '{0}' is out of stock")]
  OutOfStock(String),
}

define_action!(Reserve: "inventory.reserve" { payload: String, output: u32 });

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Error Handling Example ---");

  // Scenario 1: Handlers fail or panic, the dispatch still completes
  info!("\nScenario 1: Handler errors and panics are captured in the result");
  handler_failures_are_collected().await;

  // Scenario 2: Malformed calls are rejected with ActuateError
  info!("\nScenario 2: Dispatcher errors for malformed calls");
  malformed_calls_are_rejected().await;
}

async fn handler_failures_are_collected() {
  let dispatcher = Dispatcher::default();

  dispatcher
    .register::<Reserve, _, _, InventoryError>(
      |sku: String, _ctrl: Controller<Reserve>| async move { Err(InventoryError::OutOfStock(sku)) },
      HandlerConfig::new().id("warehouse-east").priority(30),
    )
    .expect("register warehouse-east");

  dispatcher
    .register::<Reserve, _, _, InventoryError>(
      |_sku: String, _ctrl: Controller<Reserve>| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if true {
          panic!("warehouse-west connection reset");
        }
        Ok(None)
      },
      HandlerConfig::new().id("warehouse-west").priority(20).blocking(true),
    )
    .expect("register warehouse-west");

  dispatcher
    .register::<Reserve, _, _, InventoryError>(
      |_sku: String, _ctrl: Controller<Reserve>| async move { Ok(Some(4)) },
      HandlerConfig::new().id("warehouse-north").priority(10),
    )
    .expect("register warehouse-north");

  let result = match dispatcher
    .dispatch::<Reserve>("SKU-42".to_string(), ExecutionOptions::new())
    .await
  {
    Ok(result) => result,
    Err(e) => {
      error!("Dispatch rejected unexpectedly: {}", e);
      return;
    }
  };

  info!("success: {}, outcome: {:?}", result.success, result.outcome);
  info!("reserved units: {:?}", result.results);
  for handler_error in &result.errors {
    match handler_error.kind {
      HandlerErrorKind::Failed => match handler_error.downcast_ref::<InventoryError>() {
        Some(InventoryError::OutOfStock(sku)) => {
          info!("{} reported out of stock for {}", handler_error.handler_id, sku)
        }
        None => error!("{} failed: {}", handler_error.handler_id, handler_error),
      },
      HandlerErrorKind::Panicked => error!("{} panicked: {}", handler_error.handler_id, handler_error.cause),
    }
  }
  assert!(!result.success);
  assert_eq!(result.results, vec![4]);
  assert_eq!(result.errors.len(), 2);
}

async fn malformed_calls_are_rejected() {
  let strict = Dispatcher::new(DispatcherConfig::default().strict_actions(true));

  match strict.dispatch::<Reserve>("SKU-1".to_string(), ExecutionOptions::new()).await {
    Err(ActuateError::UnknownAction { action }) => info!("strict dispatcher refused '{}'", action),
    other => error!("Expected UnknownAction, got {:?}", other.map(|r| r.outcome)),
  }

  let merge_without_merger = ExecutionOptions::<Reserve>::new().result(ResultOptions {
    strategy: ResultStrategy::Merge,
    ..ResultOptions::all()
  });
  match strict.dispatch::<Reserve>("SKU-1".to_string(), merge_without_merger).await {
    Err(e @ ActuateError::InvalidOptions { .. }) => info!("rejected options: {}", e),
    other => error!("Expected InvalidOptions, got {:?}", other.map(|r| r.outcome)),
  }

  match strict.register::<Reserve, _, _, InventoryError>(
    |_sku: String, _ctrl: Controller<Reserve>| async move { Ok(None) },
    HandlerConfig::new().id("has spaces"),
  ) {
    Err(e) => info!("rejected registration: {}", e),
    Ok(_) => error!("Expected an invalid handler id to be rejected"),
  }
}
