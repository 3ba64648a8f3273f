// actuate/examples/basic_dispatch.rs

use actuate::{define_action, ActuateError, Controller, Dispatcher, DispatcherConfig, ExecutionOptions, HandlerConfig};
use tracing::info;

// 1. Define the payload and the action it travels with
#[derive(Clone, Debug)]
struct Signup {
  email: String,
  plan: String,
}

define_action!(UserSignup: "user.signup" { payload: Signup, output: String });

#[tokio::main]
async fn main() -> Result<(), ActuateError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
  info!("--- Basic Dispatch Example ---");

  // 2. One dispatcher per application, passed to whoever registers or dispatches
  let dispatcher = Dispatcher::new(DispatcherConfig::default());

  // 3. Handlers run by descending priority
  dispatcher.register::<UserSignup, _, _, anyhow::Error>(
    |signup: Signup, ctrl: Controller<UserSignup>| async move {
      info!("normalizing {}", signup.email);
      ctrl.modify_payload(|mut s| {
        s.email = s.email.trim().to_lowercase();
        s
      });
      Ok(None)
    },
    HandlerConfig::new().id("normalize").priority(100).blocking(true),
  )?;

  dispatcher.register::<UserSignup, _, _, anyhow::Error>(
    |signup: Signup, _ctrl: Controller<UserSignup>| async move {
      info!("creating account for {} on plan {}", signup.email, signup.plan);
      Ok(Some(format!("account:{}", signup.email)))
    },
    HandlerConfig::new().id("create-account").priority(50).blocking(true),
  )?;

  dispatcher.register::<UserSignup, _, _, anyhow::Error>(
    |signup: Signup, _ctrl: Controller<UserSignup>| async move {
      tokio::time::sleep(std::time::Duration::from_millis(20)).await;
      Ok(Some(format!("welcome-mail:{}", signup.email)))
    },
    HandlerConfig::new().id("welcome-mail").priority(10),
  )?;

  // 4. Dispatch and inspect the result
  let result = dispatcher
    .dispatch::<UserSignup>(
      Signup {
        email: "  Ada@Example.com ".to_string(),
        plan: "pro".to_string(),
      },
      ExecutionOptions::new(),
    )
    .await?;

  info!("success: {}", result.success);
  info!("results: {:?}", result.results);
  info!("final payload: {:?}", result.payload);
  info!(
    "executed {} handlers in {:?}",
    result.execution.handlers_executed, result.execution.duration
  );
  assert_eq!(
    result.results,
    vec!["account:ada@example.com".to_string(), "welcome-mail:ada@example.com".to_string()]
  );

  Ok(())
}
