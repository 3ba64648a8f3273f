// src/lib.rs

//! Actuate: an asynchronous, priority-ordered action dispatch pipeline.
//!
//! An *action* is a named, typed unit of intent. Handlers register against an
//! action with a priority and are run, per dispatch, in one of three modes:
//!  - Sequential: descending priority, with abort, payload rewriting,
//!    priority jumps and early termination honored between handlers.
//!  - Parallel: everything at once, failures isolated per handler.
//!  - Race: everything at once, the first handler to settle decides.
//!
//! Results are aggregated by a configurable strategy (first, last, all, merge)
//! under an optional collection timeout and result cap.
//!
//! ```no_run
//! use actuate::{define_action, Dispatcher, DispatcherConfig, ExecutionOptions, HandlerConfig};
//!
//! define_action!(pub Greet: "greet" { payload: String, output: String });
//!
//! # async fn demo() -> actuate::ActuateResult<()> {
//! let dispatcher = Dispatcher::new(DispatcherConfig::default());
//! dispatcher.register::<Greet, _, _, anyhow::Error>(
//!   |name, _ctrl| async move { Ok(Some(format!("hello, {}", name))) },
//!   HandlerConfig::new().priority(10),
//! )?;
//!
//! let result = dispatcher.dispatch::<Greet>("ada".to_string(), ExecutionOptions::new()).await?;
//! assert!(result.success);
//! assert_eq!(result.results, vec!["hello, ada".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod registry;

// --- Re-exports for the Public API ---

pub use crate::core::action::Action;
pub use crate::core::control::{ExecutionMode, PipelineOutcome};
pub use crate::core::controller::Controller;
pub use crate::core::entry::{ActionHandler, HandlerConfig, HandlerEntry};

pub use crate::options::{ExecutionOptions, HandlerFilter, Merger, ResultOptions, ResultStrategy};
pub use crate::registry::{HandlerRegistration, HandlerSnapshot, Registry};
pub use crate::pipeline::result::{ActionStats, ExecutionResult, ExecutionStats};

pub use crate::config::DispatcherConfig;
pub use crate::dispatcher::Dispatcher;

pub use crate::error::{ActuateError, ActuateResult, HandlerError, HandlerErrorKind};
