pub mod action;
pub(crate) mod context;
pub mod control;
pub mod controller;
pub mod entry;
pub mod handler_id;

// Re-export key types for easier access from other actuate modules (and lib.rs)
pub use action::{validate_action_name, Action, MAX_ACTION_NAME_LEN};
pub use control::{ExecutionMode, PipelineOutcome};
pub use controller::Controller;
pub use entry::{ActionHandler, HandlerCondition, HandlerConfig, HandlerEntry, HandlerFn, HandlerFuture, HandlerOutput};
pub use handler_id::MAX_HANDLER_ID_LEN;
