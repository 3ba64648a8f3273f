// actuate/src/core/action.rs

//! Defines the `Action` trait: the closed, per-action payload schema that the
//! registry and the dispatcher are keyed on.

use crate::error::{ActuateError, ActuateResult};

/// Longest accepted action name, in bytes.
pub const MAX_ACTION_NAME_LEN: usize = 128;

/// A named unit of intent with a fixed payload type and a fixed handler output type.
///
/// Actions are usually zero-sized marker types, declared with [`define_action!`](crate::define_action).
/// Handlers for `A` receive an owned clone of `A::Payload` and may produce values
/// of `A::Output`, which the result collector aggregates.
pub trait Action: Send + Sync + 'static {
  /// The name handlers are registered under. Must satisfy [`validate_action_name`].
  const NAME: &'static str;

  type Payload: Clone + Send + Sync + 'static;

  type Output: Send + 'static;
}

/// Checks that `name` is usable as an action name.
///
/// Accepted: 1 to [`MAX_ACTION_NAME_LEN`] bytes of ASCII alphanumerics and `.` `_` `-` `:` `/`.
pub fn validate_action_name(name: &str) -> ActuateResult<()> {
  let invalid = |reason: &str| ActuateError::InvalidActionName {
    name: name.to_string(),
    reason: reason.to_string(),
  };

  if name.is_empty() {
    return Err(invalid("action name cannot be empty"));
  }
  if name.len() > MAX_ACTION_NAME_LEN {
    return Err(invalid(&format!(
      "action name exceeds {} bytes",
      MAX_ACTION_NAME_LEN
    )));
  }
  if let Some(bad) = name
    .chars()
    .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '/')))
  {
    return Err(invalid(&format!("unsupported character {:?}", bad)));
  }
  Ok(())
}

/// Declares a marker type implementing [`Action`].
///
/// Omitting `output` makes it `()`.
///
/// ```
/// use actuate::define_action;
///
/// #[derive(Clone)]
/// pub struct SaveUser {
///   pub name: String,
/// }
///
/// define_action!(pub SaveUserAction: "user.save" { payload: SaveUser, output: u64 });
/// ```
#[macro_export]
macro_rules! define_action {
  ($vis:vis $ty:ident : $name:literal { payload: $payload:ty, output: $output:ty $(,)? }) => {
    #[derive(Debug, Clone, Copy, Default)]
    $vis struct $ty;

    impl $crate::Action for $ty {
      const NAME: &'static str = $name;
      type Payload = $payload;
      type Output = $output;
    }
  };
  ($vis:vis $ty:ident : $name:literal { payload: $payload:ty $(,)? }) => {
    $crate::define_action!($vis $ty : $name { payload: $payload, output: () });
  };
}
