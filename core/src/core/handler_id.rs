// actuate/src/core/handler_id.rs

//! Handler-id validation and generation.
//!
//! Generated ids combine the registry's monotonically increasing registration
//! sequence with 48 random bits, so a registrant cannot pre-occupy the id a
//! later handler will receive and silently shadow it through the
//! duplicate-id rule.

use crate::error::{ActuateError, ActuateResult};
use uuid::Uuid;

/// Longest accepted explicit handler id, in bytes.
pub const MAX_HANDLER_ID_LEN: usize = 128;

const RANDOM_SUFFIX_LEN: usize = 12;

/// Builds an id of the form `"{action}#{sequence}-{random}"`, shortening the
/// action part so the id never exceeds [`MAX_HANDLER_ID_LEN`].
pub(crate) fn generate_handler_id(action: &str, sequence: u64) -> String {
  // The first 12 hex digits of a v4 uuid precede the version nibble, so all of them are random.
  let random = Uuid::new_v4().simple().to_string();
  let suffix = format!("#{}-{}", sequence, &random[..RANDOM_SUFFIX_LEN]);
  let mut prefix_len = action.len().min(MAX_HANDLER_ID_LEN - suffix.len());
  while !action.is_char_boundary(prefix_len) {
    prefix_len -= 1;
  }
  format!("{}{}", &action[..prefix_len], suffix)
}

pub(crate) fn validate_handler_id(action: &str, id: &str) -> ActuateResult<()> {
  let invalid = |reason: &str| ActuateError::InvalidHandlerId {
    action: action.to_string(),
    id: id.to_string(),
    reason: reason.to_string(),
  };

  if id.is_empty() {
    return Err(invalid("handler id cannot be empty"));
  }
  if id.len() > MAX_HANDLER_ID_LEN {
    return Err(invalid(&format!("handler id exceeds {} bytes", MAX_HANDLER_ID_LEN)));
  }
  if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
    return Err(invalid("handler id cannot contain whitespace or control characters"));
  }
  Ok(())
}
