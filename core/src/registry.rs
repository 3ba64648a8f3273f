// actuate/src/registry.rs

//! Defines the `Registry`, which owns the handler lists of every action and
//! hands out immutable, priority-sorted snapshots for dispatch.
//!
//! Handler lists are keyed by action name and type-erased behind
//! `ErasedHandlerList`, so one registry can hold actions with unrelated payload
//! types. Each list is copy-on-write: mutation swaps in a fresh `Arc<Vec<..>>`,
//! and a dispatch keeps iterating the vector it cloned at its start.

use crate::core::action::{validate_action_name, Action};
use crate::core::controller::Controller;
use crate::core::entry::{boxed_action_handler, boxed_handler, ActionHandler, HandlerConfig, HandlerEntry, HandlerFn};
use crate::core::handler_id::{generate_handler_id, validate_handler_id};
use crate::error::{ActuateError, ActuateResult};
use crate::options::HandlerFilter;

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{event, instrument, Level};

/// Type-erased view of one action's handler list.
trait ErasedHandlerList: Send + Sync {
  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;
  fn action_type_id(&self) -> TypeId;
  fn action_type_name(&self) -> &'static str;
  fn len(&self) -> usize;
  fn ids(&self) -> Vec<String>;
  /// Removes entries with `id` (and, if given, that exact registration sequence).
  fn remove(&mut self, id: &str, sequence: Option<u64>) -> bool;
}

struct HandlerList<A: Action> {
  entries: Arc<Vec<Arc<HandlerEntry<A>>>>,
}

impl<A: Action> HandlerList<A> {
  fn new() -> Self {
    Self {
      entries: Arc::new(Vec::new()),
    }
  }

  fn contains_id(&self, id: &str) -> bool {
    self.entries.iter().any(|e| e.id == id)
  }

  fn insert(&mut self, entry: Arc<HandlerEntry<A>>) {
    let mut next: Vec<_> = self.entries.iter().cloned().collect();
    next.push(entry);
    next.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
    self.entries = Arc::new(next);
  }
}

impl<A: Action> ErasedHandlerList for HandlerList<A> {
  fn as_any(&self) -> &dyn Any {
    self
  }

  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }

  fn action_type_id(&self) -> TypeId {
    TypeId::of::<A>()
  }

  fn action_type_name(&self) -> &'static str {
    std::any::type_name::<A>()
  }

  fn len(&self) -> usize {
    self.entries.len()
  }

  fn ids(&self) -> Vec<String> {
    self.entries.iter().map(|e| e.id.clone()).collect()
  }

  fn remove(&mut self, id: &str, sequence: Option<u64>) -> bool {
    let matches = |e: &Arc<HandlerEntry<A>>| e.id == id && sequence.map_or(true, |s| e.sequence == s);
    if !self.entries.iter().any(matches) {
      return false;
    }
    let next: Vec<_> = self.entries.iter().filter(|e| !matches(*e)).cloned().collect();
    self.entries = Arc::new(next);
    true
  }
}

struct RegistryInner {
  actions: RwLock<HashMap<String, Box<dyn ErasedHandlerList>>>,
  sequence: AtomicU64,
  warn_on_duplicate: bool,
}

impl RegistryInner {
  fn remove_from(&self, action: &str, id: &str, sequence: Option<u64>) -> bool {
    let mut actions = self.actions.write();
    match actions.get_mut(action) {
      Some(list) => list.remove(id, sequence),
      None => false,
    }
  }
}

/// Owns every action's handlers. Cheap to clone; clones share state.
///
/// Construct one per independent pipeline and pass it where it is needed.
#[derive(Clone)]
pub struct Registry {
  inner: Arc<RegistryInner>,
}

/// The handlers one dispatch will consider, in execution order.
pub struct HandlerSnapshot<A: Action> {
  pub(crate) entries: Vec<Arc<HandlerEntry<A>>>,
  /// Registered handlers left out by the dispatch filter.
  pub(crate) filtered_out: usize,
}

impl<A: Action> HandlerSnapshot<A> {
  pub fn entries(&self) -> &[Arc<HandlerEntry<A>>] {
    &self.entries
  }

  pub fn ids(&self) -> Vec<&str> {
    self.entries.iter().map(|e| e.id.as_str()).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn filtered_out(&self) -> usize {
    self.filtered_out
  }
}

impl Registry {
  /// Creates an empty registry that logs duplicate-id registrations at WARN.
  pub fn new() -> Self {
    Self::with_duplicate_warnings(true)
  }

  pub fn with_duplicate_warnings(warn_on_duplicate: bool) -> Self {
    Self {
      inner: Arc::new(RegistryInner {
        actions: RwLock::new(HashMap::new()),
        sequence: AtomicU64::new(0),
        warn_on_duplicate,
      }),
    }
  }

  /// Registers a closure handler for action `A`.
  ///
  /// If the (explicit or generated) id is already registered for `A`, nothing
  /// changes and an inert registration is returned.
  pub fn register<A, F, Fut, E>(&self, handler_fn: F, config: HandlerConfig<A>) -> ActuateResult<HandlerRegistration>
  where
    A: Action,
    F: Fn(A::Payload, Controller<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<A::Output>, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
  {
    self.register_boxed(boxed_handler(handler_fn), config)
  }

  /// Registers a struct implementing [`ActionHandler`].
  pub fn register_handler<A, H>(&self, handler: H, config: HandlerConfig<A>) -> ActuateResult<HandlerRegistration>
  where
    A: Action,
    H: ActionHandler<A>,
  {
    self.register_boxed(boxed_action_handler(handler), config)
  }

  #[instrument(
        name = "Registry::register",
        skip_all,
        fields(action = A::NAME, priority = config.priority, blocking = config.blocking),
        err(Display)
    )]
  pub(crate) fn register_boxed<A: Action>(
    &self,
    handler: HandlerFn<A>,
    mut config: HandlerConfig<A>,
  ) -> ActuateResult<HandlerRegistration> {
    validate_action_name(A::NAME)?;

    let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
    let id = match config.id.take() {
      Some(id) => {
        validate_handler_id(A::NAME, &id)?;
        id
      }
      None => generate_handler_id(A::NAME, sequence),
    };

    let mut actions = self.inner.actions.write();
    let slot = actions
      .entry(A::NAME.to_string())
      .or_insert_with(|| Box::new(HandlerList::<A>::new()));
    ensure_action_type::<A>(slot.as_ref())?;
    let list = slot
      .as_any_mut()
      .downcast_mut::<HandlerList<A>>()
      .ok_or_else(|| ActuateError::Internal(format!("handler list downcast failed for '{}'", A::NAME)))?;

    if list.contains_id(&id) {
      if self.inner.warn_on_duplicate {
        event!(Level::WARN, handler_id = %id, "Duplicate handler id; registration ignored.");
      } else {
        event!(Level::DEBUG, handler_id = %id, "Duplicate handler id; registration ignored.");
      }
      return Ok(HandlerRegistration::inert(A::NAME, id));
    }

    list.insert(Arc::new(HandlerEntry::new(id.clone(), handler, config, sequence)));
    event!(Level::DEBUG, handler_id = %id, handlers = list.entries.len(), "Handler registered.");

    Ok(HandlerRegistration {
      action: A::NAME.to_string(),
      id,
      sequence: Some(sequence),
      registry: Arc::downgrade(&self.inner),
    })
  }

  /// Returns the handlers of `A` that pass `filter`, sorted by priority
  /// (descending) and then registration order.
  ///
  /// `Ok(None)` means no handler list was ever created for `A::NAME`.
  pub fn snapshot<A: Action>(&self, filter: &HandlerFilter) -> ActuateResult<Option<HandlerSnapshot<A>>> {
    validate_action_name(A::NAME)?;
    let entries = {
      let actions = self.inner.actions.read();
      let Some(slot) = actions.get(A::NAME) else {
        return Ok(None);
      };
      ensure_action_type::<A>(slot.as_ref())?;
      let list = slot
        .as_any()
        .downcast_ref::<HandlerList<A>>()
        .ok_or_else(|| ActuateError::Internal(format!("handler list downcast failed for '{}'", A::NAME)))?;
      Arc::clone(&list.entries)
    };

    let total = entries.len();
    let matching: Vec<_> = entries.iter().filter(|e| filter.matches(e.as_ref())).cloned().collect();
    Ok(Some(HandlerSnapshot {
      filtered_out: total - matching.len(),
      entries: matching,
    }))
  }

  /// Removes every handler with `id`, whatever action it belongs to.
  /// Returns whether anything was removed; calling it again is harmless.
  pub fn unregister(&self, id: &str) -> bool {
    let mut actions = self.inner.actions.write();
    let mut removed = false;
    for list in actions.values_mut() {
      removed |= list.remove(id, None);
    }
    event!(Level::DEBUG, handler_id = id, removed, "Unregister by id.");
    removed
  }

  /// Removes the handler with `id` from `action` only.
  pub fn unregister_from(&self, action: &str, id: &str) -> bool {
    self.inner.remove_from(action, id, None)
  }

  pub fn handler_count(&self, action: &str) -> usize {
    self.inner.actions.read().get(action).map_or(0, |l| l.len())
  }

  pub fn has_handlers(&self, action: &str) -> bool {
    self.handler_count(action) > 0
  }

  /// Handler ids of `action` in execution order.
  pub fn handler_ids(&self, action: &str) -> Vec<String> {
    self.inner.actions.read().get(action).map_or_else(Vec::new, |l| l.ids())
  }

  /// Names of every action with a handler list, sorted.
  pub fn actions(&self) -> Vec<String> {
    let mut names: Vec<String> = self.inner.actions.read().keys().cloned().collect();
    names.sort();
    names
  }

  /// Drops `action`'s handler list entirely, including its type binding.
  pub fn clear_action(&self, action: &str) -> bool {
    self.inner.actions.write().remove(action).is_some()
  }

  pub fn clear(&self) {
    self.inner.actions.write().clear();
  }

  pub(crate) fn retire(&self, action: &str, id: &str, sequence: u64) -> bool {
    self.inner.remove_from(action, id, Some(sequence))
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for Registry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let actions = self.inner.actions.read();
    let mut counts: Vec<(&String, usize)> = actions.iter().map(|(k, v)| (k, v.len())).collect();
    counts.sort();
    f.debug_struct("Registry")
      .field("actions", &counts)
      .field("warn_on_duplicate", &self.inner.warn_on_duplicate)
      .finish()
  }
}

fn ensure_action_type<A: Action>(list: &dyn ErasedHandlerList) -> ActuateResult<()> {
  if list.action_type_id() != TypeId::of::<A>() {
    return Err(ActuateError::ActionTypeMismatch {
      action: A::NAME.to_string(),
      registered_type: list.action_type_name().to_string(),
      requested_type: std::any::type_name::<A>().to_string(),
    });
  }
  Ok(())
}

/// Capability to remove one registered handler.
///
/// Returned by `register`. A registration that was ignored because its id was
/// already taken is *inert*: unregistering it does nothing, so it can never
/// remove the handler that owns the id.
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
  action: String,
  id: String,
  sequence: Option<u64>,
  registry: Weak<RegistryInner>,
}

impl HandlerRegistration {
  fn inert(action: &str, id: String) -> Self {
    Self {
      action: action.to_string(),
      id,
      sequence: None,
      registry: Weak::new(),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn action(&self) -> &str {
    &self.action
  }

  /// `false` for the inert registration returned on a duplicate id.
  pub fn is_active(&self) -> bool {
    self.sequence.is_some()
  }

  /// Removes the handler. Idempotent; returns whether this call removed it.
  pub fn unregister(&self) -> bool {
    let (Some(sequence), Some(inner)) = (self.sequence, self.registry.upgrade()) else {
      return false;
    };
    let removed = inner.remove_from(&self.action, &self.id, Some(sequence));
    event!(Level::DEBUG, action = %self.action, handler_id = %self.id, removed, "Handler unregistered.");
    removed
  }
}
