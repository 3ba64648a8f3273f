// actuate/src/core/entry.rs

//! Defines a registered handler (`HandlerEntry`), the type-erased handler
//! function it wraps, and the `HandlerConfig` builder used at registration.

use super::action::Action;
use super::controller::Controller;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a handler invocation resolves to. `Ok(None)` means "no result".
pub type HandlerOutput<A> = anyhow::Result<Option<<A as Action>::Output>>;

pub type HandlerFuture<A> = Pin<Box<dyn Future<Output = HandlerOutput<A>> + Send>>;

/// Type alias for a stored handler.
///
/// A handler takes an owned clone of the current working payload plus the
/// dispatch's controller and returns a `Send` future. The executor may move
/// that future onto a tokio task, so it must be `'static`.
pub type HandlerFn<A> = Arc<
  dyn Fn(<A as Action>::Payload, Controller<A>) -> HandlerFuture<A>
    + Send
    + Sync,
>;

/// Predicate evaluated against the working payload right before a handler would start.
pub type HandlerCondition<A> = Arc<dyn Fn(&<A as Action>::Payload) -> bool + Send + Sync + 'static>;

/// Struct-based alternative to closure handlers.
#[async_trait]
pub trait ActionHandler<A: Action>: Send + Sync + 'static {
  async fn handle(&self, payload: A::Payload, controller: Controller<A>) -> anyhow::Result<Option<A::Output>>;
}

pub(crate) fn boxed_handler<A, F, Fut, E>(handler_fn: F) -> HandlerFn<A>
where
  A: Action,
  F: Fn(A::Payload, Controller<A>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Option<A::Output>, E>> + Send + 'static,
  E: Into<anyhow::Error> + 'static,
{
  Arc::new(move |payload: A::Payload, controller: Controller<A>| -> HandlerFuture<A> {
    let user_fut = handler_fn(payload, controller);
    Box::pin(async move { user_fut.await.map_err(Into::into) })
  })
}

pub(crate) fn boxed_action_handler<A, H>(handler: H) -> HandlerFn<A>
where
  A: Action,
  H: ActionHandler<A>,
{
  let handler = Arc::new(handler);
  Arc::new(move |payload: A::Payload, controller: Controller<A>| -> HandlerFuture<A> {
    let handler = handler.clone();
    Box::pin(async move { handler.handle(payload, controller).await })
  })
}

/// A handler as held by the registry.
pub struct HandlerEntry<A: Action> {
  pub id: String,
  pub(crate) handler: HandlerFn<A>,
  pub priority: i32,
  pub blocking: bool,
  pub tags: BTreeSet<String>,
  pub category: Option<String>,
  pub environment: Option<String>,
  pub once: bool,
  pub(crate) condition: Option<HandlerCondition<A>>,
  /// Registry-wide registration order; breaks priority ties.
  pub(crate) sequence: u64,
  consumed: AtomicBool,
}

impl<A: Action> HandlerEntry<A> {
  pub(crate) fn new(id: String, handler: HandlerFn<A>, config: HandlerConfig<A>, sequence: u64) -> Self {
    Self {
      id,
      handler,
      priority: config.priority,
      blocking: config.blocking,
      tags: config.tags,
      category: config.category,
      environment: config.environment,
      once: config.once,
      condition: config.condition,
      sequence,
      consumed: AtomicBool::new(false),
    }
  }

  pub(crate) fn condition_allows(&self, payload: &A::Payload) -> bool {
    self.condition.as_ref().map_or(true, |cond| cond(payload))
  }

  /// For `once` handlers, atomically marks the entry as used. Returns `false`
  /// if another dispatch already claimed it.
  pub(crate) fn claim(&self) -> bool {
    if !self.once {
      return true;
    }
    self
      .consumed
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self.tags.contains(tag)
  }
}

impl<A: Action> std::fmt::Debug for HandlerEntry<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HandlerEntry")
      .field("id", &self.id)
      .field("priority", &self.priority)
      .field("blocking", &self.blocking)
      .field("tags", &self.tags)
      .field("category", &self.category)
      .field("environment", &self.environment)
      .field("once", &self.once)
      .field("condition_present", &self.condition.is_some())
      .field("sequence", &self.sequence)
      .finish()
  }
}

/// Registration options for a handler.
///
/// ```
/// # use actuate::{define_action, HandlerConfig};
/// # define_action!(Save: "doc.save" { payload: String });
/// let config = HandlerConfig::<Save>::new()
///   .priority(100)
///   .blocking(true)
///   .id("validator")
///   .tag("validation")
///   .condition(|doc: &String| !doc.is_empty());
/// ```
pub struct HandlerConfig<A: Action> {
  pub(crate) priority: i32,
  pub(crate) blocking: bool,
  pub(crate) id: Option<String>,
  pub(crate) tags: BTreeSet<String>,
  pub(crate) category: Option<String>,
  pub(crate) environment: Option<String>,
  pub(crate) once: bool,
  pub(crate) condition: Option<HandlerCondition<A>>,
}

impl<A: Action> HandlerConfig<A> {
  pub fn new() -> Self {
    Self {
      priority: 0,
      blocking: false,
      id: None,
      tags: BTreeSet::new(),
      category: None,
      environment: None,
      once: false,
      condition: None,
    }
  }

  pub fn priority(mut self, priority: i32) -> Self {
    self.priority = priority;
    self
  }

  /// Sequential mode only: await this handler before starting the next one.
  pub fn blocking(mut self, blocking: bool) -> Self {
    self.blocking = blocking;
    self
  }

  pub fn id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  pub fn tag(mut self, tag: impl Into<String>) -> Self {
    self.tags.insert(tag.into());
    self
  }

  pub fn tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags.extend(tags.into_iter().map(Into::into));
    self
  }

  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  /// Restricts the handler to dispatches whose filter environment matches.
  pub fn environment(mut self, environment: impl Into<String>) -> Self {
    self.environment = Some(environment.into());
    self
  }

  /// Run at most once, then drop out of the registry.
  pub fn once(mut self, once: bool) -> Self {
    self.once = once;
    self
  }

  pub fn condition(mut self, condition: impl Fn(&A::Payload) -> bool + Send + Sync + 'static) -> Self {
    self.condition = Some(Arc::new(condition));
    self
  }
}

impl<A: Action> Default for HandlerConfig<A> {
  fn default() -> Self {
    Self::new()
  }
}
