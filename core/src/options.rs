// actuate/src/options.rs

//! Per-dispatch options: concurrency mode, handler filter, result collection
//! and throttling.

use crate::core::action::Action;
use crate::core::control::ExecutionMode;
use crate::core::entry::HandlerEntry;
use crate::error::{ActuateError, ActuateResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Reducer used by [`ResultStrategy::Merge`].
///
/// Results are folded left to right in completion order. If the reducer is not
/// commutative, the aggregate depends on which handler finished first.
pub type Merger<O> = Arc<dyn Fn(O, O) -> O + Send + Sync + 'static>;

/// Selects which registered handlers take part in a dispatch.
///
/// Every set field must match; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerFilter {
  /// Handler must carry at least one of these tags.
  pub tags: BTreeSet<String>,
  /// Handler must carry none of these tags.
  pub exclude_tags: BTreeSet<String>,
  pub category: Option<String>,
  /// Handlers with no environment always match; others must equal this.
  pub environment: Option<String>,
}

impl HandlerFilter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags.extend(tags.into_iter().map(Into::into));
    self
  }

  pub fn exclude_tags<I, S>(mut self, tags: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.exclude_tags.extend(tags.into_iter().map(Into::into));
    self
  }

  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.category = Some(category.into());
    self
  }

  pub fn environment(mut self, environment: impl Into<String>) -> Self {
    self.environment = Some(environment.into());
    self
  }

  pub fn matches<A: Action>(&self, entry: &HandlerEntry<A>) -> bool {
    if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.has_tag(t)) {
      return false;
    }
    if self.exclude_tags.iter().any(|t| entry.has_tag(t)) {
      return false;
    }
    if let Some(category) = &self.category {
      if entry.category.as_deref() != Some(category.as_str()) {
        return false;
      }
    }
    match (&self.environment, &entry.environment) {
      (Some(wanted), Some(declared)) => wanted == declared,
      _ => true,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultStrategy {
  /// Earliest result only.
  First,
  /// Latest result only.
  Last,
  /// Every result, in completion order.
  #[default]
  All,
  /// All results folded into one by the configured [`Merger`].
  Merge,
}

/// How handler results are aggregated into `ExecutionResult::results`.
pub struct ResultOptions<O> {
  pub collect: bool,
  pub strategy: ResultStrategy,
  /// Bounds result collection, not handler execution.
  pub timeout: Option<Duration>,
  pub max_results: Option<usize>,
  pub merger: Option<Merger<O>>,
}

impl<O> ResultOptions<O> {
  pub fn all() -> Self {
    Self::with_strategy(ResultStrategy::All)
  }

  pub fn first() -> Self {
    Self::with_strategy(ResultStrategy::First)
  }

  pub fn last() -> Self {
    Self::with_strategy(ResultStrategy::Last)
  }

  pub fn merge(merger: impl Fn(O, O) -> O + Send + Sync + 'static) -> Self {
    Self {
      merger: Some(Arc::new(merger)),
      ..Self::with_strategy(ResultStrategy::Merge)
    }
  }

  fn with_strategy(strategy: ResultStrategy) -> Self {
    Self {
      collect: true,
      strategy,
      timeout: None,
      max_results: None,
      merger: None,
    }
  }

  pub fn collect(mut self, collect: bool) -> Self {
    self.collect = collect;
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn max_results(mut self, max_results: usize) -> Self {
    self.max_results = Some(max_results);
    self
  }
}

impl<O> Default for ResultOptions<O> {
  fn default() -> Self {
    Self::all()
  }
}

impl<O> Clone for ResultOptions<O> {
  fn clone(&self) -> Self {
    Self {
      collect: self.collect,
      strategy: self.strategy,
      timeout: self.timeout,
      max_results: self.max_results,
      merger: self.merger.clone(),
    }
  }
}

impl<O> std::fmt::Debug for ResultOptions<O> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResultOptions")
      .field("collect", &self.collect)
      .field("strategy", &self.strategy)
      .field("timeout", &self.timeout)
      .field("max_results", &self.max_results)
      .field("merger_present", &self.merger.is_some())
      .finish()
  }
}

/// Options for one `dispatch` call.
///
/// Unset values fall back to the dispatcher's `DispatcherConfig`.
pub struct ExecutionOptions<A: Action> {
  pub mode: Option<ExecutionMode>,
  pub filter: HandlerFilter,
  pub result: ResultOptions<A::Output>,
  /// Skip this dispatch if the same action was dispatched less than this long ago.
  pub throttle: Option<Duration>,
}

impl<A: Action> ExecutionOptions<A> {
  pub fn new() -> Self {
    Self {
      mode: None,
      filter: HandlerFilter::default(),
      result: ResultOptions::default(),
      throttle: None,
    }
  }

  pub fn sequential() -> Self {
    Self::new().mode(ExecutionMode::Sequential)
  }

  pub fn parallel() -> Self {
    Self::new().mode(ExecutionMode::Parallel)
  }

  pub fn race() -> Self {
    Self::new().mode(ExecutionMode::Race)
  }

  pub fn mode(mut self, mode: ExecutionMode) -> Self {
    self.mode = Some(mode);
    self
  }

  pub fn filter(mut self, filter: HandlerFilter) -> Self {
    self.filter = filter;
    self
  }

  pub fn result(mut self, result: ResultOptions<A::Output>) -> Self {
    self.result = result;
    self
  }

  /// Shorthand for setting only the collection timeout.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.result.timeout = Some(timeout);
    self
  }

  pub fn throttle(mut self, window: Duration) -> Self {
    self.throttle = Some(window);
    self
  }

  pub(crate) fn validate(&self) -> ActuateResult<()> {
    let invalid = |message: &str| ActuateError::InvalidOptions {
      action: A::NAME.to_string(),
      message: message.to_string(),
    };

    if self.result.strategy == ResultStrategy::Merge && self.result.merger.is_none() {
      return Err(invalid("merge strategy requires a merger"));
    }
    if self.result.max_results == Some(0) {
      return Err(invalid("max_results must be at least 1"));
    }
    if self.result.timeout == Some(Duration::ZERO) {
      return Err(invalid("result timeout must be greater than zero"));
    }
    if self.throttle == Some(Duration::ZERO) {
      return Err(invalid("throttle window must be greater than zero"));
    }
    Ok(())
  }
}

impl<A: Action> Default for ExecutionOptions<A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A: Action> Clone for ExecutionOptions<A> {
  fn clone(&self) -> Self {
    Self {
      mode: self.mode,
      filter: self.filter.clone(),
      result: self.result.clone(),
      throttle: self.throttle,
    }
  }
}

impl<A: Action> std::fmt::Debug for ExecutionOptions<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionOptions")
      .field("action", &A::NAME)
      .field("mode", &self.mode)
      .field("filter", &self.filter)
      .field("result", &self.result)
      .field("throttle", &self.throttle)
      .finish()
  }
}
