// actuate/src/pipeline/collector.rs

//! Aggregation of handler results and errors for a single dispatch.

use crate::error::HandlerError;
use crate::options::{Merger, ResultOptions, ResultStrategy};
use std::panic::AssertUnwindSafe;

/// Handler id under which a panicking merger is reported.
pub(crate) const MERGER_ID: &str = "<merger>";

/// Accumulates results in completion order and reduces them according to a
/// [`ResultStrategy`] once the dispatch is finalized.
///
/// Errors are kept apart from successes: a failing handler never removes
/// another handler's result from the aggregate.
pub(crate) struct ResultCollector<O> {
  collect: bool,
  strategy: ResultStrategy,
  max_results: Option<usize>,
  merger: Option<Merger<O>>,
  items: Vec<O>,
  dropped: usize,
  errors: Vec<HandlerError>,
}

/// What a collector hands back when the dispatch is finalized.
pub(crate) struct Collected<O> {
  pub results: Vec<O>,
  pub errors: Vec<HandlerError>,
  pub dropped: usize,
}

impl<O> ResultCollector<O> {
  pub(crate) fn new(options: &ResultOptions<O>) -> Self {
    Self {
      collect: options.collect,
      strategy: options.strategy,
      max_results: options.max_results,
      merger: options.merger.clone(),
      items: Vec::new(),
      dropped: 0,
      errors: Vec::new(),
    }
  }

  /// Offers a value. Returns `false` if it was not kept (collection disabled
  /// or the `max_results` cap is already reached).
  pub(crate) fn accept(&mut self, value: O) -> bool {
    if !self.collect {
      return false;
    }
    if self.max_results.is_some_and(|max| self.items.len() >= max) {
      self.dropped += 1;
      return false;
    }
    self.items.push(value);
    true
  }

  pub(crate) fn record_error(&mut self, error: HandlerError) {
    self.errors.push(error);
  }

  #[cfg(test)]
  pub(crate) fn error_count(&self) -> usize {
    self.errors.len()
  }

  /// Drains the collector. Anything offered afterwards starts from empty.
  ///
  /// A merger that panics yields no merged result and a `Panicked` error
  /// reported under [`MERGER_ID`].
  pub(crate) fn finalize(&mut self, action: &str) -> Collected<O> {
    let mut items = std::mem::take(&mut self.items);
    let results = match self.strategy {
      ResultStrategy::All => items,
      ResultStrategy::First => {
        items.truncate(1);
        items
      }
      ResultStrategy::Last => items.pop().into_iter().collect(),
      ResultStrategy::Merge => match &self.merger {
        // Folded left to right in completion order; a non-commutative merger sees that order.
        Some(merger) => {
          match std::panic::catch_unwind(AssertUnwindSafe(|| items.into_iter().reduce(|acc, next| merger(acc, next)))) {
            Ok(merged) => merged.into_iter().collect(),
            Err(panic) => {
              self.errors.push(HandlerError::panicked(MERGER_ID, action, panic));
              Vec::new()
            }
          }
        }
        None => items,
      },
    };
    Collected {
      results,
      errors: std::mem::take(&mut self.errors),
      dropped: std::mem::replace(&mut self.dropped, 0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  const ACTION: &str = "test.collect";

  fn fill(options: ResultOptions<i32>, values: &[i32]) -> Collected<i32> {
    let mut collector = ResultCollector::new(&options);
    for v in values {
      collector.accept(*v);
    }
    collector.finalize(ACTION)
  }

  #[test]
  fn all_keeps_completion_order() {
    assert_eq!(fill(ResultOptions::all(), &[3, 1, 2]).results, vec![3, 1, 2]);
  }

  #[test]
  fn first_and_last_pick_one() {
    assert_eq!(fill(ResultOptions::first(), &[3, 1, 2]).results, vec![3]);
    assert_eq!(fill(ResultOptions::last(), &[3, 1, 2]).results, vec![2]);
    assert!(fill(ResultOptions::last(), &[]).results.is_empty());
  }

  #[test]
  fn merge_folds_left_to_right() {
    let collected = fill(ResultOptions::merge(|a, b| a * 10 + b), &[1, 2, 3]);
    assert_eq!(collected.results, vec![123]);
  }

  #[test]
  fn panicking_merger_is_reported_as_an_error() {
    let options = ResultOptions::merge(|a: i32, b: i32| if b == 2 { panic!("cannot merge 2") } else { a + b });
    let collected = fill(options, &[1, 2, 3]);
    assert!(collected.results.is_empty());
    assert_eq!(collected.errors.len(), 1);
    assert!(collected.errors[0].is_panic());
    assert_eq!(collected.errors[0].handler_id, MERGER_ID);
    assert_eq!(collected.errors[0].action, ACTION);
  }

  #[test]
  fn max_results_caps_and_counts_drops() {
    let collected = fill(ResultOptions::all().max_results(2), &[1, 2, 3, 4]);
    assert_eq!(collected.results, vec![1, 2]);
    assert_eq!(collected.dropped, 2);
  }

  #[test]
  fn disabled_collection_keeps_nothing() {
    let collected = fill(ResultOptions::all().collect(false), &[1, 2]);
    assert!(collected.results.is_empty());
    assert_eq!(collected.dropped, 0);
  }

  #[test]
  fn errors_do_not_displace_results() {
    let mut collector = ResultCollector::new(&ResultOptions::all());
    collector.accept(1);
    collector.record_error(HandlerError::failed("bad", "a", anyhow::anyhow!("nope")));
    collector.accept(2);
    assert_eq!(collector.error_count(), 1);
    let collected = collector.finalize(ACTION);
    assert_eq!(collected.results, vec![1, 2]);
    assert_eq!(collected.errors.len(), 1);
  }

  #[test]
  fn merger_is_shared_not_consumed() {
    let merger: Merger<String> = Arc::new(|a: String, b: String| a + &b);
    let options = ResultOptions {
      merger: Some(merger.clone()),
      ..ResultOptions::merge(|a: String, _b: String| a)
    };
    let mut collector = ResultCollector::new(&options);
    collector.accept("x".to_string());
    collector.accept("y".to_string());
    assert_eq!(collector.finalize(ACTION).results, vec!["xy".to_string()]);
    assert!(collector.finalize(ACTION).results.is_empty());
    drop(collector);
    assert_eq!(Arc::strong_count(&merger), 2);
  }
}
