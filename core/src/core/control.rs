// actuate/src/core/control.rs

//! Defines the concurrency strategy of a dispatch and the final state a
//! pipeline run ends in.

use std::fmt;
use std::str::FromStr;

/// How the handlers of one dispatch are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
  /// One after another in priority order. Flow control (abort, jump, terminate) is honored
  /// between handlers.
  #[default]
  Sequential,
  /// All handlers start together; the dispatch waits for every one of them.
  Parallel,
  /// All handlers start together; the first one to settle decides the dispatch.
  Race,
}

impl fmt::Display for ExecutionMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionMode::Sequential => f.write_str("sequential"),
      ExecutionMode::Parallel => f.write_str("parallel"),
      ExecutionMode::Race => f.write_str("race"),
    }
  }
}

impl FromStr for ExecutionMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "sequential" => Ok(ExecutionMode::Sequential),
      "parallel" => Ok(ExecutionMode::Parallel),
      "race" => Ok(ExecutionMode::Race),
      other => Err(format!(
        "unknown execution mode '{}' (expected sequential, parallel or race)",
        other
      )),
    }
  }
}

/// Terminal state of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
  /// Every started handler settled without error and nobody stopped the pipeline.
  Completed,
  /// A handler called `abort`.
  Aborted,
  /// A handler called `terminate` with a final value.
  Terminated,
  /// At least one handler failed (returned an error or panicked).
  Failed,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn modes_parse_case_insensitively() {
    assert_eq!("Sequential".parse::<ExecutionMode>(), Ok(ExecutionMode::Sequential));
    assert_eq!(" parallel ".parse::<ExecutionMode>(), Ok(ExecutionMode::Parallel));
    assert_eq!("RACE".parse::<ExecutionMode>(), Ok(ExecutionMode::Race));
    assert!("fanout".parse::<ExecutionMode>().is_err());
  }

  #[test]
  fn modes_round_trip_through_display() {
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel, ExecutionMode::Race] {
      assert_eq!(mode.to_string().parse::<ExecutionMode>(), Ok(mode));
    }
  }
}
