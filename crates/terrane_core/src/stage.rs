//! Invocation stages and operations.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Where an invocation is in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Normalizing,
    Validating,
    Optimizing,
    Emitting,
    /// Finished successfully
    Done,
    /// Stopped on a fatal error
    Failed,
}

impl Default for Stage {
    fn default() -> Self {
        Self::Parsing
    }
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parsing => "parsing",
            Stage::Normalizing => "normalizing",
            Stage::Validating => "validating",
            Stage::Optimizing => "optimizing",
            Stage::Emitting => "emitting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Whether `self -> next` is a legal move. `failed` is reachable from
    /// every non-terminal stage.
    pub fn can_transition(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Stage::Failed)
                | (Stage::Parsing, Stage::Normalizing)
                | (Stage::Normalizing, Stage::Validating)
                | (Stage::Validating, Stage::Optimizing)
                | (Stage::Validating, Stage::Emitting)
                | (Stage::Validating, Stage::Done)
                | (Stage::Optimizing, Stage::Emitting)
                | (Stage::Emitting, Stage::Done)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The five user-facing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Summary plus findings
    Analyze,
    /// Emit into another dialect, inferring the source dialect
    Generate,
    /// Findings only
    Validate,
    /// Optimize and emit back into the source dialect
    Optimize,
    /// Emit into another dialect from an explicit source dialect
    Convert,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Analyze => "analyze",
            Operation::Generate => "generate",
            Operation::Validate => "validate",
            Operation::Optimize => "optimize",
            Operation::Convert => "convert",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Operation::Analyze,
            Operation::Generate,
            Operation::Validate,
            Operation::Optimize,
            Operation::Convert,
        ]
    }

    /// Whether the chain continues past validation.
    pub fn emits(&self) -> bool {
        !matches!(self, Operation::Analyze | Operation::Validate)
    }

    /// Stages this operation walks through, excluding `done`.
    /// `optimizing` is included for `optimize` always, and for `generate`
    /// and `convert` when any pass is enabled.
    pub fn stages(&self, passes_enabled: bool) -> Vec<Stage> {
        let mut stages = vec![Stage::Parsing, Stage::Normalizing, Stage::Validating];
        match self {
            Operation::Analyze | Operation::Validate => {}
            Operation::Optimize => stages.extend([Stage::Optimizing, Stage::Emitting]),
            Operation::Generate | Operation::Convert => {
                if passes_enabled {
                    stages.push(Stage::Optimizing);
                }
                stages.push(Stage::Emitting);
            }
        }
        stages
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::all()
            .into_iter()
            .find(|op| op.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| CoreError::InvalidConfiguration(format!("unknown operation: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_reachable_from_any_running_stage() {
        for stage in [
            Stage::Parsing,
            Stage::Normalizing,
            Stage::Validating,
            Stage::Optimizing,
            Stage::Emitting,
        ] {
            assert!(stage.can_transition(Stage::Failed), "{}", stage);
        }
        assert!(!Stage::Done.can_transition(Stage::Failed));
        assert!(!Stage::Failed.can_transition(Stage::Parsing));
    }

    #[test]
    fn test_stages_only_move_forward() {
        assert!(Stage::Validating.can_transition(Stage::Emitting));
        assert!(!Stage::Emitting.can_transition(Stage::Optimizing));
        assert!(!Stage::Parsing.can_transition(Stage::Validating));
        assert!(!Stage::Optimizing.can_transition(Stage::Done));
    }

    #[test]
    fn test_operation_stages() {
        assert_eq!(Operation::Validate.stages(true).last(), Some(&Stage::Validating));
        assert!(Operation::Optimize.stages(false).contains(&Stage::Optimizing));
        assert!(!Operation::Convert.stages(false).contains(&Stage::Optimizing));
        assert_eq!(Operation::Generate.stages(true).len(), 5);

        for op in Operation::all() {
            let stages = op.stages(true);
            assert!(stages.windows(2).all(|w| w[0].can_transition(w[1])), "{}", op);
            let last = stages.last().copied().unwrap_or_default();
            assert!(last.can_transition(Stage::Done), "{}", op);
        }
    }

    #[test]
    fn test_operation_from_str() {
        assert_eq!("Convert".parse::<Operation>().unwrap(), Operation::Convert);
        assert!("deploy".parse::<Operation>().is_err());
    }
}
