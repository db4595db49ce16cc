//! Certification workflow stages and the legal transitions between them

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    Collecting,
    Analyzing,
    Deciding,
    Skipped,
    Updating,
    Updated,
    Minting,
    MintingFallback,
    Minted,
    Persisting,
    Done,
    Failed,
}

impl WorkflowStage {
    pub const ALL: [Self; 12] = [
        Self::Collecting,
        Self::Analyzing,
        Self::Deciding,
        Self::Skipped,
        Self::Updating,
        Self::Updated,
        Self::Minting,
        Self::MintingFallback,
        Self::Minted,
        Self::Persisting,
        Self::Done,
        Self::Failed,
    ];

    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal workflow transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
}

#[must_use]
pub fn allowed_transitions(from: WorkflowStage) -> Vec<WorkflowStage> {
    use WorkflowStage::*;
    match from {
        Collecting => vec![Analyzing, Failed],
        Analyzing => vec![Deciding, Failed],
        Deciding => vec![Skipped, Updating, Minting, Failed],
        Updating => vec![Updated, MintingFallback, Failed],
        Updated => vec![Done, Failed],
        Minting | MintingFallback => vec![Minted, Failed],
        Minted => vec![Persisting, Failed],
        Persisting => vec![Done, Failed],
        Skipped | Done | Failed => vec![],
    }
}

/// # Errors
/// [`IllegalTransition`] when `to` is not reachable from `from` in one step.
pub fn validate_transition(from: WorkflowStage, to: WorkflowStage) -> Result<(), IllegalTransition> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

/// Stages visited by one run, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageTrail(Vec<WorkflowStage>);

impl Default for StageTrail {
    fn default() -> Self {
        Self(vec![WorkflowStage::Collecting])
    }
}

impl StageTrail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> WorkflowStage {
        self.0.last().copied().unwrap_or(WorkflowStage::Collecting)
    }

    /// # Errors
    /// [`IllegalTransition`] if the move is not in the table.
    pub fn advance(&mut self, to: WorkflowStage) -> Result<(), IllegalTransition> {
        validate_transition(self.current(), to)?;
        tracing::debug!(from = ?self.current(), ?to, "workflow stage");
        self.0.push(to);
        Ok(())
    }

    /// Move to FAILED unless already terminal
    pub fn fail(&mut self) {
        if !self.current().is_terminal() {
            self.0.push(WorkflowStage::Failed);
        }
    }

    #[must_use]
    pub fn stages(&self) -> &[WorkflowStage] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use WorkflowStage::*;

    #[test]
    fn fallback_path_is_legal() {
        let mut trail = StageTrail::new();
        for stage in [Analyzing, Deciding, Updating, MintingFallback, Minted, Persisting, Done] {
            trail.advance(stage).unwrap();
        }
        assert!(trail.current().is_terminal());
    }

    #[test]
    fn update_success_skips_persisting() {
        assert!(validate_transition(Updated, Persisting).is_err());
        assert!(validate_transition(Updated, Done).is_ok());
    }

    #[test]
    fn cannot_mint_before_analysis() {
        let mut trail = StageTrail::new();
        let err = trail.advance(Minting).unwrap_err();
        assert_eq!(err, IllegalTransition { from: Collecting, to: Minting });
        assert_eq!(trail.stages(), &[Collecting]);
    }

    #[test]
    fn fail_is_idempotent_on_terminal() {
        let mut trail = StageTrail::new();
        trail.fail();
        trail.fail();
        assert_eq!(trail.stages(), &[Collecting, Failed]);
    }

    fn stage() -> impl Strategy<Value = WorkflowStage> {
        prop::sample::select(WorkflowStage::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn failed_reachable_from_every_non_terminal(from in stage()) {
            if !from.is_terminal() {
                prop_assert!(validate_transition(from, Failed).is_ok());
            }
        }

        #[test]
        fn terminal_stages_go_nowhere(from in stage(), to in stage()) {
            if from.is_terminal() {
                prop_assert!(validate_transition(from, to).is_err());
            }
        }

        #[test]
        fn no_stage_loops_to_itself(s in stage()) {
            prop_assert!(validate_transition(s, s).is_err());
        }
    }
}
