use thiserror::Error;
use uuid::Uuid;

/// Coarse lifecycle stage of a room. Governs which actions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomPhase {
    /// Room created; the master is still choosing songs.
    Setup,
    /// Songs are committed; players gather before the first round.
    Lobby,
    /// A song is dealt and players are placing it.
    Playing,
    /// The round has been evaluated and the answer is shown.
    Reveal,
    /// Terminal phase; a winner has been declared.
    Finished,
}

impl RoomPhase {
    /// Whether the phase graph allows a direct move from `self` to `target`.
    pub fn can_transition_to(self, target: RoomPhase) -> bool {
        use RoomPhase::*;

        matches!(
            (self, target),
            (Setup, Lobby)
                | (Setup, Playing)
                | (Lobby, Playing)
                | (Playing, Reveal)
                | (Reveal, Playing)
                | (Setup | Lobby | Playing | Reveal, Finished)
        )
    }
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// The phase the room was in when the transition was requested.
    pub from: RoomPhase,
    /// The requested target phase.
    pub to: RoomPhase,
}

/// Errors that can occur when planning a deferred transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    #[error("a transition is already pending")]
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Phase changed since the plan was created.
    #[error("phase changed during transition (expected {expected:?}, got {actual:?})")]
    PhaseMismatch {
        /// Phase when plan was created.
        expected: RoomPhase,
        /// Current phase.
        actual: RoomPhase,
    },
    /// Another transition was applied since the plan was created.
    #[error("version mismatch during transition (expected {expected}, got {actual})")]
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AbortError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A transition that has been validated but not yet applied.
///
/// Plans bridge a suspension point: the caller validates the move, releases
/// the room while talking to a collaborator, and applies the plan afterwards.
/// Applying fails if anything moved the room in the meantime.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the room was in when planning.
    pub from: RoomPhase,
    /// Phase the room will move to.
    pub to: RoomPhase,
    /// Version number after applying this plan.
    pub version_next: usize,
}

/// Phase graph of a room with versioned, optionally deferred transitions.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: RoomPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            phase: RoomPhase::Setup,
            version: 0,
            pending: None,
        }
    }
}

impl PhaseMachine {
    /// Create a machine initialised in [`RoomPhase::Setup`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Target phase of the pending plan, if any.
    pub fn pending(&self) -> Option<RoomPhase> {
        self.pending.as_ref().map(|plan| plan.to)
    }

    /// Move to `target` immediately.
    pub fn advance(&mut self, target: RoomPhase) -> Result<RoomPhase, InvalidTransition> {
        self.check(target)?;
        self.phase = target;
        self.version += 1;
        Ok(self.phase)
    }

    /// Validate a transition to `target` and record it as pending.
    pub fn plan(&mut self, target: RoomPhase) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        self.check(target)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: target,
            version_next: self.version + 1,
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition. The pending slot is cleared even when the
    /// plan turns out to be stale.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoomPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Drop a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn check(&self, target: RoomPhase) -> Result<(), InvalidTransition> {
        if self.phase.can_transition_to(target) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.phase,
                to: target,
            })
        }
    }
}
