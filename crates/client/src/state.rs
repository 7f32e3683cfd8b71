/// Identifier of one submit/complete cycle.
///
/// Changes on every submit so a late completion for an abandoned cycle is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Lifecycle of the coordinator: `Idle -> Sending -> (Committed | RolledBack) -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    Sending(ExchangeId),
    Committed(ExchangeId),
    RolledBack(ExchangeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeTransition {
    Submit(ExchangeId),
    Commit(ExchangeId),
    Rollback(ExchangeId),
    Settle,
}

/// Rejection reason for illegal exchange transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    AlreadySending {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    NoActiveExchange,
    ExchangeMismatch {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    /// `Settle` only leaves a terminal state.
    StillSending { active: ExchangeId },
}

pub type TransitionResult = Result<ExchangeState, TransitionRejection>;

impl ExchangeState {
    /// In-flight exchange if and only if state is `Sending`.
    pub fn active_exchange(&self) -> Option<ExchangeId> {
        match self {
            Self::Sending(id) => Some(*id),
            Self::Idle | Self::Committed(_) | Self::RolledBack(_) => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Applies one transition deterministically.
    ///
    /// A new exchange may only start from `Idle`. `Commit`/`Rollback` must name the
    /// exchange that is currently in flight.
    pub fn apply(&self, transition: ExchangeTransition) -> TransitionResult {
        match transition {
            ExchangeTransition::Submit(id) => self.apply_submit(id),
            ExchangeTransition::Commit(id) => self.apply_finish(id, Self::Committed),
            ExchangeTransition::Rollback(id) => self.apply_finish(id, Self::RolledBack),
            ExchangeTransition::Settle => self.apply_settle(),
        }
    }

    fn apply_submit(&self, id: ExchangeId) -> TransitionResult {
        match self {
            Self::Idle => Ok(Self::Sending(id)),
            Self::Sending(active) => Err(TransitionRejection::AlreadySending {
                active: *active,
                attempted: id,
            }),
            // Terminal states settle before anything else happens.
            Self::Committed(_) | Self::RolledBack(_) => Err(TransitionRejection::NoActiveExchange),
        }
    }

    fn apply_finish(
        &self,
        id: ExchangeId,
        terminal: fn(ExchangeId) -> Self,
    ) -> TransitionResult {
        match self {
            Self::Sending(active) if *active == id => Ok(terminal(id)),
            Self::Sending(active) => Err(TransitionRejection::ExchangeMismatch {
                active: *active,
                attempted: id,
            }),
            Self::Idle | Self::Committed(_) | Self::RolledBack(_) => {
                Err(TransitionRejection::NoActiveExchange)
            }
        }
    }

    fn apply_settle(&self) -> TransitionResult {
        match self {
            Self::Sending(active) => Err(TransitionRejection::StillSending { active: *active }),
            Self::Idle | Self::Committed(_) | Self::RolledBack(_) => Ok(Self::Idle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: ExchangeId = ExchangeId::new(1);
    const SECOND: ExchangeId = ExchangeId::new(2);

    #[test]
    fn submit_is_rejected_while_sending() {
        let sending = ExchangeState::Idle
            .apply(ExchangeTransition::Submit(FIRST))
            .unwrap();

        assert_eq!(
            sending.apply(ExchangeTransition::Submit(SECOND)),
            Err(TransitionRejection::AlreadySending {
                active: FIRST,
                attempted: SECOND,
            })
        );
        assert_eq!(sending.active_exchange(), Some(FIRST));
    }

    #[test]
    fn finish_requires_matching_active_exchange() {
        let sending = ExchangeState::Sending(FIRST);

        assert_eq!(
            sending.apply(ExchangeTransition::Commit(SECOND)),
            Err(TransitionRejection::ExchangeMismatch {
                active: FIRST,
                attempted: SECOND,
            })
        );
        assert_eq!(
            ExchangeState::Idle.apply(ExchangeTransition::Rollback(FIRST)),
            Err(TransitionRejection::NoActiveExchange)
        );
        assert_eq!(
            sending.apply(ExchangeTransition::Rollback(FIRST)),
            Ok(ExchangeState::RolledBack(FIRST))
        );
    }

    #[test]
    fn terminal_states_settle_to_idle() {
        for terminal in [ExchangeState::Committed(FIRST), ExchangeState::RolledBack(FIRST)] {
            assert_eq!(terminal.apply(ExchangeTransition::Settle), Ok(ExchangeState::Idle));
        }
        assert_eq!(
            ExchangeState::Sending(FIRST).apply(ExchangeTransition::Settle),
            Err(TransitionRejection::StillSending { active: FIRST })
        );
    }
}
