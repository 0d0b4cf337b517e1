//! State machine trait for status enums.
//!
//! Lifecycle enums declare their legal edges once; callers move between
//! states only through [`StateMachine::transition_to`].

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// ```ignore
/// let next = PaymentStatus::Pending.transition_to(PaymentStatus::Paid)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if the edge `self -> target` exists.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all states reachable in one step from the current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs the transition, rejecting edges that do not exist.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state has no outgoing edges.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
