use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RequestStatus;

impl RequestStatus {
    /// pending -> {in_progress, cancelled}, in_progress -> {rescued, cancelled}.
    /// Rescued and cancelled are terminal.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Cancelled) | (InProgress, Rescued) | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Rescued | RequestStatus::Cancelled)
    }
}

/// A status change applied as a conditional write: the store only applies it
/// while the row's current status is one of `allowed_from()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// A volunteer takes a pending request. The only move that assigns a volunteer.
    Accept { volunteer_id: Uuid },
    /// The assigned volunteer reports the victim rescued.
    Complete,
    Cancel,
}

impl Transition {
    pub fn allowed_from(&self) -> &'static [RequestStatus] {
        match self {
            Transition::Accept { .. } => &[RequestStatus::Pending],
            Transition::Complete => &[RequestStatus::InProgress],
            Transition::Cancel => &[RequestStatus::Pending, RequestStatus::InProgress],
        }
    }

    pub fn target(&self) -> RequestStatus {
        match self {
            Transition::Accept { .. } => RequestStatus::InProgress,
            Transition::Complete => RequestStatus::Rescued,
            Transition::Cancel => RequestStatus::Cancelled,
        }
    }

    pub fn assigns(&self) -> Option<Uuid> {
        match self {
            Transition::Accept { volunteer_id } => Some(*volunteer_id),
            _ => None,
        }
    }

    pub fn applies_to(&self, current: RequestStatus) -> bool {
        self.allowed_from().contains(&current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_transitions() -> [Transition; 3] {
        [
            Transition::Accept { volunteer_id: Uuid::nil() },
            Transition::Complete,
            Transition::Cancel,
        ]
    }

    #[test]
    fn terminal_states_go_nowhere() {
        for from in [RequestStatus::Rescued, RequestStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in RequestStatus::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn no_backwards_or_self_moves() {
        for status in RequestStatus::ALL {
            assert!(!status.can_transition_to(status));
            assert!(!status.can_transition_to(RequestStatus::Pending));
        }
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Rescued));
    }

    #[test]
    fn transitions_agree_with_status_lattice() {
        for t in all_transitions() {
            for from in RequestStatus::ALL {
                assert_eq!(
                    t.applies_to(from),
                    from.can_transition_to(t.target()),
                    "{:?} from {}",
                    t,
                    from
                );
            }
        }
    }

    #[test]
    fn only_accept_assigns() {
        let vid = Uuid::new_v4();
        assert_eq!(Transition::Accept { volunteer_id: vid }.assigns(), Some(vid));
        assert_eq!(Transition::Complete.assigns(), None);
        assert_eq!(Transition::Cancel.assigns(), None);
    }
}
