//! Labels and visual treatment for statuses and emergency types. Every
//! match is exhaustive, so a new variant cannot ship without a badge.

use serde::Serialize;

use lifeline_types::models::{EmergencyType, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Warning,
    Primary,
    Success,
    Muted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: &'static str,
    pub tone: Tone,
    /// Animated dot for states that still need attention.
    pub pulsing: bool,
}

pub fn status_badge(status: RequestStatus) -> StatusBadge {
    match status {
        RequestStatus::Pending => StatusBadge { label: "Pending", tone: Tone::Warning, pulsing: true },
        RequestStatus::InProgress => {
            StatusBadge { label: "In Progress", tone: Tone::Primary, pulsing: true }
        }
        RequestStatus::Rescued => StatusBadge { label: "Rescued", tone: Tone::Success, pulsing: false },
        RequestStatus::Cancelled => {
            StatusBadge { label: "Cancelled", tone: Tone::Muted, pulsing: false }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Icon {
    Droplets,
    Flame,
    Building,
    Stethoscope,
    Lock,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Blue,
    Orange,
    Amber,
    Red,
    Purple,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeBadge {
    pub label: &'static str,
    pub icon: Icon,
    pub color: Color,
}

pub fn type_badge(kind: EmergencyType) -> TypeBadge {
    let (label, icon, color) = match kind {
        EmergencyType::Flood => ("Flood", Icon::Droplets, Color::Blue),
        EmergencyType::Fire => ("Fire", Icon::Flame, Color::Orange),
        EmergencyType::Earthquake => ("Earthquake", Icon::Building, Color::Amber),
        EmergencyType::Medical => ("Medical", Icon::Stethoscope, Color::Red),
        EmergencyType::Trapped => ("Trapped", Icon::Lock, Color::Purple),
        EmergencyType::Other => ("Other", Icon::Alert, Color::Gray),
    };
    TypeBadge { label, icon, color }
}

/// Longer labels used by the request form's type picker.
pub fn form_label(kind: EmergencyType) -> &'static str {
    match kind {
        EmergencyType::Flood => "Flood",
        EmergencyType::Fire => "Fire",
        EmergencyType::Earthquake => "Earthquake",
        EmergencyType::Medical => "Medical Emergency",
        EmergencyType::Trapped => "Trapped/Stuck",
        EmergencyType::Other => "Other Emergency",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_open_states_pulse() {
        for status in RequestStatus::ALL {
            assert_eq!(status_badge(status).pulsing, !status.is_terminal(), "{}", status);
        }
        assert_eq!(status_badge(RequestStatus::InProgress).label, "In Progress");
    }

    #[test]
    fn type_badges_are_distinct() {
        let colors: std::collections::HashSet<_> =
            EmergencyType::ALL.into_iter().map(|k| format!("{:?}", type_badge(k).color)).collect();
        assert_eq!(colors.len(), EmergencyType::ALL.len());
        assert_eq!(form_label(EmergencyType::Trapped), "Trapped/Stuck");
        assert_eq!(type_badge(EmergencyType::Earthquake).icon, Icon::Building);
    }
}
