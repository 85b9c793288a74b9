use serde::Serialize;

use lifeline_types::models::Role;

use crate::error::FlowError;
use crate::identity::Principal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub label: &'static str,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminDashboard {
    pub full_name: String,
    pub tiles: Vec<Tile>,
    pub activity_title: &'static str,
    pub activity_message: &'static str,
}

/// Dashboard shell. The tiles are placeholders; nothing is aggregated.
pub fn dashboard(principal: &Principal) -> Result<AdminDashboard, FlowError> {
    principal.require(Role::Admin)?;

    let tiles = ["Pending", "In Progress", "Rescued", "Volunteers"]
        .into_iter()
        .map(|label| Tile { label, value: 0 })
        .collect();

    Ok(AdminDashboard {
        full_name: principal.profile.full_name.clone(),
        tiles,
        activity_title: "Live Activity",
        activity_message: "Real-time updates will appear here as requests come in",
    })
}
