//! Row types that have no counterpart in lifeline-types. Everything else is
//! mapped straight into the shared models in `queries`.

use lifeline_types::models::{HelpRequest, RequestStatus, Role};

/// Credential row. Never leaves the platform.
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

/// Everything needed to provision an account in one transaction.
pub struct NewAccountRow<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub role: Role,
    pub phone: Option<&'a str>,
}

/// Outcome of a conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    Applied(HelpRequest),
    /// The row exists but its status was not one the transition starts from.
    Rejected { current: RequestStatus },
    NotFound,
}
