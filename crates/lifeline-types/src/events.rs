use std::fmt;

use serde::{Deserialize, Serialize};

/// The record collections the platform exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    HelpRequests,
    Profiles,
    VolunteerProfiles,
    RescueUpdates,
    Notifications,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::HelpRequests => "help_requests",
            Table::Profiles => "profiles",
            Table::VolunteerProfiles => "volunteer_profiles",
            Table::RescueUpdates => "rescue_updates",
            Table::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification from the change feed.
///
/// Consumers treat this as a "something changed" signal and re-fetch; the
/// payload is carried for filtering and logging only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
}

/// Which changes a subscription wants: one table, optionally narrowed by a
/// single `column = value` match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: Table,
    pub column_eq: Option<(String, String)>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self { table, column_eq: None }
    }

    pub fn eq(table: Table, column: &str, value: impl fmt::Display) -> Self {
        Self {
            table,
            column_eq: Some((column.to_string(), value.to_string())),
        }
    }

    /// Filter expression in the hosted feed's syntax, e.g. `victim_id=eq.<uuid>`.
    pub fn expression(&self) -> Option<String> {
        self.column_eq
            .as_ref()
            .map(|(column, value)| format!("{}=eq.{}", column, value))
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        let Some((column, value)) = &self.column_eq else {
            return true;
        };
        // Deletes only carry the old row.
        [Some(&event.record), event.old_record.as_ref()]
            .into_iter()
            .flatten()
            .any(|row| column_matches(row, column, value))
    }
}

fn column_matches(row: &serde_json::Value, column: &str, expected: &str) -> bool {
    match row.get(column) {
        Some(serde_json::Value::String(s)) => s == expected,
        Some(serde_json::Value::Null) | None => false,
        Some(other) => other.to_string() == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(table: Table, kind: ChangeKind, record: serde_json::Value) -> ChangeEvent {
        ChangeEvent { table, kind, record, old_record: None }
    }

    #[test]
    fn unfiltered_matches_whole_table() {
        let filter = ChangeFilter::table(Table::HelpRequests);
        assert!(filter.matches(&event(Table::HelpRequests, ChangeKind::Update, json!({}))));
        assert!(!filter.matches(&event(Table::Profiles, ChangeKind::Update, json!({}))));
        assert_eq!(filter.expression(), None);
    }

    #[test]
    fn column_filter_checks_record_and_old_record() {
        let filter = ChangeFilter::eq(Table::HelpRequests, "victim_id", "abc");
        assert_eq!(filter.expression().as_deref(), Some("victim_id=eq.abc"));

        assert!(filter.matches(&event(Table::HelpRequests, ChangeKind::Insert, json!({"victim_id": "abc"}))));
        assert!(!filter.matches(&event(Table::HelpRequests, ChangeKind::Insert, json!({"victim_id": "xyz"}))));

        let delete = ChangeEvent {
            table: Table::HelpRequests,
            kind: ChangeKind::Delete,
            record: serde_json::Value::Null,
            old_record: Some(json!({"victim_id": "abc"})),
        };
        assert!(filter.matches(&delete));
    }

    #[test]
    fn non_string_columns_compare_by_rendering() {
        let filter = ChangeFilter::eq(Table::Notifications, "is_read", false);
        assert!(filter.matches(&event(Table::Notifications, ChangeKind::Update, json!({"is_read": false}))));
    }
}
