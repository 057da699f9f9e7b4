//! Bulk operations against the Close API.
//!
//! Every command takes an [`Api`] (normally a [`DryRun`](crate::api::DryRun)
//! around the real client) plus its own arguments, and returns a [`Summary`].

use anyhow::{Context, Result, anyhow};
use log::error;
use serde_json::Value;
use std::fmt;

use crate::api::{Api, query};
use crate::http::ApiError;

mod backup;
mod contacts_export;
mod delete_emails;
mod delete_secondary_addresses;
mod import_leads;
mod inactive_user_tasks;
mod merge;
mod opportunities_export;
mod reassign;
mod remove_custom_fields;
mod request_events;
mod transfer_leads;
mod update_countries;
mod update_opportunities;
mod upsert_leads;

pub use backup::{BackupLeadsArgs, backup_leads};
pub use contacts_export::{CONTACT_HEADERS, ExportContactsArgs, export_contacts};
pub use delete_emails::{DeleteEmailsArgs, delete_emails};
pub use delete_secondary_addresses::{
    DeleteSecondaryAddressesArgs, MULTIPLE_ADDRESSES_QUERY, delete_secondary_addresses,
};
pub use import_leads::{ImportLeadsArgs, import_leads, leads_from_table};
pub use inactive_user_tasks::{DeleteInactiveUserTasksArgs, delete_inactive_user_tasks};
pub use merge::{MergeDuplicatesArgs, choose_destination, merge_duplicates};
pub use opportunities_export::{
    ExportOpportunitiesArgs, OPPORTUNITY_HEADERS, export_opportunities,
};
pub use reassign::{ReassignArgs, reassign};
pub use remove_custom_fields::{RemoveCustomFieldsArgs, remove_custom_fields};
pub use request_events::{EventsByRequestIdArgs, events_by_request_id};
pub use transfer_leads::{TransferLeadsArgs, transfer_leads};
pub use update_countries::{UpdateAddressCountriesArgs, update_address_countries};
pub use update_opportunities::{UpdateOpportunitiesArgs, update_opportunities};
pub use upsert_leads::{UpsertLeadsArgs, upsert_leads};

/// Settings shared by all commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Writes are really sent (mirrors the [`DryRun`](crate::api::DryRun) flag).
    pub confirmed: bool,
    /// Log and count per-item API errors instead of aborting.
    pub continue_on_error: bool,
}

impl Options {
    /// Either records a per-item failure or turns it into the command's error.
    pub fn on_error(&self, summary: &mut Summary, what: String, err: ApiError) -> Result<()> {
        if self.continue_on_error {
            error!("{}: {}", what, err);
            summary.failed += 1;
            Ok(())
        } else {
            Err(anyhow::Error::new(err).context(what))
        }
    }
}

/// Counters reported at the end of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub processed: usize,
    pub exported: usize,
    pub created: usize,
    pub updated: usize,
    pub merged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = [
            ("processed", self.processed),
            ("exported", self.exported),
            ("created", self.created),
            ("updated", self.updated),
            ("merged", self.merged),
            ("deleted", self.deleted),
            ("skipped", self.skipped),
            ("failed", self.failed),
        ];
        let parts: Vec<String> = counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, count)| format!("{}: {}", name, count))
            .collect();
        if parts.is_empty() {
            write!(f, "nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Id of the organization the API key belongs to.
pub(crate) async fn organization_id<A: Api + ?Sized>(api: &A) -> Result<String> {
    let me = api
        .get("me", &query(&[("_fields", "id,memberships")]))
        .await
        .context("Failed to fetch the current user")?;
    me["memberships"][0]["organization_id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Current user has no organization membership"))
}

/// `id` of an API object, or `""`.
pub(crate) fn id_of(value: &Value) -> &str {
    value["id"].as_str().unwrap_or("")
}

/// Renders a JSON value as a CSV cell; `null` and missing values are empty.
pub(crate) fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
