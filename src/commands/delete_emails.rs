use anyhow::{Result, bail};
use log::{debug, info};
use serde_json::{Value, json};
use std::path::PathBuf;

use crate::api::{Api, query};
use crate::csv_utils::CsvTable;

use super::{Options, Summary};

#[derive(clap::Args, Debug, Clone)]
pub struct DeleteEmailsArgs {
    /// CSV file with `contact_id` and `email_address` columns
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Removes one email address per CSV row from the given contact.
#[tracing::instrument(skip(api, options))]
pub async fn delete_emails<A: Api + ?Sized>(
    api: &A,
    args: &DeleteEmailsArgs,
    options: &Options,
) -> Result<Summary> {
    let table = CsvTable::read(&args.file)?;
    let (Some(contact_col), Some(email_col)) =
        (table.column("contact_id"), table.column("email_address"))
    else {
        bail!("contact_id or email_address headers could not be found in {:?}", args.file);
    };

    let mut summary = Summary::default();
    for row in &table.rows {
        let contact_id = CsvTable::cell(row, contact_col);
        let email_address = CsvTable::cell(row, email_col);
        if contact_id.is_empty() {
            continue;
        }
        summary.processed += 1;
        debug!("Attempting to remove {} from {}", email_address, contact_id);

        let endpoint = format!("contact/{}", contact_id);
        let contact = match api.get(&endpoint, &query(&[("_fields", "id,emails")])).await {
            Ok(contact) => contact,
            Err(err) => {
                options.on_error(&mut summary, format!("contact {}", contact_id), err)?;
                continue;
            }
        };

        let emails = contact["emails"].as_array().cloned().unwrap_or_default();
        if emails.is_empty() {
            debug!("Skipping {} because it has no email addresses", contact_id);
            summary.skipped += 1;
            continue;
        }

        let remaining: Vec<Value> = emails
            .into_iter()
            .filter(|email| email["email"].as_str() != Some(email_address))
            .collect();
        match api.put(&endpoint, &json!({"emails": remaining})).await {
            Ok(_) => {
                info!("Removed {} from {}", email_address, contact_id);
                summary.updated += 1;
            }
            Err(err) => options.on_error(&mut summary, format!("contact {}", contact_id), err)?,
        }
    }

    Ok(summary)
}
