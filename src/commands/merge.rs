use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{Value, json};

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, id_of};

#[derive(clap::Args, Debug, Clone)]
pub struct MergeDuplicatesArgs {
    /// Status label preferred for the surviving lead (case-insensitive)
    #[arg(long, default_value = "open")]
    pub desired_status: String,
}

/// Picks which of two duplicate leads survives a merge.
///
/// Returns `(destination, source)`. The earlier lead wins unless only the later
/// one has opportunities, or only the later one is in `desired_status`.
pub fn choose_destination<'a>(
    last: &'a Value,
    lead: &'a Value,
    desired_status: &str,
) -> (&'a Value, &'a Value) {
    let has_opportunities =
        |lead: &Value| lead["opportunities"].as_array().is_some_and(|o| !o.is_empty());
    let in_desired_status = |lead: &Value| {
        lead["status_label"]
            .as_str()
            .is_some_and(|label| label.eq_ignore_ascii_case(desired_status))
    };

    let prefer_lead = if has_opportunities(lead) && !has_opportunities(last) {
        true
    } else {
        in_desired_status(lead) && !in_desired_status(last)
    };

    if prefer_lead { (lead, last) } else { (last, lead) }
}

fn normalized_name(lead: &Value) -> String {
    lead["name"].as_str().unwrap_or("").trim().to_lowercase()
}

/// Merges leads whose names match, walking them in display-name order.
#[tracing::instrument(skip(api, args, options))]
pub async fn merge_duplicates<A: Api + ?Sized>(
    api: &A,
    args: &MergeDuplicatesArgs,
    options: &Options,
) -> Result<Summary> {
    let filters = query(&[
        ("query", "sort:display_name"),
        ("_fields", "id,display_name,name,status_label,opportunities,custom"),
    ]);
    let mut pages = OffsetPages::new(api, "lead", filters).changing();
    let mut summary = Summary::default();
    let mut last: Option<Value> = None;

    while let Some(leads) = pages.next_page().await.context("Failed to list leads")? {
        let mut merged = 0;
        for lead in leads {
            summary.processed += 1;

            let duplicate_of = last.take().filter(|last| {
                let name = normalized_name(&lead);
                !name.is_empty() && normalized_name(last) == name
            });
            let Some(previous) = duplicate_of else {
                last = Some(lead);
                continue;
            };

            let (destination, source) =
                choose_destination(&previous, &lead, &args.desired_status);
            debug!("Duplicate: {} / {}", previous, lead);
            info!(
                "Merging {} into {} ({})",
                id_of(source),
                id_of(destination),
                lead["name"].as_str().unwrap_or("")
            );

            let payload = json!({"source": id_of(source), "destination": id_of(destination)});
            match api.post("lead/merge", &payload).await {
                Ok(_) => {
                    summary.merged += 1;
                    merged += 1;
                }
                Err(err) => options.on_error(
                    &mut summary,
                    format!("merging {} into {}", id_of(source), id_of(destination)),
                    err,
                )?,
            }
            last = Some(destination.clone());
        }
        if options.confirmed {
            pages.removed(merged);
        }
    }

    Ok(summary)
}
