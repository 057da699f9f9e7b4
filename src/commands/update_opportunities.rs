use anyhow::{Context, Result, anyhow};
use log::info;
use serde_json::{Value, json};

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, id_of, organization_id};

const PAGE_SIZE: usize = 50;

#[derive(clap::Args, Debug, Clone)]
pub struct UpdateOpportunitiesArgs {
    /// Lead search query
    #[arg(long, short = 'q')]
    pub query: String,

    /// Label of the new opportunity status
    #[arg(long, short = 's')]
    pub status: String,
}

/// Id of the opportunity status labelled `label` (case-insensitive).
fn find_status_id(statuses: &Value, label: &str) -> Option<String> {
    statuses
        .as_array()?
        .iter()
        .find(|status| {
            status["label"]
                .as_str()
                .is_some_and(|l| l.to_lowercase() == label.to_lowercase())
        })
        .map(|status| id_of(status).to_string())
}

/// Moves every opportunity of the matching leads to the given status.
#[tracing::instrument(skip(api, options))]
pub async fn update_opportunities<A: Api + ?Sized>(
    api: &A,
    args: &UpdateOpportunitiesArgs,
    options: &Options,
) -> Result<Summary> {
    let org_id = organization_id(api).await?;
    let org = api
        .get(
            &format!("organization/{}", org_id),
            &query(&[("_fields", "opportunity_statuses")]),
        )
        .await
        .with_context(|| format!("Failed to fetch organization {}", org_id))?;
    let status_id = find_status_id(&org["opportunity_statuses"], &args.status)
        .ok_or_else(|| anyhow!("Status not found: {}", args.status))?;

    info!("Gathering opportunities for {}", args.query);
    let filters = query(&[("query", args.query.as_str()), ("_fields", "id,opportunities")]);
    let mut pages = OffsetPages::new(api, "lead", filters).limit(PAGE_SIZE);
    let mut opportunity_ids = Vec::new();
    while let Some(leads) = pages.next_page().await.context("Failed to search leads")? {
        for lead in &leads {
            opportunity_ids.extend(
                lead["opportunities"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(|opportunity| id_of(opportunity).to_string()),
            );
        }
    }
    info!(
        "Updating {} opportunities to {}",
        opportunity_ids.len(),
        args.status
    );

    let payload = json!({"status_id": status_id});
    let mut summary = Summary::default();
    for id in &opportunity_ids {
        summary.processed += 1;
        match api.put(&format!("opportunity/{}", id), &payload).await {
            Ok(_) => summary.updated += 1,
            Err(err) => options.on_error(&mut summary, format!("opportunity {}", id), err)?,
        }
    }

    Ok(summary)
}
