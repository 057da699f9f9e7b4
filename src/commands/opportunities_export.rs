use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use crate::api::Api;
use crate::http::Query;
use crate::pagination::OffsetPages;

use super::{Options, Summary, csv_cell};

pub const OPPORTUNITY_HEADERS: [&str; 11] = [
    "lead_name",
    "status_type",
    "status_label",
    "confidence",
    "user_name",
    "value",
    "value_period",
    "note",
    "date_created",
    "date_updated",
    "date_won",
];

#[derive(clap::Args, Debug, Clone)]
pub struct ExportOpportunitiesArgs {
    /// CSV file to write
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,
}

#[tracing::instrument(skip(api, args, _options))]
pub async fn export_opportunities<A: Api + ?Sized>(
    api: &A,
    args: &ExportOpportunitiesArgs,
    _options: &Options,
) -> Result<Summary> {
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    writer.write_record(OPPORTUNITY_HEADERS)?;

    let mut summary = Summary::default();
    let mut pages = OffsetPages::new(api, "opportunity", Query::new());
    while let Some(page) = pages
        .next_page()
        .await
        .context("Failed to fetch opportunities")?
    {
        for opportunity in &page {
            let row: Vec<String> = OPPORTUNITY_HEADERS
                .iter()
                .map(|header| csv_cell(&opportunity[*header]))
                .collect();
            writer.write_record(&row)?;
            summary.exported += 1;
        }
    }
    writer.flush()?;

    info!("Exported {} opportunities to {:?}", summary.exported, args.output);
    Ok(summary)
}
