use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::api::{Api, query};
use crate::pagination::CursorPages;

use super::{Options, Summary};

#[derive(clap::Args, Debug, Clone)]
pub struct EventsByRequestIdArgs {
    /// `request_id` to look for in the event log
    #[arg(long)]
    pub request_id: String,

    /// Only events updated after this date
    #[arg(long)]
    pub date_gt: String,

    /// Only events updated before this date
    #[arg(long)]
    pub date_lt: String,

    /// JSON file to write
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,
}

/// Scans the event log in a date window and saves the events of one request.
#[tracing::instrument(skip(api, _options))]
pub async fn events_by_request_id<A: Api + ?Sized>(
    api: &A,
    args: &EventsByRequestIdArgs,
    _options: &Options,
) -> Result<Summary> {
    let filters = query(&[
        ("date_updated__gt", args.date_gt.as_str()),
        ("date_updated__lt", args.date_lt.as_str()),
    ]);
    let mut pages = CursorPages::new(api, "event", filters);
    let mut summary = Summary::default();
    let mut events = Vec::new();

    while let Some(page) = pages.next_page().await.context("Failed to read the event log")? {
        debug!("Scanned {} event(s)", page.len());
        summary.processed += page.len();
        events.extend(
            page.into_iter()
                .filter(|event| event["request_id"].as_str() == Some(args.request_id.as_str())),
        );
    }

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &events).context("Failed to write events")?;
    writer.flush()?;

    summary.exported = events.len();
    info!("Wrote {} event(s) to {:?}", events.len(), args.output);
    Ok(summary)
}
