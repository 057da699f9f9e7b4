use anyhow::{Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary};

#[derive(clap::Args, Debug, Clone)]
pub struct BackupLeadsArgs {
    /// JSON file to write
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,

    /// Only back up leads matching this search query
    #[arg(long, short = 'q', default_value = "*")]
    pub query: String,
}

/// Dumps every matching lead into a JSON array.
#[tracing::instrument(skip(api, args, _options))]
pub async fn backup_leads<A: Api + ?Sized>(
    api: &A,
    args: &BackupLeadsArgs,
    _options: &Options,
) -> Result<Summary> {
    let mut pages = OffsetPages::new(api, "lead", query(&[("query", args.query.as_str())]));
    let mut leads = Vec::new();
    while let Some(page) = pages.next_page().await.context("Failed to fetch leads")? {
        debug!("Fetched {} lead(s) at offset {}", page.len(), pages.offset());
        leads.extend(page);
    }

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &leads).context("Failed to write leads")?;
    writer.flush()?;

    info!("Wrote {} lead(s) to {:?}", leads.len(), args.output);
    Ok(Summary {
        exported: leads.len(),
        ..Summary::default()
    })
}
