use anyhow::{Context, Result};
use log::info;
use serde_json::{Value, json};

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, id_of};

#[derive(clap::Args, Debug, Clone)]
pub struct UpdateAddressCountriesArgs {
    /// Country code to replace
    #[arg(value_name = "OLD")]
    pub old_code: String,

    /// Replacement country code
    #[arg(value_name = "NEW")]
    pub new_code: String,
}

/// Rewrites `old` to `new` in every address country; returns whether anything changed.
fn replace_country(addresses: &mut [Value], old: &str, new: &str) -> bool {
    let mut changed = false;
    for address in addresses {
        if address["country"].as_str() == Some(old) {
            address["country"] = Value::from(new);
            changed = true;
        }
    }
    changed
}

#[tracing::instrument(skip(api, options))]
pub async fn update_address_countries<A: Api + ?Sized>(
    api: &A,
    args: &UpdateAddressCountriesArgs,
    options: &Options,
) -> Result<Summary> {
    let filters = query(&[("query", "* sort:created"), ("_fields", "id,addresses")]);
    let mut pages = OffsetPages::new(api, "lead", filters).changing();
    let mut summary = Summary::default();

    while let Some(leads) = pages.next_page().await.context("Failed to list leads")? {
        for lead in &leads {
            summary.processed += 1;
            let mut addresses = lead["addresses"].as_array().cloned().unwrap_or_default();
            if !replace_country(&mut addresses, &args.old_code, &args.new_code) {
                continue;
            }

            let id = id_of(lead);
            let payload = json!({"addresses": addresses});
            match api.put(&format!("lead/{}", id), &payload).await {
                Ok(_) => {
                    info!("updated lead {}: {}", id, payload["addresses"]);
                    summary.updated += 1;
                }
                Err(err) => options.on_error(&mut summary, format!("lead {}", id), err)?,
            }
        }
    }

    Ok(summary)
}
