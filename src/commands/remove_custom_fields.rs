use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{Map, Value, json};

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, id_of};

#[derive(clap::Args, Debug, Clone)]
pub struct RemoveCustomFieldsArgs {
    /// Custom field to remove (repeatable)
    #[arg(long = "field", short = 'f', value_name = "NAME", required = true)]
    pub fields: Vec<String>,
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
    }
}

/// Custom fields left after dropping every set field named in `fields`, or
/// `None` when nothing would change.
fn strip_fields(custom: &Map<String, Value>, fields: &[String]) -> Option<Map<String, Value>> {
    let mut remaining = custom.clone();
    let mut removed = 0;
    for field in fields {
        if remaining.get(field).is_some_and(is_set) {
            remaining.remove(field);
            removed += 1;
        }
    }
    (removed > 0).then_some(remaining)
}

#[tracing::instrument(skip(api, options))]
pub async fn remove_custom_fields<A: Api + ?Sized>(
    api: &A,
    args: &RemoveCustomFieldsArgs,
    options: &Options,
) -> Result<Summary> {
    let mut pages = OffsetPages::new(api, "lead", query(&[("_fields", "id,custom")]));
    let mut summary = Summary::default();

    while let Some(leads) = pages.next_page().await.context("Failed to list leads")? {
        for lead in &leads {
            summary.processed += 1;
            let Some(custom) = lead["custom"].as_object() else {
                continue;
            };
            let Some(remaining) = strip_fields(custom, &args.fields) else {
                continue;
            };

            let id = id_of(lead);
            debug!("lead {} before: {}", id, lead["custom"]);
            let payload = json!({"custom": remaining});
            match api.put(&format!("lead/{}", id), &payload).await {
                Ok(_) => {
                    info!("lead {} after: {}", id, payload["custom"]);
                    summary.updated += 1;
                }
                Err(err) => options.on_error(&mut summary, format!("lead {}", id), err)?,
            }
        }
    }

    Ok(summary)
}
