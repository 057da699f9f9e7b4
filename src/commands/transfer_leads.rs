use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

use crate::api::{Api, query};
use crate::http::ApiError;
use crate::pagination::collect_all;

use super::{Options, Summary, id_of};

#[derive(clap::Args, Debug, Clone)]
pub struct TransferLeadsArgs {
    /// Search query selecting the leads to copy
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// API key of the organization receiving the leads
    #[arg(
        long = "target-api-key",
        env = "CLOSE_TARGET_API_KEY",
        hide_env_values = true,
        value_name = "KEY"
    )]
    pub target_api_key: String,

    /// Delete each source lead once it is copied
    #[arg(long)]
    pub delete: bool,
}

const CONTACT_FIELDS: [&str; 4] = ["name", "title", "date_created", "date_updated"];
const OPPORTUNITY_FIELDS: [&str; 9] = [
    "value",
    "date_won",
    "date_lost",
    "note",
    "value_period",
    "confidence",
    "date_created",
    "date_updated",
    "status_label",
];
const TASK_FIELDS: [&str; 4] = ["text", "due_date", "is_complete", "assigned_to"];
const NOTE_FIELDS: [&str; 3] = ["note", "date_created", "date_updated"];
const EMAIL_FIELDS: [&str; 13] = [
    "direction",
    "attachments",
    "subject",
    "body_text",
    "body_html",
    "sender",
    "to",
    "cc",
    "bcc",
    "envelope",
    "date_created",
    "date_updated",
    "status",
];
const CALL_FIELDS: [&str; 16] = [
    "created_by_name",
    "direction",
    "duration",
    "updated_by_name",
    "voicemail_duration",
    "note",
    "source",
    "status",
    "remote_phone",
    "phone",
    "local_phone",
    "transferred_from",
    "transferred_to",
    "recording_url",
    "date_created",
    "date_updated",
];

/// Copies the listed keys that are present in `source`.
fn pick(source: &Value, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| source.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect()
}

/// `{key: type}` entries of a contact detail list, e.g. phones.
fn details(contact: &Value, list: &str, key: &str) -> Value {
    contact[list]
        .as_array()
        .into_iter()
        .flatten()
        .map(|item| json!({key: item[key], "type": item["type"]}))
        .collect()
}

/// Sorts by creation date unless the query already does.
pub fn sorted_query(query: &str) -> String {
    if query.contains("sort:created") {
        query.to_string()
    } else {
        format!("{} sort:created", query)
    }
}

/// New-lead payload for the target organization, contacts included.
pub fn lead_payload(lead: &Value, status_label: &str) -> Value {
    let text = |key: &str| lead[key].as_str().unwrap_or("").to_string();
    let mut payload = pick(lead, &["addresses", "custom", "date_created", "date_updated"]);
    payload.insert("name".into(), Value::from(text("name")));
    payload.insert("url".into(), Value::from(text("url")));
    payload.insert("description".into(), Value::from(text("description")));
    payload.insert("status".into(), Value::from(status_label));

    let contacts: Vec<Value> = lead["contacts"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|contact| {
            let mut new_contact = pick(contact, &CONTACT_FIELDS);
            new_contact.insert("phones".into(), details(contact, "phones", "phone"));
            new_contact.insert("emails".into(), details(contact, "emails", "email"));
            new_contact.insert("urls".into(), details(contact, "urls", "url"));
            Value::Object(new_contact)
        })
        .collect();
    payload.insert("contacts".into(), Value::Array(contacts));

    Value::Object(payload)
}

/// Opportunity payload attached to `lead_id`, linked to the copied contact of
/// the same name when there is one.
pub fn opportunity_payload(opportunity: &Value, new_lead: &Value, lead_id: &str) -> Value {
    let mut payload = pick(opportunity, &OPPORTUNITY_FIELDS);
    if let Some(label) = payload.remove("status_label") {
        payload.insert("status".into(), label);
    }
    let contact_id = new_lead["contacts"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|contact| contact["name"] == opportunity["contact_name"])
        .map(|contact| contact["id"].clone())
        .unwrap_or(Value::Null);
    payload.insert("contact_id".into(), contact_id);
    payload.insert("lead_id".into(), Value::from(lead_id));
    Value::Object(payload)
}

/// Endpoint and payload that recreate an activity on `lead_id`. Only notes,
/// emails and calls can be copied.
pub fn activity_payload(activity: &Value, lead_id: &str) -> Option<(&'static str, Value)> {
    let (endpoint, mut payload) = match activity["_type"].as_str()? {
        "Note" => ("activity/note", pick(activity, &NOTE_FIELDS)),
        "Email" => {
            let mut payload = pick(activity, &EMAIL_FIELDS);
            payload.insert("status".into(), Value::from("sent"));
            ("activity/email", payload)
        }
        "Call" => ("activity/call", pick(activity, &CALL_FIELDS)),
        _ => return None,
    };
    payload.insert("lead_id".into(), Value::from(lead_id));
    Some((endpoint, Value::Object(payload)))
}

/// Copies matching leads, with their contacts, opportunities, tasks and
/// activities, from `source` into the `target` organization.
#[tracing::instrument(skip(source, target, args, options), fields(query = %args.query))]
pub async fn transfer_leads<S, T>(
    source: &S,
    target: &T,
    args: &TransferLeadsArgs,
    options: &Options,
) -> Result<Summary>
where
    S: Api + ?Sized,
    T: Api + ?Sized,
{
    let lead_query = sorted_query(&args.query);
    let leads = collect_all(source, "lead", query(&[("query", lead_query.as_str())]))
        .await
        .context("Failed to list leads")?;
    info!("{} lead(s) to transfer", leads.len());

    let status_ids: BTreeSet<&str> = leads
        .iter()
        .filter_map(|lead| lead["status_id"].as_str())
        .collect();
    let mut statuses = BTreeMap::new();
    for status_id in status_ids {
        let status = source
            .get(&format!("status/lead/{}", status_id), &Vec::new())
            .await
            .with_context(|| format!("Failed to fetch lead status {}", status_id))?;
        let label = status["label"].as_str().unwrap_or("").to_string();
        statuses.insert(status_id.to_string(), label);
    }

    copy_custom_fields(source, target).await?;

    let mut summary = Summary::default();
    for lead in &leads {
        summary.processed += 1;
        let label = lead["status_id"]
            .as_str()
            .and_then(|id| statuses.get(id))
            .map(String::as_str)
            .unwrap_or("");

        if let Err(err) = copy_lead(source, target, lead, label).await {
            options.on_error(&mut summary, format!("lead {}", id_of(lead)), err)?;
            continue;
        }
        summary.created += 1;

        if args.delete {
            match source.delete(&format!("lead/{}", id_of(lead))).await {
                Ok(_) => {
                    info!("deleted source lead {}", id_of(lead));
                    summary.deleted += 1;
                }
                Err(err) => {
                    options.on_error(&mut summary, format!("deleting lead {}", id_of(lead)), err)?
                }
            }
        }
    }

    Ok(summary)
}

async fn custom_field_names<A: Api + ?Sized>(api: &A) -> Result<Vec<String>> {
    let resp = api
        .get("custom_fields/lead", &query(&[("_fields", "id,name")]))
        .await
        .context("Failed to list lead custom fields")?;
    Ok(resp["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|field| field["name"].as_str().map(str::to_string))
        .collect())
}

/// Creates the source's lead custom fields that the target lacks, as text fields.
async fn copy_custom_fields<S, T>(source: &S, target: &T) -> Result<()>
where
    S: Api + ?Sized,
    T: Api + ?Sized,
{
    let existing = custom_field_names(target).await?;
    for field in custom_field_names(source).await? {
        if existing.contains(&field) {
            continue;
        }
        target
            .post("custom_fields/lead", &json!({"name": field, "type": "text"}))
            .await
            .with_context(|| format!("Failed to create custom field {:?}", field))?;
        info!("added new custom field \"{}\"", field);
    }
    Ok(())
}

async fn copy_lead<S, T>(
    source: &S,
    target: &T,
    lead: &Value,
    status_label: &str,
) -> Result<(), ApiError>
where
    S: Api + ?Sized,
    T: Api + ?Sized,
{
    let new_lead = target.post("lead", &lead_payload(lead, status_label)).await?;
    let lead_id = id_of(&new_lead);
    info!("target: added {} {}", lead_id, lead["name"].as_str().unwrap_or(""));

    for opportunity in lead["opportunities"].as_array().into_iter().flatten() {
        let created = target
            .post("opportunity", &opportunity_payload(opportunity, &new_lead, lead_id))
            .await?;
        info!("target: {} added opportunity {}", lead_id, id_of(&created));
    }

    for task in lead["tasks"].as_array().into_iter().flatten() {
        let mut payload = pick(task, &TASK_FIELDS);
        payload.insert("lead_id".into(), Value::from(lead_id));
        target.post("task", &Value::Object(payload)).await?;
        info!("target: {} added task: {}", lead_id, task["text"].as_str().unwrap_or(""));
    }

    let activities = collect_all(source, "activity", query(&[("lead_id", id_of(lead))])).await?;
    for activity in &activities {
        match activity_payload(activity, lead_id) {
            Some((endpoint, payload)) => {
                target.post(endpoint, &payload).await?;
                info!("target: {} added {}", lead_id, endpoint);
            }
            None => debug!("not copying {} activity {}", activity["_type"], id_of(activity)),
        }
    }

    Ok(())
}
