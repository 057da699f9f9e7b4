use anyhow::{Context, Result, bail};
use log::{debug, info};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::api::{Api, query};
use crate::csv_utils::CsvTable;
use crate::http::ApiError;

use super::{Options, Summary, id_of};

static CONTACT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^contact(\d)_name$").expect("valid pattern"));
static NOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^note\d$").expect("valid pattern"));

#[derive(clap::Args, Debug, Clone)]
pub struct UpsertLeadsArgs {
    /// CSV file with a `company` or `lead_id` column
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Create `custom.*` columns missing from the organization as text fields
    #[arg(long, short = 'C')]
    pub create_custom_fields: bool,

    /// Only update existing leads, never create new ones
    #[arg(long, short = 'e')]
    pub disable_create: bool,
}

/// `(kind, type)` pairs for the numbered contact detail columns, e.g. `contact1_phone2`.
const CONTACT_DETAILS: [(&str, &str); 3] = [("phone", "office"), ("email", "office"), ("url", "url")];

/// Cell under the `name` header, or `""` when there is no such column.
fn column_value<'r>(table: &CsvTable, row: &'r [String], name: &str) -> &'r str {
    table
        .column(name)
        .map(|index| CsvTable::cell(row, index))
        .unwrap_or("")
}

/// Non-empty cells of `row` whose header matches `contact{n}_{kind}<digit>`.
fn contact_details(
    table: &CsvTable,
    row: &[String],
    n: &str,
    kind: &str,
    kind_type: &str,
) -> Vec<Value> {
    let prefix = format!("contact{}_{}", n, kind);
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            header
                .strip_prefix(&prefix)
                .is_some_and(|rest| rest.len() == 1 && rest.chars().all(|c| c.is_ascii_digit()))
        })
        .map(|(index, _)| CsvTable::cell(row, index))
        .filter(|value| !value.is_empty())
        .map(|value| json!({kind: value, "type": kind_type}))
        .collect()
}

/// Lead fields for one CSV row. Only non-empty cells are sent, and only
/// `custom.*` columns naming a known custom field.
pub fn lead_payload(table: &CsvTable, row: &[String], custom_fields: &[String]) -> Value {
    let mut payload = Map::new();
    for (column, field) in [("company", "name"), ("url", "url"), ("description", "description")] {
        let value = column_value(table, row, column);
        if !value.is_empty() {
            payload.insert(field.to_string(), Value::from(value));
        }
    }

    let mut contacts = Vec::new();
    for (index, header) in table.headers.iter().enumerate() {
        let Some(captures) = CONTACT_NAME.captures(header) else {
            continue;
        };
        let name = CsvTable::cell(row, index);
        if name.is_empty() {
            continue;
        }
        let n = &captures[1];
        let mut contact = Map::new();
        contact.insert("name".into(), Value::from(name));
        let title = column_value(table, row, &format!("contact{}_title", n));
        if !title.is_empty() {
            contact.insert("title".into(), Value::from(title));
        }
        for (kind, kind_type) in CONTACT_DETAILS {
            let details = contact_details(table, row, n, kind, kind_type);
            if !details.is_empty() {
                contact.insert(format!("{}s", kind), Value::Array(details));
            }
        }
        contacts.push(Value::Object(contact));
    }
    if !contacts.is_empty() {
        payload.insert("contacts".into(), Value::Array(contacts));
    }

    let custom: Map<String, Value> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(index, header)| {
            let field = header.strip_prefix("custom.")?;
            let value = CsvTable::cell(row, index);
            (custom_fields.iter().any(|f| f == field) && !value.is_empty())
                .then(|| (field.to_string(), Value::from(value)))
        })
        .collect();
    if !custom.is_empty() {
        payload.insert("custom".into(), Value::Object(custom));
    }

    Value::Object(payload)
}

/// Non-empty `noteN` cells of a row.
fn notes<'r>(table: &CsvTable, row: &'r [String]) -> Vec<&'r str> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| NOTE.is_match(header))
        .map(|(index, _)| CsvTable::cell(row, index))
        .filter(|note| !note.is_empty())
        .collect()
}

enum Outcome {
    Updated(String),
    Created(String),
    Skipped,
}

/// Updates leads found by `lead_id` or company name, creating the missing ones.
#[tracing::instrument(skip(api, options))]
pub async fn upsert_leads<A: Api + ?Sized>(
    api: &A,
    args: &UpsertLeadsArgs,
    options: &Options,
) -> Result<Summary> {
    let table = CsvTable::read(&args.file)?;
    let lead_id_col = table.column("lead_id");
    let company_col = table.column("company");
    if lead_id_col.is_none() && company_col.is_none() {
        bail!("Column \"company\" or \"lead_id\" is not found in {:?}", args.file);
    }

    let resp = api
        .get("custom_fields/lead", &query(&[("_fields", "id,name")]))
        .await
        .context("Failed to list lead custom fields")?;
    let mut custom_fields: Vec<String> = resp["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|field| field["name"].as_str().map(str::to_string))
        .collect();

    if args.create_custom_fields {
        let missing: Vec<String> = table
            .headers
            .iter()
            .filter_map(|header| header.strip_prefix("custom."))
            .filter(|field| !custom_fields.iter().any(|f| f == field))
            .map(str::to_string)
            .collect();
        for field in missing {
            api.post("custom_fields/lead", &json!({"name": field, "type": "text"}))
                .await
                .with_context(|| format!("Failed to create custom field {:?}", field))?;
            info!("added new custom field \"{}\"", field);
            custom_fields.push(field);
        }
    }
    debug!("available custom fields: {:?}", custom_fields);

    let mut summary = Summary::default();
    for (index, row) in table.rows.iter().enumerate() {
        let line = index + 2;
        summary.processed += 1;
        let payload = lead_payload(&table, row, &custom_fields);
        let lead_id = lead_id_col.map(|col| CsvTable::cell(row, col)).unwrap_or("");
        let company = company_col.map(|col| CsvTable::cell(row, col)).unwrap_or("");

        let id = match upsert_row(api, lead_id, company, &payload, args.disable_create).await {
            Ok(Outcome::Updated(id)) => {
                info!("line {} updated: {} {}", line, id, company);
                summary.updated += 1;
                id
            }
            Ok(Outcome::Created(id)) => {
                info!("line {} new: {} {}", line, id, company);
                summary.created += 1;
                id
            }
            Ok(Outcome::Skipped) => {
                debug!("line {} skipped: no matching lead", line);
                summary.skipped += 1;
                continue;
            }
            Err(err) => {
                options.on_error(
                    &mut summary,
                    format!("line {} skipped, payload: {}", line, payload),
                    err,
                )?;
                continue;
            }
        };

        for note in notes(&table, row) {
            match api
                .post("activity/note", &json!({"note": note, "lead_id": id}))
                .await
            {
                Ok(_) => debug!("{} new note: {}", id, note),
                Err(err) => options.on_error(&mut summary, format!("line {} note", line), err)?,
            }
        }
    }

    Ok(summary)
}

async fn upsert_row<A: Api + ?Sized>(
    api: &A,
    lead_id: &str,
    company: &str,
    payload: &Value,
    disable_create: bool,
) -> Result<Outcome, ApiError> {
    let existing = if !lead_id.is_empty() {
        let lead = api
            .get(&format!("lead/{}", lead_id), &query(&[("_fields", "id,name")]))
            .await?;
        Some(lead)
    } else if !company.is_empty() {
        let filters = query(&[
            ("query", format!("company:\"{}\" sort:created", company).as_str()),
            ("_fields", "id,display_name,name"),
            ("_limit", "1"),
        ]);
        let resp = api.get("lead", &filters).await?;
        debug!("received: {}", resp);
        resp["data"].as_array().and_then(|data| data.first()).cloned()
    } else {
        None
    };

    match existing {
        Some(lead) => {
            let id = id_of(&lead).to_string();
            debug!("to send: {}", payload);
            api.put(&format!("lead/{}", id), payload).await?;
            Ok(Outcome::Updated(id))
        }
        None if disable_create || company.is_empty() => Ok(Outcome::Skipped),
        None => {
            debug!("to send: {}", payload);
            let lead = api.post("lead", payload).await?;
            Ok(Outcome::Created(id_of(&lead).to_string()))
        }
    }
}
