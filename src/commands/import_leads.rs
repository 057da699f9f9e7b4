use anyhow::{Context, Result, bail};
use log::{error, info};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::api::Api;
use crate::csv_utils::{CsvTable, count_lines, title_case, uncamel};

use super::{Options, Summary};

// Template columns.
const COMPANY: usize = 0;
const URL: usize = 1;
const STATUS: usize = 2;
const EMAIL: usize = 3;
const PHONE: usize = 4;
const CONTACT_NAME: usize = 5;
const CONTACT_TITLE: usize = 6;
const CITY: usize = 8;
const STATE: usize = 9;
const ZIP: usize = 10;
const COUNTRY: usize = 11;
const FIRST_CUSTOM_FIELD: usize = 12;

#[derive(clap::Args, Debug, Clone)]
pub struct ImportLeadsArgs {
    /// CSV file in the import template layout
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Imports leads from a template CSV.
///
/// Columns: company, url, status, email, phone, contact name, contact title,
/// address, city, state, zip, country, then one column per custom field (the
/// header, without spaces, is the field name). Rows sharing a company name
/// become one lead with several contacts.
#[tracing::instrument(skip(api, args, options))]
pub async fn import_leads<A: Api + ?Sized>(
    api: &A,
    args: &ImportLeadsArgs,
    options: &Options,
) -> Result<Summary> {
    let line_count = count_lines(&args.file)?;
    info!("Importing {} line(s) from {:?}", line_count, args.file);

    let table = CsvTable::read(&args.file)?;
    if table.headers.is_empty() {
        bail!("{:?} is empty", args.file);
    }
    let leads = leads_from_table(&table);

    let mut summary = Summary::default();
    for (key, lead) in &leads {
        summary.processed += 1;
        match api.post("lead", lead).await {
            Ok(_) => {
                info!("Imported {}", key);
                summary.created += 1;
            }
            Err(err) => {
                if options.continue_on_error {
                    error!("An error occurred while saving {:?}: {}", key, err);
                    summary.failed += 1;
                } else {
                    return Err(err).with_context(|| format!("Failed to save {:?}", key));
                }
            }
        }
    }

    info!(
        "Successful responses: {} of {}",
        summary.created,
        leads.len()
    );
    Ok(summary)
}

/// Groups CSV rows into lead payloads, in first-seen order.
///
/// Rows without a company name each become their own lead.
pub fn leads_from_table(table: &CsvTable) -> Vec<(String, Value)> {
    let custom_fields: Vec<(usize, String)> = table
        .headers
        .iter()
        .enumerate()
        .skip(FIRST_CUSTOM_FIELD)
        .map(|(index, header)| (index, header.replace(' ', "")))
        .collect();

    let mut leads: Vec<(String, Value)> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for (row_number, row) in table.rows.iter().enumerate() {
        if row.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let lead = lead_from_row(row, &custom_fields);
        let company = CsvTable::cell(row, COMPANY);
        let key = if company.is_empty() {
            format!("row-num-{}", row_number)
        } else {
            company.to_string()
        };

        match index_by_key.get(&key) {
            Some(&existing) => {
                let contacts = lead["contacts"].as_array().cloned().unwrap_or_default();
                if let Some(list) = leads[existing].1["contacts"].as_array_mut() {
                    list.extend(contacts);
                }
            }
            None => {
                index_by_key.insert(key.clone(), leads.len());
                leads.push((key, lead));
            }
        }
    }

    leads
}

fn lead_from_row(row: &[String], custom_fields: &[(usize, String)]) -> Value {
    let cell = |index| CsvTable::cell(row, index);

    let status = match cell(STATUS) {
        "" => "potential",
        status => status,
    };

    let mut custom = Map::new();
    for (index, label) in custom_fields {
        let value = cell(*index);
        if !value.is_empty() {
            custom.insert(label.clone(), Value::from(value));
        }
    }

    let mut lead = json!({
        "name": cell(COMPANY),
        "url": cell(URL),
        "status": status,
        "contacts": [],
        "custom": custom,
    });

    let mut address = Map::new();
    if !cell(CITY).is_empty() {
        address.insert("city".into(), title_case(cell(CITY)).into());
    }
    for (index, field) in [(STATE, "state"), (ZIP, "zipcode"), (COUNTRY, "country")] {
        if !cell(index).is_empty() {
            address.insert(field.into(), cell(index).into());
        }
    }
    if !address.is_empty() {
        lead["addresses"] = json!([address]);
    }

    let mut contact = Map::new();
    if !cell(CONTACT_NAME).is_empty() {
        contact.insert("name".into(), uncamel(cell(CONTACT_NAME)).into());
    }
    if !cell(CONTACT_TITLE).is_empty() {
        contact.insert("title".into(), cell(CONTACT_TITLE).into());
    }
    if !cell(PHONE).is_empty() {
        contact.insert(
            "phones".into(),
            json!([{"phone": cell(PHONE), "type": "office"}]),
        );
    }
    if !cell(EMAIL).is_empty() {
        contact.insert(
            "emails".into(),
            json!([{"email": cell(EMAIL), "type": "office"}]),
        );
    }
    if !contact.is_empty() {
        lead["contacts"] = json!([contact]);
    }

    lead
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::http::ApiError;
    use reqwest::StatusCode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "Company,Url,Status,Email,Phone,Contact Name,Contact Title,Address,City,State,Zip,Country,Lead Source";

    fn table(rows: &[&str]) -> CsvTable {
        let data = std::iter::once(HEADER)
            .chain(rows.iter().copied())
            .collect::<Vec<_>>()
            .join("\n");
        CsvTable::from_reader(data.as_bytes()).unwrap()
    }

    #[test]
    fn test_lead_from_full_row() {
        let leads = table(&[
            "Acme,acme.com,,john@acme.com,555-0100,JohnDoe,CEO,,new york,NY,10001,US,Web",
        ]);
        let leads = leads_from_table(&leads);
        assert_eq!(leads.len(), 1);

        let (key, lead) = &leads[0];
        assert_eq!(key, "Acme");
        assert_eq!(
            lead,
            &json!({
                "name": "Acme",
                "url": "acme.com",
                "status": "potential",
                "custom": {"LeadSource": "Web"},
                "addresses": [{"city": "New York", "state": "NY", "zipcode": "10001", "country": "US"}],
                "contacts": [{
                    "name": "John Doe",
                    "title": "CEO",
                    "phones": [{"phone": "555-0100", "type": "office"}],
                    "emails": [{"email": "john@acme.com", "type": "office"}]
                }]
            })
        );
    }

    #[test]
    fn test_rows_group_by_company() {
        let leads = leads_from_table(&table(&[
            "Acme,,Qualified,a@acme.com,,,,,,,,,",
            ",,,,,,,,,,,,",
            "Acme,,,b@acme.com,,,,,,,,,",
            ",,,c@solo.com,,,,,,,,,",
        ]));

        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].0, "Acme");
        assert_eq!(leads[0].1["status"], "Qualified");
        assert_eq!(leads[0].1["contacts"].as_array().unwrap().len(), 2);
        assert!(leads[0].1.get("addresses").is_none());
        assert_eq!(leads[1].0, "row-num-3");
        assert_eq!(leads[1].1["contacts"][0]["emails"][0]["email"], "c@solo.com");
    }

    #[tokio::test]
    async fn test_import_continues_after_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        writeln!(file, "Acme,,,,,,,,,,,,").unwrap();
        writeln!(file, "Globex,,,,,,,,,,,,").unwrap();

        let mut api = MockApi::new();
        api.expect_post()
            .withf(|endpoint, body| endpoint == "lead" && body["name"] == "Acme")
            .times(1)
            .returning(|_, body| Ok(body.clone()));
        api.expect_post()
            .withf(|endpoint, body| endpoint == "lead" && body["name"] == "Globex")
            .times(1)
            .returning(|_, _| Err(ApiError::validation(StatusCode::BAD_REQUEST, "{}".into())));

        let args = ImportLeadsArgs {
            file: file.path().to_path_buf(),
        };
        let options = Options {
            confirmed: true,
            continue_on_error: true,
        };
        let summary = import_leads(&api, &args, &options).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_import_aborts_on_first_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        writeln!(file, "Acme,,,,,,,,,,,,").unwrap();
        writeln!(file, "Globex,,,,,,,,,,,,").unwrap();

        let mut api = MockApi::new();
        api.expect_post().times(1).returning(|_, _| {
            Err(ApiError::Http {
                status: StatusCode::FORBIDDEN,
                body: "Forbidden".into(),
            })
        });

        let args = ImportLeadsArgs {
            file: file.path().to_path_buf(),
        };
        let err = import_leads(&api, &args, &Options::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Acme"));
    }
}
