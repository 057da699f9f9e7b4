use anyhow::{Context, Result};
use log::info;
use serde_json::Value;
use std::path::PathBuf;

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, csv_cell, organization_id};

pub const CONTACT_HEADERS: [&str; 5] = [
    "lead_name",
    "contact_name",
    "title",
    "primary_email",
    "primary_phone",
];

const PAGE_SIZE: usize = 100;

#[derive(clap::Args, Debug, Clone)]
pub struct ExportContactsArgs {
    /// Lead search query
    #[arg(long, short = 'q')]
    pub query: String,

    /// CSV file to write
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,
}

/// Writes the primary email and phone of every contact on the matching leads.
#[tracing::instrument(skip(api, args, _options))]
pub async fn export_contacts<A: Api + ?Sized>(
    api: &A,
    args: &ExportContactsArgs,
    _options: &Options,
) -> Result<Summary> {
    let org_id = organization_id(api).await?;

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    writer.write_record(CONTACT_HEADERS)?;

    let filters = query(&[
        ("organization_id", org_id.as_str()),
        ("query", args.query.as_str()),
        ("_fields", "id,name,contacts"),
    ]);
    let mut summary = Summary::default();
    let mut pages = OffsetPages::new(api, "lead", filters).limit(PAGE_SIZE);
    while let Some(leads) = pages.next_page().await.context("Failed to search leads")? {
        for lead in &leads {
            summary.processed += 1;
            for contact in lead["contacts"].as_array().into_iter().flatten() {
                writer.write_record(contact_row(lead, contact))?;
                summary.exported += 1;
            }
        }
    }
    writer.flush()?;

    info!("Exported {} contact(s) to {:?}", summary.exported, args.output);
    Ok(summary)
}

fn contact_row(lead: &Value, contact: &Value) -> [String; 5] {
    [
        csv_cell(&lead["name"]),
        csv_cell(&contact["name"]),
        csv_cell(&contact["title"]),
        csv_cell(&contact["emails"][0]["email"]),
        csv_cell(&contact["phones"][0]["phone"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_contact_row_uses_first_email_and_phone() {
        let lead = json!({"name": "Acme"});
        let contact = json!({
            "name": "John Doe",
            "title": "CEO",
            "emails": [{"email": "john@acme.com"}, {"email": "j@acme.com"}],
            "phones": []
        });
        assert_eq!(
            contact_row(&lead, &contact),
            ["Acme", "John Doe", "CEO", "john@acme.com", ""].map(String::from)
        );
    }

    #[tokio::test]
    async fn test_export_contacts() {
        let mut api = MockApi::new();
        api.expect_get()
            .withf(|endpoint, _| endpoint == "me")
            .returning(|_, _| Ok(json!({"memberships": [{"organization_id": "orga_1"}]})));
        api.expect_get()
            .withf(|endpoint, q| {
                endpoint == "lead"
                    && q.contains(&("organization_id".into(), "orga_1".into()))
                    && q.contains(&("query".into(), "name:acme".into()))
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "has_more": false,
                    "data": [{
                        "id": "lead_1",
                        "name": "Acme",
                        "contacts": [
                            {"name": "John", "title": null,
                             "emails": [{"email": "john@acme.com"}],
                             "phones": [{"phone": "+15555550100"}]},
                            {"name": "Jane", "title": "CTO", "emails": [], "phones": []}
                        ]
                    }]
                }))
            });

        let dir = tempdir().unwrap();
        let args = ExportContactsArgs {
            query: "name:acme".to_string(),
            output: dir.path().join("contacts.csv"),
        };
        let summary = export_contacts(&api, &args, &Options::default())
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.exported, 2);

        let content = std::fs::read_to_string(&args.output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "lead_name,contact_name,title,primary_email,primary_phone");
        assert_eq!(lines[1], "Acme,John,,john@acme.com,+15555550100");
        assert_eq!(lines[2], "Acme,Jane,CTO,,");
    }
}
