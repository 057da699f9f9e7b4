use anyhow::{Context, Result};
use log::info;
use serde_json::json;

use crate::api::{Api, query};
use crate::pagination::collect_all;

use super::{Options, Summary, id_of};

/// Lead search matching every lead with two or more addresses.
pub const MULTIPLE_ADDRESSES_QUERY: &str = "addresses > 1 sort:created";

#[derive(clap::Args, Debug, Clone, Default)]
pub struct DeleteSecondaryAddressesArgs {}

/// Keeps only the first address of every lead that has several.
///
/// The matching leads are all fetched before the first update, since trimming
/// addresses removes leads from the search.
#[tracing::instrument(skip_all)]
pub async fn delete_secondary_addresses<A: Api + ?Sized>(
    api: &A,
    _args: &DeleteSecondaryAddressesArgs,
    options: &Options,
) -> Result<Summary> {
    let filters = query(&[("query", MULTIPLE_ADDRESSES_QUERY), ("_fields", "id,addresses")]);
    let leads = collect_all(api, "lead", filters)
        .await
        .context("Failed to search leads")?;

    let mut summary = Summary::default();
    for lead in &leads {
        summary.processed += 1;
        let addresses = lead["addresses"].as_array().cloned().unwrap_or_default();
        if addresses.len() < 2 {
            summary.skipped += 1;
            continue;
        }

        let kept = &addresses[..1];
        match api
            .put(&format!("lead/{}", id_of(lead)), &json!({"addresses": kept}))
            .await
        {
            Ok(_) => {
                info!(
                    "removed {} extra address(es) for {}: {}",
                    addresses.len() - 1,
                    id_of(lead),
                    json!(kept)
                );
                summary.updated += 1;
            }
            Err(err) => options.on_error(&mut summary, format!("lead {}", id_of(lead)), err)?,
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::http::ApiError;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_keeps_first_address() {
        let mut api = MockApi::new();
        api.expect_get()
            .withf(|endpoint, q| {
                endpoint == "lead" && q.contains(&("query".into(), MULTIPLE_ADDRESSES_QUERY.into()))
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "has_more": false,
                    "data": [
                        {"id": "lead_1", "addresses": [{"city": "Austin"}, {"city": "Boston"}, {"city": "Chicago"}]},
                        {"id": "lead_2", "addresses": [{"city": "Denver"}]}
                    ]
                }))
            });
        api.expect_put()
            .withf(|endpoint, body| {
                endpoint == "lead/lead_1" && body == &json!({"addresses": [{"city": "Austin"}]})
            })
            .times(1)
            .returning(|_, body| Ok(body.clone()));

        let summary = delete_secondary_addresses(
            &api,
            &DeleteSecondaryAddressesArgs::default(),
            &Options::default(),
        )
        .await
        .unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_update_is_counted() {
        let mut api = MockApi::new();
        api.expect_get().times(1).returning(|_, _| {
            Ok(json!({
                "has_more": false,
                "data": [{"id": "lead_1", "addresses": [{"city": "Austin"}, {"city": "Boston"}]}]
            }))
        });
        api.expect_put().times(1).returning(|_, _| {
            Err(ApiError::Http {
                status: StatusCode::NOT_FOUND,
                body: "gone".into(),
            })
        });

        let options = Options {
            confirmed: true,
            continue_on_error: true,
        };
        let summary =
            delete_secondary_addresses(&api, &DeleteSecondaryAddressesArgs::default(), &options)
                .await
                .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.updated, 0);
    }
}
