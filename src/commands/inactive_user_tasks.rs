use anyhow::{Context, Result};
use log::{debug, info};

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, id_of, organization_id};

const PAGE_SIZE: usize = 100;

#[derive(clap::Args, Debug, Clone, Default)]
pub struct DeleteInactiveUserTasksArgs {}

/// User ids of the organization's inactive members.
async fn inactive_user_ids<A: Api + ?Sized>(api: &A) -> Result<Vec<String>> {
    let org_id = organization_id(api).await?;
    let org = api
        .get(
            &format!("organization/{}", org_id),
            &query(&[("_fields", "id,inactive_memberships")]),
        )
        .await
        .with_context(|| format!("Failed to fetch organization {}", org_id))?;

    Ok(org["inactive_memberships"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|membership| membership["user_id"].as_str())
        .map(str::to_string)
        .collect())
}

/// Deletes every task assigned to a user who is no longer active.
#[tracing::instrument(skip_all)]
pub async fn delete_inactive_user_tasks<A: Api + ?Sized>(
    api: &A,
    _args: &DeleteInactiveUserTasksArgs,
    options: &Options,
) -> Result<Summary> {
    let users = inactive_user_ids(api).await?;

    let mut task_ids = Vec::new();
    for (index, user_id) in users.iter().enumerate() {
        debug!("Gathering tasks for {} ({}/{})", user_id, index + 1, users.len());
        let filters = query(&[("assigned_to", user_id.as_str()), ("_fields", "id")]);
        let mut pages = OffsetPages::new(api, "task", filters).limit(PAGE_SIZE);
        while let Some(tasks) = pages
            .next_page()
            .await
            .with_context(|| format!("Failed to list tasks of {}", user_id))?
        {
            task_ids.extend(tasks.iter().map(|task| id_of(task).to_string()));
        }
    }
    info!(
        "Found {} task(s) for {} inactive user(s)",
        task_ids.len(),
        users.len()
    );

    let mut summary = Summary::default();
    for (index, task_id) in task_ids.iter().enumerate() {
        summary.processed += 1;
        match api.delete(&format!("task/{}", task_id)).await {
            Ok(_) => {
                debug!("Deleted {}/{}", index + 1, task_ids.len());
                summary.deleted += 1;
            }
            Err(err) => options.on_error(&mut summary, format!("task {}", task_id), err)?,
        }
    }

    Ok(summary)
}
