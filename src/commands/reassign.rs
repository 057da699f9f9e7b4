use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde_json::json;

use crate::api::{Api, query};
use crate::pagination::OffsetPages;

use super::{Options, Summary, id_of};

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReassignArgs {
    /// User id to take items from
    #[arg(long = "from", short = 'f', value_name = "USER")]
    pub from_user_id: String,

    /// User id to give items to
    #[arg(long = "to", short = 't', value_name = "USER")]
    pub to_user_id: String,

    /// Reassign incomplete tasks
    #[arg(long, short = 'T')]
    pub tasks: bool,

    /// Reassign all tasks, complete or not
    #[arg(long)]
    pub all_tasks: bool,

    /// Reassign active opportunities
    #[arg(long, short = 'O')]
    pub opportunities: bool,

    /// Reassign all opportunities
    #[arg(long)]
    pub all_opportunities: bool,
}

/// Moves tasks and/or opportunities from one user to another.
#[tracing::instrument(skip(api, args, options))]
pub async fn reassign<A: Api + ?Sized>(
    api: &A,
    args: &ReassignArgs,
    options: &Options,
) -> Result<Summary> {
    if !(args.tasks || args.all_tasks || args.opportunities || args.all_opportunities) {
        bail!("At least one of --tasks, --all-tasks, --opportunities, --all-opportunities is required");
    }
    if args.from_user_id == args.to_user_id {
        bail!("The source and target users are the same");
    }

    for user_id in [&args.from_user_id, &args.to_user_id] {
        let user = api
            .get(&format!("user/{}", user_id), &query(&[("_fields", "id,email")]))
            .await
            .with_context(|| format!("Unknown user {}", user_id))?;
        debug!("{}", user);
    }

    let mut summary = Summary::default();

    if args.tasks || args.all_tasks {
        let mut filters = vec![("assigned_to", args.from_user_id.as_str())];
        if !args.all_tasks {
            filters.push(("is_complete", "false"));
        }
        move_items(
            api,
            "task",
            filters,
            json!({"assigned_to": args.to_user_id}),
            options,
            &mut summary,
        )
        .await?;
    }

    if args.opportunities || args.all_opportunities {
        let mut filters = vec![("user_id", args.from_user_id.as_str())];
        if !args.all_opportunities {
            filters.push(("status_type", "active"));
        }
        move_items(
            api,
            "opportunity",
            filters,
            json!({"user_id": args.to_user_id}),
            options,
            &mut summary,
        )
        .await?;
    }

    Ok(summary)
}

async fn move_items<A: Api + ?Sized>(
    api: &A,
    endpoint: &str,
    filters: Vec<(&str, &str)>,
    update: serde_json::Value,
    options: &Options,
    summary: &mut Summary,
) -> Result<()> {
    let mut q = query(&filters);
    q.extend(query(&[("_order_by", "date_created"), ("_fields", "id")]));

    // Reassigned items drop out of the filtered set.
    let mut pages = OffsetPages::new(api, endpoint, q).changing();
    while let Some(items) = pages
        .next_page()
        .await
        .with_context(|| format!("Failed to list {}s", endpoint))?
    {
        let mut moved = 0;
        for item in &items {
            let id = id_of(item);
            summary.processed += 1;
            match api.put(&format!("{}/{}", endpoint, id), &update).await {
                Ok(_) => {
                    info!("updated {} {}", endpoint, id);
                    summary.updated += 1;
                    moved += 1;
                }
                Err(err) => options.on_error(summary, format!("{} {}", endpoint, id), err)?,
            }
        }
        if options.confirmed {
            pages.removed(moved);
        }
    }
    Ok(())
}
