use anyhow::{Context, Result, bail};
use clap::Parser;
use closeio::api::DryRun;
use closeio::commands::{self, Options, Summary};
use closeio::http::{Client, ClientConfig};
use closeio::Api;
use log::info;
use std::io::Write;
use std::time::Duration;

/// closeio - bulk operations for the Close CRM API
///
/// Without --confirmed every write is only logged (dry run).
///
/// Examples:
///   closeio -k KEY backup-leads -o leads.json
///   closeio -k KEY reassign --from user_1 --to user_2 --tasks --confirmed
#[derive(Parser, Debug)]
#[command(author, version = env!("CLOSEIO_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API key (also via CLOSE_API_KEY)
    #[arg(
        long = "api-key",
        short = 'k',
        env = "CLOSE_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,

    /// Use the local development server instead of production
    #[arg(long, short = 'd', global = true)]
    pub development: bool,

    /// API root URL (overrides --development)
    #[arg(long = "api-url", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Really perform writes; without it the run is a dry run
    #[arg(long, short = 'c', global = true)]
    pub confirmed: bool,

    /// Log and count failed items instead of stopping at the first one
    #[arg(long, global = true)]
    pub continue_on_error: bool,

    /// Debug logging, including every HTTP request sent
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Give up on a request after this many seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Dump all leads to a JSON file
    BackupLeads(commands::BackupLeadsArgs),

    /// Export opportunities to CSV
    ExportOpportunities(commands::ExportOpportunitiesArgs),

    /// Export the contacts of matching leads to CSV
    ExportContacts(commands::ExportContactsArgs),

    /// Import leads from a template CSV
    ImportLeads(commands::ImportLeadsArgs),

    /// Move tasks and opportunities between users
    Reassign(commands::ReassignArgs),

    /// Merge leads with identical names
    MergeDuplicates(commands::MergeDuplicatesArgs),

    /// Keep only the first address of each lead
    DeleteSecondaryAddresses(commands::DeleteSecondaryAddressesArgs),

    /// Replace an address country code
    UpdateAddressCountries(commands::UpdateAddressCountriesArgs),

    /// Drop custom fields from every lead
    RemoveCustomFields(commands::RemoveCustomFieldsArgs),

    /// Remove email addresses listed in a CSV from contacts
    DeleteEmails(commands::DeleteEmailsArgs),

    /// Delete tasks assigned to inactive users
    DeleteInactiveUserTasks(commands::DeleteInactiveUserTasksArgs),

    /// Save the events produced by one API request
    EventsByRequestId(commands::EventsByRequestIdArgs),

    /// Set the status of the opportunities of matching leads
    UpdateOpportunities(commands::UpdateOpportunitiesArgs),

    /// Update or create leads from a CSV, matched by lead_id or company
    UpsertLeads(commands::UpsertLeadsArgs),

    /// Copy matching leads into another organization
    TransferLeads(commands::TransferLeadsArgs),
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) else {
            bail!("An API key is required (--api-key or CLOSE_API_KEY)");
        };
        let mut config = ClientConfig::new(api_key);
        if self.development {
            config = config.development();
        }
        if let Some(url) = &self.api_url {
            config = config.with_base_url(url.as_str());
        }
        if let Some(seconds) = self.timeout {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        Ok(config.with_request_logging(self.verbose))
    }
}

fn init_logger(verbose: bool, confirmed: bool) {
    let level = if verbose { "debug" } else { "info" };
    let prefix = if confirmed { "" } else { "DRY RUN: " };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(move |buf, record| {
            writeln!(
                buf,
                "{}[{}] {} {}",
                prefix,
                buf.timestamp(),
                record.level(),
                record.args()
            )
        })
        .init();
}

async fn run<A: Api>(
    command: &Commands,
    api: &A,
    options: &Options,
    config: &ClientConfig,
) -> Result<Summary> {
    match command {
        Commands::BackupLeads(args) => commands::backup_leads(api, args, options).await,
        Commands::ExportOpportunities(args) => {
            commands::export_opportunities(api, args, options).await
        }
        Commands::ExportContacts(args) => commands::export_contacts(api, args, options).await,
        Commands::ImportLeads(args) => commands::import_leads(api, args, options).await,
        Commands::Reassign(args) => commands::reassign(api, args, options).await,
        Commands::MergeDuplicates(args) => commands::merge_duplicates(api, args, options).await,
        Commands::DeleteSecondaryAddresses(args) => {
            commands::delete_secondary_addresses(api, args, options).await
        }
        Commands::UpdateAddressCountries(args) => {
            commands::update_address_countries(api, args, options).await
        }
        Commands::RemoveCustomFields(args) => {
            commands::remove_custom_fields(api, args, options).await
        }
        Commands::DeleteEmails(args) => commands::delete_emails(api, args, options).await,
        Commands::DeleteInactiveUserTasks(args) => {
            commands::delete_inactive_user_tasks(api, args, options).await
        }
        Commands::EventsByRequestId(args) => {
            commands::events_by_request_id(api, args, options).await
        }
        Commands::UpdateOpportunities(args) => {
            commands::update_opportunities(api, args, options).await
        }
        Commands::UpsertLeads(args) => commands::upsert_leads(api, args, options).await,
        Commands::TransferLeads(args) => {
            let target_config = config.clone().with_api_key(args.target_api_key.as_str());
            let target = Client::new(target_config)
                .context("Failed to set up the HTTP client for the target organization")?;
            let target = DryRun::new(target, options.confirmed);
            commands::transfer_leads(api, &target, args, options).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.confirmed);

    let config = cli.client_config()?;
    let client = Client::new(config.clone()).context("Failed to set up the HTTP client")?;
    let api = DryRun::new(client, cli.confirmed);
    let options = Options {
        confirmed: api.is_confirmed(),
        continue_on_error: cli.continue_on_error,
    };

    let summary = run(&cli.command, &api, &options, &config).await?;
    info!("Done; {}", summary);
    if summary.failed > 0 {
        bail!("{} item(s) failed", summary.failed);
    }
    Ok(())
}
