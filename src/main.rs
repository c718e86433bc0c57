use clap::Parser;
use usage_census::config::{CredentialSources, Credentials};
use usage_census::domain::model::Category;
use usage_census::domain::ports::ContactDirectory;
use usage_census::utils::{logger, validation::Validate};
use usage_census::{
    CensusConfig, CensusEngine, CensusError, Cli, CodaWebhook, Command, DeliveryOutcome,
    IntercomClient, LogFormat, RunArgs, RunMode, RunOutcome, RunRequest, SyntheticDirectory,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let Command::Run(args) = cli.command;

    match args.log_format {
        LogFormat::Text => logger::init_cli_logger(args.verbose),
        LogFormat::Json => logger::init_json_logger(args.verbose),
    }

    tracing::info!("Starting usage-census");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    match execute(&args).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => {
            tracing::error!(
                "❌ Census run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = e.exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

async fn execute(args: &RunArgs) -> Result<RunOutcome, CensusError> {
    let config = CensusConfig::load(args.config.as_deref())?;
    config.validate()?;

    let sources = CredentialSources::from_process(&config.credentials);
    let credentials = Credentials::resolve(&sources, !args.test)?;
    tracing::debug!("Resolved credentials: {:?}", credentials);

    let sink = CodaWebhook::new(
        credentials.webhook_url.as_str(),
        credentials.webhook_token.as_str(),
        &config.webhook,
    )?;

    let request = RunRequest {
        recency_days: args.recency_days,
        mode: if args.test { RunMode::Test } else { RunMode::Live },
        tag_profiles: args.tag && !args.test,
    };
    if args.tag && args.test {
        tracing::info!("Tagging is disabled in test mode");
    }

    if args.test {
        tracing::info!("🧪 Test mode: using synthetic contacts");
        let directory = SyntheticDirectory::new(&config.classification);
        run_with(directory, sink, config, request).await
    } else {
        let token = credentials
            .intercom_token
            .ok_or_else(|| CensusError::MissingConfigError {
                field: "intercom_token".to_string(),
            })?;
        let directory = IntercomClient::new(&config, token)?;
        run_with(directory, sink, config, request).await
    }
}

async fn run_with<D: ContactDirectory>(
    directory: D,
    sink: CodaWebhook,
    config: CensusConfig,
    request: RunRequest,
) -> Result<RunOutcome, CensusError> {
    CensusEngine::new(directory, sink, config).run(request).await
}

fn print_outcome(outcome: &RunOutcome) {
    let report = &outcome.report;

    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("❌ Failed to serialize report: {}", e),
    }

    let census = &report.report;
    println!("✅ Census completed for the last {} day(s)", report.recency_days);
    println!("📧 Unique emails: {}", census.total_unique_emails);
    println!("👤 Profiles in window: {}", census.total_profiles_in_window);
    println!("👥 Emails with multiple profiles: {}", census.emails_with_multiple_profiles);
    println!("🎟️ Fee waivers: {}", census.fee_waiver_count);
    for category in Category::ALL {
        println!(
            "   {:<8} {}",
            category.key(),
            census.categories.get(category).count
        );
    }
    if let Some(tagging) = &report.tagging_results {
        println!(
            "🏷️ Tagged {}/{} profiles ({} failed batches)",
            tagging.successfully_tagged, tagging.total_profiles_to_tag, tagging.failed_batches
        );
    }

    match &outcome.delivery {
        DeliveryOutcome::Delivered { attempts } => {
            println!("📤 Report sent to webhook ({} attempt(s))", attempts)
        }
        DeliveryOutcome::Failed { attempts, error } => {
            println!(
                "⚠️ Webhook delivery failed after {} attempt(s): {}",
                attempts, error
            );
            println!("💡 Suggestion: {}", error.recovery_suggestion());
        }
    }
}
