use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use athlete_sync::commands::{self, Paths};
use athlete_sync::ledger::UploadLedger;
use athlete_sync::{Outcome, Pipeline, PipelineSettings, SyncError};
use athlete_sync_client::config::{FirstbeatConfig, SmartabaseConfig};
use athlete_sync_client::firstbeat::FirstbeatClient;
use athlete_sync_client::smartabase::SmartabaseClient;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use secrecy::ExposeSecret;

#[derive(Parser, Debug)]
#[command(name = "athlete-sync", about = "Sync Firstbeat ACWR/RMSSD measurements into Smartabase")]
struct Cli {
    /// Staging CSV handed from the fetch phase to the upload phase.
    #[arg(long, global = true, default_value = "firstbeat_data.csv")]
    staging: PathBuf,

    /// Directory for the run lock and the uploaded-id ledger.
    #[arg(long, global = true, default_value = ".")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query Firstbeat and write the staging file.
    Fetch,
    /// Upload the staging file to Smartabase.
    Upload,
    /// Fetch, upload, then remove the staging file.
    Run,
    /// Print this API consumer's Firstbeat API key. Needs only ID and SHARED_SECRET.
    ApiKey,
    /// List the Firstbeat accounts and teams this consumer can read.
    Accounts,
}

fn init_tracing() {
    // Configure logging from env var `ATHLETE_SYNC_LOG_LEVEL` (or fallback to `RUST_LOG`, default `info`).
    let log_env = std::env::var("ATHLETE_SYNC_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    // Keep HTTP internals quiet by default
    let combined_filter = format!("{},hyper=warn,reqwest=warn", log_env);
    let env_filter = tracing_subscriber::EnvFilter::try_new(combined_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::debug!("athlete-sync: log filter: {}", log_env);
}

fn firstbeat() -> anyhow::Result<(FirstbeatClient, u32)> {
    let cfg = FirstbeatConfig::from_env()?;
    Ok((FirstbeatClient::new(&cfg)?, cfg.days_back))
}

async fn print_accounts() -> anyhow::Result<()> {
    let mut cfg = FirstbeatConfig::bootstrap_from_env()?;
    if cfg.api_key.is_none() {
        let client = FirstbeatClient::new(&cfg)?;
        cfg.api_key = Some(client.api_key().await?);
    }
    let client = FirstbeatClient::new(&cfg)?;
    for account in client.list_accounts().await? {
        println!("{}\t{}", account.account_id, account.name);
        match client.list_teams(&account.account_id).await {
            Ok(teams) => {
                for team in teams {
                    println!("  team {}\t{}", team.team_id, team.name);
                }
            }
            Err(e) => tracing::warn!("teams of account {} unavailable: {}", account.account_id, e),
        }
    }
    Ok(())
}

fn pipeline(state_dir: &std::path::Path) -> anyhow::Result<Pipeline> {
    let cfg = SmartabaseConfig::from_env()?;
    let client = SmartabaseClient::new(&cfg)?;
    Ok(Pipeline::new(
        Arc::new(client),
        PipelineSettings {
            form_name: cfg.form_name,
            dedup_lookback_days: cfg.dedup_lookback_days,
            ledger: Some(UploadLedger::in_dir(state_dir)),
        },
    ))
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::NoStagingFile => "no staging file; nothing to upload".into(),
        Outcome::NothingStaged => "no staged rows; nothing to upload".into(),
        Outcome::NothingInWindow => "no rows in the target year; nothing to upload".into(),
        Outcome::NoRosterMatches => "no rows matched Smartabase users; nothing to upload".into(),
        Outcome::AllDuplicates => "all rows already exist in Smartabase; nothing to upload".into(),
        Outcome::Uploaded(s) => format!("uploaded {} events", s.uploaded),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths {
        staging: cli.staging,
        state_dir: cli.state_dir,
    };
    let now = chrono::Utc::now();
    match cli.command {
        Command::Fetch => {
            let (source, days_back) = firstbeat()?;
            let n = commands::fetch(&source, days_back, &paths, now).await?;
            tracing::info!("staged {} measurements at {}", n, paths.staging.display());
        }
        Command::Upload => {
            let pipeline = pipeline(&paths.state_dir)?;
            let outcome = commands::upload(&pipeline, &paths, now).await?;
            tracing::info!("{}", describe(&outcome));
        }
        Command::Run => {
            let (source, days_back) = firstbeat()?;
            let pipeline = pipeline(&paths.state_dir)?;
            let outcome = commands::run(&source, days_back, &pipeline, &paths, now).await?;
            tracing::info!("{}", describe(&outcome));
        }
        Command::ApiKey => {
            let cfg = FirstbeatConfig::bootstrap_from_env()?;
            let key = FirstbeatClient::new(&cfg)?.api_key().await?;
            println!("{}", key.expose_secret());
        }
        Command::Accounts => print_accounts().await?,
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("metrics recorder not installed: {}", e);
            None
        }
    };
    let state_dir = cli.state_dir.clone();
    let exports_metrics = matches!(cli.command, Command::Fetch | Command::Upload | Command::Run);

    let result = dispatch(cli).await;
    if let (Some(handle), true) = (&metrics, exports_metrics) {
        if let Err(e) = commands::export_metrics(&state_dir, &handle.render()) {
            tracing::warn!("could not export metrics: {}", e);
        }
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("athlete-sync failed: {:#}", e);
            let code = e.downcast_ref::<SyncError>().map_or(1, SyncError::exit_code);
            ExitCode::from(code)
        }
    }
}
