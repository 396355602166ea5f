use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use patrimoine_core::schedules::JobRunState;
use patrimoine_core::utils::time_utils::ledger_date_today;
use patrimoine_server::{build_state, config::Config, init_tracing, scheduler};

#[derive(Parser)]
#[command(name = "patrimoine-server", version, about = "Personal wealth ledger server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon (default)
    Serve,
    /// Materialize scheduled events once and exit
    Materialize {
        /// As-of date (YYYY-MM-DD), defaults to today in the configured timezone
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Print the job-run record as JSON
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    let state = build_state(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let handle = scheduler::start_materializer_scheduler(state, config.scheduler_hour);
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            handle.abort();
            Ok(ExitCode::SUCCESS)
        }
        Command::Materialize { date, verbose } => {
            let as_of = date.unwrap_or_else(|| ledger_date_today(config.timezone));
            let Some(run) = scheduler::run_materializer(&state, as_of).await else {
                return Ok(ExitCode::FAILURE);
            };
            if verbose {
                println!("{}", serde_json::to_string_pretty(&run)?);
            }
            Ok(if run.state == JobRunState::Done {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
