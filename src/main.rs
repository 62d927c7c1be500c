mod session;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use wxgate_core::{AppError, Config};
use wxgate_weather::WeatherService;

use crate::session::Request;

#[derive(Parser)]
#[command(name = "wxgate", version, about = "Cached OpenWeatherMap lookups")]
struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Lookup(Request),

    /// Answer requests read line by line from stdin, sharing one cache
    Serve,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    wxgate_core::init()?;

    let service = match build_service(cli.config.as_deref()) {
        Ok(service) => service,
        Err(e) => return Ok(report(&e)),
    };

    match cli.command {
        Command::Serve => {
            tracing::info!("Serving requests from stdin");
            let handled =
                session::serve(&service, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                    .await?;
            tracing::info!("Session closed after {} requests", handled);
            Ok(ExitCode::SUCCESS)
        }
        Command::Lookup(request) => match session::execute(&service, request).await {
            Ok(reply) => {
                println!("{}", serde_json::to_string_pretty(&reply)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => Ok(report(&e.into())),
        },
    }
}

fn build_service(config_path: Option<&Path>) -> Result<WeatherService, AppError> {
    let (config, _) = Config::load_validated(config_path)?;
    if !config.api.has_api_key() {
        tracing::warn!("Running without an API key; upstream requests will be rejected");
    }

    let service = WeatherService::from_config(&config)?;
    tracing::debug!("Service ready: {:?}", service);
    Ok(service)
}

fn report(error: &AppError) -> ExitCode {
    tracing::error!("{}", error);
    eprintln!("{}", error.user_message());
    ExitCode::FAILURE
}
