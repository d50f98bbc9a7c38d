use clap::Parser;
use phone_range_nexus::cli::{self, Cli};
use phone_range_nexus::journal::{LogLevel, RunEvent};
use serde_json::json;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("NEXUS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli::execute(&config, &cli.command).await {
        Ok(output) => {
            match serde_json::to_string_pretty(&output.report) {
                Ok(rendered) => println!("{}", rendered),
                Err(e) => error!("Failed to render result: {}", e),
            }
            ExitCode::from(output.exit_code())
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!("{}", message);
            cli::record_events(
                &config,
                &[RunEvent {
                    at: chrono::Utc::now(),
                    level: LogLevel::Error,
                    message: message.clone(),
                }],
            );
            println!("{}", json!({"success": false, "message": message}));
            ExitCode::FAILURE
        }
    }
}
