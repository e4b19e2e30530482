use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use whr_fetch::config::Settings;
use whr_fetch::services::{read_battle_ids, write_outcome, BatchFetcher, FetchError};
use whr_fetch::TracingSink;

/// How many IDs to show when listing skipped or null-rated battles
const REPORT_SAMPLE: usize = 10;

fn init_logging(level: &str, format: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

/// Render the body of a failed response, pretty-printed when it is JSON
fn describe_http_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| body.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings.logging.level, &settings.logging.format);

    let battle_ids = match read_battle_ids(&settings.paths.input, settings.paths.limit) {
        Ok(ids) => ids,
        Err(e) => {
            error!("Failed to read battle summaries: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let fetcher = match BatchFetcher::from_settings(&settings, Arc::new(TracingSink)) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to initialize HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let requested = battle_ids.len();
    info!("Fetching WHR data for {} battles", requested);

    let outcome = match fetcher.fetch(battle_ids).await {
        Ok(outcome) => outcome,
        Err(FetchError::Http { status, body, retry_after }) => {
            error!(
                "HTTP error while fetching WHR data: {} - {} (retry after: {:?})",
                status,
                describe_http_error(&body),
                retry_after
            );
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Error fetching WHR data: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_outcome(&outcome, &settings.paths) {
        error!("Failed to write results: {}", e);
        return ExitCode::FAILURE;
    }

    info!(
        "Fetched WHR data for {} battles, skipped {}/{}, missing {}",
        outcome.fetched.len(),
        outcome.skipped.len(),
        requested,
        outcome.missing.len()
    );

    if !outcome.skipped.is_empty() {
        let sample: Vec<_> = outcome.skipped.iter().take(REPORT_SAMPLE).collect();
        warn!(
            "Skipped error inducing battles for {} battles: {:?}",
            outcome.skipped.len(),
            sample
        );
    }

    // The frontend reports these as server sourced nulls
    let null_rated = outcome.null_rated();
    if !null_rated.is_empty() {
        let sample: Vec<_> = null_rated.iter().take(REPORT_SAMPLE).collect();
        warn!(
            "Received null WHR ratings for {} battles: {:?}",
            null_rated.len(),
            sample
        );
    }

    ExitCode::SUCCESS
}
