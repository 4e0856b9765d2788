use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use pagewatch::config::MonitorConfig;
use pagewatch::fetcher::HttpFetcher;
use pagewatch::monitor::{Monitor, TokioSleeper};
use pagewatch::notify::{EmailNotifier, NotificationPolicy};
use pagewatch::store::{MatchStore, SEEN_MATCHES_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _guard = init_logging()?;

    let config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("Check your environment variables and try again.");
            std::process::exit(1);
        }
    };

    info!("configuration loaded");
    info!("url: {}", config.url);
    info!("search terms: {}", config.terms.join(", "));
    info!("check interval: {} seconds", config.check_interval.as_secs());
    info!("smtp server: {}:{}", config.smtp.server, config.smtp.port);
    info!("sender: {}", config.smtp.sender_email);
    info!("recipient: {}", config.smtp.recipient_email);

    let fetcher = HttpFetcher::new(config.url.clone())?;
    if let Err(e) = fetcher.probe().await {
        eprintln!("Configuration error: unable to access {}: {e}", config.url);
        eprintln!("Check MONITOR_URL and try again.");
        std::process::exit(1);
    }

    let store = MatchStore::load(SEEN_MATCHES_FILE);

    println!("\nMonitoring started");
    println!("Currently tracking {} previously seen matches", store.len());
    println!("Press Ctrl+C to stop monitoring\n");

    let sender = EmailNotifier::new(config.smtp.clone())?;
    let policy = NotificationPolicy::new(config.url.clone());

    let monitor = Monitor::new(
        Arc::new(fetcher),
        Arc::new(sender),
        Arc::new(TokioSleeper),
        policy,
        store,
        config.terms.clone(),
        config.check_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(monitor.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(true);
    handle.await?;

    println!("\n\nMonitoring stopped by user");
    info!("monitoring stopped by user");

    Ok(())
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::daily("logs", "monitor.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    // Diagnostics go to the dated log file; the console carries only the
    // progress markers.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pagewatch=info".parse()?),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
