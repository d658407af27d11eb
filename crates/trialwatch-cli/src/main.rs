//! Trialwatch - a line-oriented terminal front end for browsing recently
//! updated clinical trials and pinning favorites.
//!
//! Type `help` at the prompt for the command list.

mod commands;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trialwatch_core::{
    ApiClient, CatalogGateway, Config, FileStore, PollEvent, Record, TrialService,
};

use commands::{Command, HELP};

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "trialwatch.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to a daily file in `log_dir` so they never interleave with the
/// prompt output.
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let loaded = Config::load();
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    config.apply_env_overrides();

    let cache_dir = config.cache_dir()?;
    std::fs::create_dir_all(&cache_dir)?;
    let _log_guard = init_tracing(&cache_dir);
    if let Err(e) = loaded {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(api = %config.api_base_url, ?cache_dir, "Trialwatch starting");

    let storage = Arc::new(FileStore::new(cache_dir)?);
    let gateway: Arc<dyn CatalogGateway> = Arc::new(ApiClient::with_base_url(config.api_base_url.clone())?);
    let service = TrialService::new(config, gateway, storage);

    let _loading = service.loading().subscribe(|loading: &bool| {
        if *loading {
            println!("Loading...");
        }
    });
    let _favorites = service.favorite_changes().subscribe(|favorites: &Vec<Record>| {
        println!("[{} favorites]", favorites.len());
    });
    spawn_event_printer(&service);

    match service.restored_age() {
        Some(age) => {
            println!("Cached window from {}:", age);
            print_records(&service.window_snapshot());
        }
        None => println!("No cached window. Type 'load' to fetch studies."),
    }
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = run_command(&service, command).await {
            println!("Error: {}", e);
        }
    }

    service.stop_polling();
    info!("Trialwatch shutting down");
    Ok(())
}

async fn run_command(service: &TrialService, command: Command) -> Result<()> {
    match command {
        Command::Load => {
            let count = service.load_initial().await?;
            println!("Loaded {} studies.", count);
            print_records(&service.window_snapshot());
        }
        Command::Refresh => {
            let record = service.refresh_now().await?;
            println!("Added {}", record.summary_line());
        }
        Command::Poll(true) => {
            service.start_polling().await?;
            println!(
                "Polling every {}s. Type 'poll off' to stop.",
                service.config().poll_interval().as_secs()
            );
        }
        Command::Poll(false) => {
            service.stop_polling();
            println!("Polling stopped.");
        }
        Command::Fav(id) => {
            let pinned = service.toggle_favorite(&id).await?;
            let verb = if pinned { "Pinned" } else { "Unpinned" };
            println!("{} {} ({} favorites)", verb, id, service.favorites_count());
        }
        Command::Show(id) => {
            let record = service.get_by_id(&id).await?;
            print_detail(&record);
        }
        Command::List => print_records(&service.window_snapshot()),
        Command::Favorites => print_records(&service.favorites_snapshot()),
        Command::Clear => {
            service.clear_favorites()?;
            println!("Favorites cleared.");
        }
        Command::Reset => {
            service.reset_window();
            println!("Window emptied.");
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

/// Print one line per poll tick until the service goes away.
fn spawn_event_printer(service: &TrialService) {
    let mut events = service.poll_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PollEvent::Appended { id, evicted }) => match evicted {
                    Some(old) => println!("+ {} (dropped {})", id, old),
                    None => println!("+ {}", id),
                },
                Ok(PollEvent::Failed { error, .. }) => println!("! poll failed: {}", error),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Poll event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("  (empty)");
    }
    for record in records {
        println!("{}", record.summary_line());
    }
}

fn print_detail(record: &Record) {
    println!("{}", record.summary_line());
    if let Some(official) = &record.official_title {
        println!("  Official title: {}", official);
    }
    let fields = [
        ("Type", record.study_type.as_deref()),
        ("Condition", record.condition.as_deref()),
        ("Last updated", record.last_updated.as_deref()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }
    if let Some(count) = record.enrollment_count {
        println!("  Enrollment: {}", count);
    }
    for (label, items) in [("Interventions", &record.interventions), ("Locations", &record.locations)] {
        if let Some(items) = items.as_ref().filter(|i| !i.is_empty()) {
            println!("  {}:", label);
            for item in items {
                println!("    - {}", item);
            }
        }
    }
    if let Some(description) = &record.description {
        println!();
        println!("{}", description);
    }
}
