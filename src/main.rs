use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use studio_uploader::config::{
    ensure_logs_dir, get_config_file_path, load_config, load_config_from, save_config,
};
use studio_uploader::error::UploadError;
use studio_uploader::events::{ProgressEvent, ProgressEventPayload};
use studio_uploader::logging::{init_logging, read_component_logs, PIPELINE_COMPONENT};
use studio_uploader::upload_pipeline::{
    FileStatus, HttpBackend, RawFile, StudioBackend, UploadOrchestrator, UploadRequest,
};
use studio_uploader::validation::{expand_upload_paths, validate_media_file};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "studio-uploader")]
#[command(about = "Upload photography session media to the studio portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files or directories into a session
    Upload {
        /// Session (container) id
        #[arg(long, short = 's')]
        session: String,

        /// Destination category
        #[arg(long, short = 'c', default_value = "gallery")]
        category: String,

        /// Files or directories to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the files already stored in a session
    List {
        #[arg(long, short = 's')]
        session: String,

        #[arg(long, short = 'c', default_value = "gallery")]
        category: String,
    },
    /// Save server URL and API key to the config file
    Configure {
        #[arg(long)]
        server_url: Option<String>,

        #[arg(long)]
        api_key: Option<String>,
    },
    /// Show recent activity log entries
    Logs {
        #[arg(long, default_value = PIPELINE_COMPONENT)]
        component: String,

        #[arg(long, short = 'n', default_value = "50")]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logs_dir = ensure_logs_dir()?;
    if let Err(e) = init_logging(&logs_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Upload {
            session,
            category,
            paths,
        } => upload(session, category, paths).await,
        Commands::List { session, category } => list(session, category).await,
        Commands::Configure {
            server_url,
            api_key,
        } => configure(server_url, api_key),
        Commands::Logs { component, lines } => {
            let entries = read_component_logs(&logs_dir, &component, Some(lines))
                .map_err(UploadError::from)?;
            for entry in entries.iter().rev() {
                println!(
                    "{} {:5} {}",
                    entry.timestamp, entry.level, entry.message
                );
            }
            Ok(())
        }
    }
}

async fn upload(session: String, category: String, paths: Vec<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let backend: Arc<dyn StudioBackend> = Arc::new(HttpBackend::from_config(&config)?);

    let mut files = Vec::new();
    for path in expand_upload_paths(&paths)? {
        let (path, _) = validate_media_file(&path, config.tunables.max_file_bytes)?;
        files.push(RawFile::open(&path).await?);
    }

    let orchestrator = UploadOrchestrator::new(backend, config.tunables.clone());
    let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
    let request = UploadRequest::new(session, category, files);

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current window...");
            cancel.cancel();
        }
    });

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let finished = matches!(event.payload, ProgressEventPayload::RunFinished { .. });
                    print_event(&event, &names);
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = orchestrator.run(request).await;
    // Dropping the last bus sender lets the printer drain and stop
    drop(orchestrator);
    let _ = printer.await;

    let report = result?;
    for outcome in report.failed_outcomes() {
        eprintln!(
            "  failed #{}: {}",
            outcome.index,
            outcome.error_reason.as_deref().unwrap_or("unknown error")
        );
    }
    println!("{}", report.message);
    println!("{} files now in {}", report.listing.len(), report.category);

    if report.summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &ProgressEvent, names: &[String]) {
    match &event.payload {
        ProgressEventPayload::RunStarted { total } => println!("Uploading {} files", total),
        ProgressEventPayload::FileStatusChanged { index, status } => {
            let name = names.get(*index).map(String::as_str).unwrap_or("?");
            match status {
                FileStatus::Completed => println!("  done    {}", name),
                FileStatus::Failed => println!("  failed  {}", name),
                FileStatus::Uploading | FileStatus::Pending => {}
            }
        }
        ProgressEventPayload::WindowSettled {
            percent,
            status_line,
            ..
        } => println!("[{:3}%] {}", percent, status_line),
        ProgressEventPayload::RunFinished { .. } => {}
    }
}

async fn list(session: String, category: String) -> Result<()> {
    let config = load_config()?;
    let backend = HttpBackend::from_config(&config)?;
    let files = backend
        .list_files(&session, &category)
        .await
        .with_context(|| format!("Failed to list files for session {}", session))?;

    for file in &files {
        match file.size {
            Some(size) => println!("{:>12}  {}", size, file.name),
            None => println!("{:>12}  {}", "-", file.name),
        }
    }
    println!("{} files", files.len());
    Ok(())
}

fn configure(server_url: Option<String>, api_key: Option<String>) -> Result<()> {
    // Edit the file as stored, without environment overrides
    let mut config = load_config_from(&get_config_file_path()?)?;
    if server_url.is_none() && api_key.is_none() {
        println!(
            "Server URL: {}",
            config.server_url.as_deref().unwrap_or("(not set)")
        );
        println!(
            "API key:    {}",
            if config.api_key.is_some() { "set" } else { "(not set)" }
        );
        return Ok(());
    }

    if let Some(url) = server_url {
        url::Url::parse(&url).with_context(|| format!("Invalid server URL: {}", url))?;
        config.server_url = Some(url);
    }
    if let Some(key) = api_key {
        config.api_key = Some(key);
    }
    save_config(&config)?;
    println!("Configuration saved");
    Ok(())
}
