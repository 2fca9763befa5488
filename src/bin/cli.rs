//! kpivault CLI
//!
//! Command-line interface over a local data directory.

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use kpivault::attachment::UploadRequest;
use kpivault::model::{BlobId, NewRecord, RecordId, RecordUpdate};
use kpivault::transfer::TransferRequest;
use kpivault::{Command, Config, Engine, KpiError, Reply};
use tracing_subscriber::{fmt, EnvFilter};

/// kpivault CLI
#[derive(Parser, Debug)]
#[command(name = "kpivault-cli")]
#[command(about = "Track development goals and their file attachments")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./kpivault_data")]
    data_dir: String,

    /// Acting user recorded in audit fields (defaults to $USER)
    #[arg(short, long)]
    actor: Option<String>,

    /// Largest accepted attachment, in MB
    #[arg(long, default_value = "10")]
    max_attachment_mb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a record
    Create {
        #[arg(long)]
        goal: String,

        #[arg(long)]
        description: String,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_due)]
        due: DateTime<Utc>,

        #[arg(long, default_value = "0")]
        percent: u8,
    },

    /// Show one record
    Get { id: RecordId },

    /// List all active records
    List,

    /// Update a record (the percentage is always written)
    Update {
        id: RecordId,

        #[arg(long, default_value = "")]
        goal: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, value_parser = parse_due)]
        due: Option<DateTime<Utc>>,

        #[arg(long, default_value = "0")]
        percent: u8,
    },

    /// Soft-delete a record
    Delete { id: RecordId },

    /// Attach a file to a record
    Upload {
        record: RecordId,

        file: PathBuf,

        #[arg(long, default_value = "")]
        content_type: String,
    },

    /// Write an attachment's bytes to a file
    Download {
        file_id: BlobId,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Detach a file from a record and delete it
    Detach { record: RecordId, file_id: BlobId },

    /// Move an attachment to another record
    Transfer {
        #[arg(long)]
        from: RecordId,

        #[arg(long)]
        to: RecordId,

        #[arg(long)]
        file_id: BlobId,
    },

    /// Completion statistics
    Stats,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kpivault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let actor = args
        .actor
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "anonymous".to_string());

    let engine = match attachment_limit(args.max_attachment_mb).and_then(|max_bytes| {
        Engine::open(
            Config::builder()
                .data_dir(&args.data_dir)
                .max_attachment_bytes(max_bytes)
                .build(),
        )
    }) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command, actor).await {
        tracing::error!(kind = ?e.kind(), "{}", e);
        std::process::exit(1);
    }
}

/// Convert the `--max-attachment-mb` flag to bytes
fn attachment_limit(mb: usize) -> kpivault::Result<usize> {
    mb.checked_mul(1024 * 1024).ok_or_else(|| {
        KpiError::Config(format!("max attachment size of {} MB is too large", mb))
    })
}

async fn run(engine: &Engine, command: Commands, actor: String) -> kpivault::Result<()> {
    let mut download_target = None;

    let command = match command {
        Commands::Create {
            goal,
            description,
            due,
            percent,
        } => Command::CreateRecord {
            record: NewRecord {
                goal,
                description,
                due_date: due,
                actual_percent: percent,
            },
            actor,
        },
        Commands::Get { id } => Command::GetRecord { id },
        Commands::List => Command::ListRecords,
        Commands::Update {
            id,
            goal,
            description,
            due,
            percent,
        } => Command::UpdateRecord {
            id,
            update: RecordUpdate {
                goal,
                description,
                due_date: due,
                actual_percent: percent,
            },
            actor,
        },
        Commands::Delete { id } => Command::DeleteRecord { id, actor },
        Commands::Upload {
            record,
            file,
            content_type,
        } => {
            let data = tokio::fs::read(&file).await?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            Command::Upload(UploadRequest {
                record_id: record,
                filename,
                content_type,
                data: Bytes::from(data),
                actor,
            })
        }
        Commands::Download { file_id, output } => {
            download_target = Some(output);
            Command::Download { file_id }
        }
        Commands::Detach { record, file_id } => Command::DeleteAttachment {
            record_id: record,
            file_id,
            actor,
        },
        Commands::Transfer { from, to, file_id } => Command::Transfer(TransferRequest {
            from,
            to,
            file_id,
            actor,
        }),
        Commands::Stats => Command::PerformanceStats,
    };

    match engine.execute(command).await? {
        Reply::Record(record) => print_json(&record)?,
        Reply::Records(records) => print_json(&records)?,
        Reply::Attachment(attachment) => print_json(&attachment)?,
        Reply::Transferred(receipt) => print_json(&receipt)?,
        Reply::Stats(buckets) => print_json(&buckets)?,
        Reply::Blob(blob) => {
            if let Some(output) = download_target {
                tokio::fs::write(&output, &blob.data).await?;
                tracing::info!(path = %output.display(), bytes = blob.len(), "Attachment written");
            }
            print_json(&blob.metadata)?;
        }
        Reply::Done => println!("OK"),
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> kpivault::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Accept a plain date (midnight UTC) or a full RFC 3339 timestamp
fn parse_due(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date {:?}, expected YYYY-MM-DD or RFC 3339", s))
}
