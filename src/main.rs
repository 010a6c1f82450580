mod auth;
mod drive;
mod error;
mod flow;
mod token;

use std::path::PathBuf;

use clap::Parser;

use crate::drive::{upload_file_to_drive, DEFAULT_FOLDER_NAME};
use crate::error::{AppError, UploadError};

#[derive(Parser)]
#[command(
    name = "upload_screenshot_to_drive",
    about = "Upload a screenshot to a Google Drive folder"
)]
struct Cli {
    /// Path to the screenshot file to upload
    file_path: PathBuf,

    /// Google Drive folder name
    #[arg(long, default_value = DEFAULT_FOLDER_NAME)]
    folder_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Tracing to stderr — stdout carries only the final upload report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match upload_file_to_drive(&cli.file_path, &cli.folder_name).await {
        Ok(outcome) => {
            println!("Upload successful!");
            println!("  File ID: {}", outcome.file_id);
            if let Some(name) = outcome.name {
                println!("  File Name: {name}");
            }
            if let Some(link) = outcome.web_view_link {
                println!("  View Link: {link}");
            }
        }
        // Credentials unobtainable at startup is the only failure that
        // changes the exit status.
        Err(UploadError::Auth(e)) => {
            if matches!(e, AppError::CredentialsNotFound { .. }) {
                eprintln!("Error: {e}");
            } else {
                eprintln!("Authentication failed: {e}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Upload failed: {e}");
        }
    }

    Ok(())
}
