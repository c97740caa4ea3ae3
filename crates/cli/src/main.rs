use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refguard::app::{Cli, Command};
use refguard::commands::{self, DeleteResult};
use refguard::config::GuardConfig;
use refguard::confirm::PolicyConfirmation;
use refguard::trace;
use refguard_core::{AssetPath, DocumentCategory};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refguard=info,refguard_core=info,refguard_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- Configuration ---
    let config = GuardConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        root = %config.root.display(),
        confirm = config.confirm.as_str(),
        reissue = config.reissue,
        "Loaded refguard configuration"
    );

    let mut store = commands::open_store(&config)
        .with_context(|| format!("Cannot open store at {}", config.root.display()))?;
    let hooks = trace::registry(config.trace_hooks);

    match cli.command {
        Command::Scan { path } => {
            let path = AssetPath::new(path);
            let (asset, report) = commands::scan(&store, &path)?;
            println!("{} ({}, id {})", asset.path, asset.kind, asset.id);
            println!("  pinned: {}", report.pinned);
            for category in DocumentCategory::SCAN_ORDER {
                let paths = report.documents.bucket(category);
                println!("  {category}: {}", paths.len());
                for referencing in paths {
                    println!("    {referencing}");
                }
            }
        }
        Command::Import { path } => {
            let path = AssetPath::new(path);
            let (asset, dispatched) = commands::import(&mut store, &hooks, &path)?;
            println!("{} imported as {} ({})", asset.path, asset.id, asset.kind);
            tracing::debug!(
                invoked = dispatched.invoked,
                failed = dispatched.failed,
                "Import hooks ran"
            );
        }
        Command::Delete { path } => {
            let path = AssetPath::new(path);

            // --- Shutdown signal ---
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received Ctrl+C, stopping");
                    on_signal.cancel();
                }
            });

            let mut confirmation = PolicyConfirmation::stdio(config.confirm);
            let result =
                commands::delete(&mut store, &config, &hooks, &mut confirmation, &path, cancel)
                    .await?;
            match result {
                DeleteResult::Deleted { attempts } => {
                    println!("{path} deleted");
                    tracing::info!(path = %path, attempts, "Asset deleted");
                }
                DeleteResult::CleanedUp { .. } => {
                    println!("{path} references cleaned; run delete again to remove it");
                }
            }
        }
    }

    Ok(())
}
