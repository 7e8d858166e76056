// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! One-shot front end: runs the configured checks for a single image
//! against file-backed evidence and prints the report as JSON.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use voucher::{
    checks::{CheckName, Providers},
    providers::{OfflineMetadataClient, OfflineRepositoryClient},
    CheckEngine, ImageReference, KeyRing, VoucherConfig,
};

#[derive(Parser)]
#[command(name = "voucher-oneshot")]
#[command(bin_name = "voucher-oneshot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Operation,

    /// Voucher's config path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Operation {
    /// Run checks against an image and attest the passing ones
    Check(CheckArgs),

    /// Verify the attestations already recorded for an image
    Verify(VerifyArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Digest-pinned image reference
    #[arg(short, long)]
    image: String,

    /// Only run the named check. May be repeated; defaults to every
    /// enabled check
    #[arg(long = "check")]
    checks: Vec<String>,
}

#[derive(Args)]
struct VerifyArgs {
    /// Digest-pinned image reference
    #[arg(short, long)]
    image: String,
}

async fn metadata_client(config: &VoucherConfig) -> Result<Arc<OfflineMetadataClient>> {
    let path = config
        .offline
        .metadata_path
        .as_deref()
        .context("no metadata source configured, set `offline.metadata_path`")?;
    let client = OfflineMetadataClient::from_file(path).await?;

    if let Some(path) = config.offline.attestations_path.as_deref() {
        if Path::new(path).exists() {
            client.load_attestations(path).await?;
        }
    }

    Ok(Arc::new(client))
}

async fn keyring(config: &VoucherConfig) -> Result<KeyRing> {
    match config.keyring_path.as_deref() {
        Some(path) => KeyRing::load(path)
            .await
            .with_context(|| format!("load keyring from {path}")),
        None => {
            warn!("No keyring configured, attestations can not be signed.");
            Ok(KeyRing::default())
        }
    }
}

// Built-in check names are matched case-insensitively, as in the config
// file. Anything else is passed through for the engine to refuse.
fn canonical(name: &str) -> String {
    CheckName::try_from(name)
        .map(|name| name.to_string())
        .unwrap_or_else(|_| name.to_string())
}

fn cancel_on_interrupt(cancel: CancellationToken) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("SIGINT received, cancelling checks."),
            _ = terminate.recv() => info!("SIGTERM received, cancelling checks."),
        }
        cancel.cancel();
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    let config = VoucherConfig::new(cli.config)?;
    let metadata = metadata_client(&config).await?;
    let mut providers = Providers::new(metadata.clone());
    if let Some(path) = config.offline.repository_path.as_deref() {
        let repository = OfflineRepositoryClient::from_file(path).await?;
        providers = providers.with_repository(Arc::new(repository));
    }

    let keyring = keyring(&config).await?;
    let engine = CheckEngine::from_config(&config, providers, Arc::new(keyring))?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone())?;

    let report = match cli.operation {
        Operation::Check(args) => {
            let image = ImageReference::parse(&args.image)?;
            let report = if args.checks.is_empty() {
                engine.run(&image, &cancel).await
            } else {
                let names: Vec<String> = args.checks.iter().map(|name| canonical(name)).collect();
                engine.run_checks(&image, &names, &cancel).await?
            };

            if let Some(path) = config.offline.attestations_path.as_deref() {
                metadata.save_attestations(path).await?;
            }
            report
        }
        Operation::Verify(args) => {
            let image = ImageReference::parse(&args.image)?;
            engine.verify(&image, &cancel).await?
        }
    };
    engine.close().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        std::process::exit(1);
    }

    Ok(())
}
