//! herald - モデル公開 CLI
//!
//! 終了コード: 0 成功 / 1 失敗 / 130 中断（Ctrl-C）

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use herald_core::impls::{
    DEFAULT_MIN_WRITE_INTERVAL, Ed25519Signer, FileLedger, FileLedgerConfig, LocalArtifactStore,
    LocalStoreConfig,
};
use herald_core::ports::{Clock, Signer, SystemClock};
use herald_core::{
    CompetitionSchedule, ModelArtifactDescriptor, ModelIdentity, PublishError, PublishRequest,
    Publisher, RetryPolicy,
};

use cli::{Cli, Commands, LedgerArgs, PublishArgs};

const EXIT_CANCELLED: u8 = 130;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Publish(args) => run_publish(args).await,
        Commands::Keygen { out } => run_keygen(&out),
        Commands::Register(args) => run_register(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if matches!(e.downcast_ref::<PublishError>(), Some(PublishError::Cancelled(_))) => {
            warn!("{e:#}");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_publish(args: PublishArgs) -> Result<()> {
    let schedule = match &args.competitions {
        Some(path) => CompetitionSchedule::from_json_file(path)
            .with_context(|| format!("loading competitions from {}", path.display()))?,
        None => CompetitionSchedule::builtin(),
    };

    if args.list_competitions {
        for c in schedule.iter() {
            println!("{}\t{}\t{}", c.competition_id, c.max_model_bytes, c.description);
        }
        return Ok(());
    }

    // clap が required_unless_present で保証している
    let repo = args.repo.context("--repo is required")?;
    let model_dir = args.model_dir.context("--model-dir is required")?;

    let parameters = schedule.get(&args.competition)?.clone();
    let identity = ModelIdentity::from_repo_id(&repo, &args.competition)?;

    let signer = Arc::new(
        Ed25519Signer::from_key_file(&args.ledger.key_file)
            .with_context(|| format!("loading key from {}", args.ledger.key_file.display()))?,
    );
    let store = Arc::new(
        LocalArtifactStore::new(LocalStoreConfig {
            root: args.store_root,
            access_token: args.store_token.unwrap_or_default(),
        })
        .context("HERALD_STORE_TOKEN must be set")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(open_ledger(&args.ledger, clock.clone())?);

    let mut retry = RetryPolicy::fixed(Duration::from_secs(args.backoff_secs));
    if let Some(n) = args.max_attempts {
        retry = retry.with_max_attempts(n);
    }
    let publisher = Publisher::new(store, ledger, signer, clock).with_retry_policy(retry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling publication");
            let _ = shutdown_tx.send(true);
        }
    });

    let request = PublishRequest {
        descriptor: ModelArtifactDescriptor::new(identity, model_dir),
        parameters,
    };
    let receipt = publisher
        .publish(request, shutdown_rx)
        .await
        .with_context(|| format!("publishing {repo}"))?;

    let summary = serde_json::json!({
        "repo": receipt.reference.identity().repo_id(),
        "record": receipt.record,
        "signer": receipt.signer,
        "sequence": receipt.receipt.sequence,
        "committedAt": receipt.receipt.committed_at,
        "attempts": receipt.attempts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_keygen(out: &std::path::Path) -> Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let signer = Ed25519Signer::generate();
    signer
        .write_key_file(out)
        .with_context(|| format!("writing key to {}", out.display()))?;
    info!(path = %out.display(), "wrote signing key");
    println!("{}", signer.address());
    Ok(())
}

fn run_register(args: &LedgerArgs) -> Result<()> {
    let signer = Ed25519Signer::from_key_file(&args.key_file)
        .with_context(|| format!("loading key from {}", args.key_file.display()))?;
    let ledger = open_ledger(args, Arc::new(SystemClock))?;
    let address = signer.address();
    if ledger.register(address.clone())? {
        info!(signer = %address, netuid = args.netuid, "registered signer");
    } else {
        info!(signer = %address, netuid = args.netuid, "signer already registered");
    }
    Ok(())
}

fn open_ledger(args: &LedgerArgs, clock: Arc<dyn Clock>) -> Result<FileLedger> {
    let config = FileLedgerConfig {
        root: args.ledger_root.clone(),
        netuid: args.netuid,
        min_write_interval: DEFAULT_MIN_WRITE_INTERVAL,
    };
    FileLedger::open(config, clock)
        .with_context(|| format!("opening ledger under {}", args.ledger_root.display()))
}
