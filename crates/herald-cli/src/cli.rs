//! コマンドライン引数
//!
//! 値の優先順位: 引数 → 環境変数 → 既定値

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use herald_core::domain::competition::DEFAULT_COMPETITION_ID;

/// Ledger network used when `--netuid` is not given.
pub const DEFAULT_NETUID: u16 = 11;

#[derive(Debug, Parser)]
#[command(name = "herald")]
#[command(about = "Publish a locally trained model and advertise it on the ledger", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate, upload and commit a model directory
    Publish(PublishArgs),

    /// Generate a new signing key
    Keygen {
        /// Where to write the hex-encoded seed (must not exist)
        #[arg(long)]
        out: PathBuf,
    },

    /// Register the signer with the development ledger
    Register(LedgerArgs),
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Store repository id, e.g. jdoe/finetuned
    #[arg(long, required_unless_present = "list_competitions")]
    pub repo: Option<String>,

    /// Directory holding the model files
    #[arg(long, required_unless_present = "list_competitions")]
    pub model_dir: Option<PathBuf>,

    /// Competition to publish for (see --list-competitions)
    #[arg(long, default_value = DEFAULT_COMPETITION_ID)]
    pub competition: String,

    /// Competition schedule file (JSON); the built-in schedule is used otherwise
    #[arg(long, env = "HERALD_COMPETITIONS")]
    pub competitions: Option<PathBuf>,

    /// Print the known competitions and exit
    #[arg(long)]
    pub list_competitions: bool,

    /// Root directory of the artifact store
    #[arg(long, env = "HERALD_STORE_ROOT", default_value = ".herald/store")]
    pub store_root: PathBuf,

    /// Store access token
    #[arg(long, env = "HERALD_STORE_TOKEN", hide_env_values = true)]
    pub store_token: Option<String>,

    /// Seconds to wait between visibility/commit attempts
    #[arg(long, default_value_t = 120)]
    pub backoff_secs: u64,

    /// Give up after this many visibility/commit attempts (unbounded by default)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    #[command(flatten)]
    pub ledger: LedgerArgs,
}

#[derive(Debug, Args)]
pub struct LedgerArgs {
    /// Ledger network id
    #[arg(long, env = "HERALD_NETUID", default_value_t = DEFAULT_NETUID)]
    pub netuid: u16,

    /// Root directory of the development ledger
    #[arg(long, env = "HERALD_LEDGER_ROOT", default_value = ".herald/ledger")]
    pub ledger_root: PathBuf,

    /// Signing key written by `herald keygen`
    #[arg(long, env = "HERALD_KEY_FILE", default_value = ".herald/signer.key")]
    pub key_file: PathBuf,
}
