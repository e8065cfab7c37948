//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// llmroute - Route LLM requests across providers and keep the credit ledger.
#[derive(Parser, Debug)]
#[command(name = "llmroute")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file (overrides LLMROUTE_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Provider catalog TOML file (overrides LLMROUTE_CATALOG)
    #[arg(long, value_name = "PATH", global = true)]
    pub catalog: Option<PathBuf>,

    /// Ledger journal database
    #[arg(long, value_name = "PATH", global = true)]
    pub journal: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List providers and models in the active catalog
    Catalog(CatalogArgs),

    /// Pick a provider and model for a request
    Route(RouteArgs),

    /// Inspect and mutate the credit ledger
    #[command(subcommand)]
    Ledger(LedgerCommand),

    /// Show the resolved configuration and where each value came from
    Config,
}

/// Arguments for the `catalog` command.
#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Only show providers available to this tier
    #[arg(long, value_name = "TIER")]
    pub tier: Option<String>,

    /// Write the active catalog to a TOML file instead of printing it
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}

/// Arguments for the `route` command.
#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Account the request is billed to
    #[arg(long, value_name = "ID")]
    pub account: String,

    /// Task type (chat, code, analysis, creative, rag)
    #[arg(long, default_value = "chat")]
    pub task: String,

    /// Estimated total tokens (prompt + completion)
    #[arg(long, default_value = "1000")]
    pub tokens: u32,

    /// Account tier (free, starter, pro, enterprise)
    #[arg(long, default_value = "free")]
    pub tier: String,

    /// Credits remaining when the account has no ledger entry
    #[arg(long, value_name = "AMOUNT")]
    pub credits: Option<String>,

    /// Latency requirement (instant, fast, normal, slow)
    #[arg(long, default_value = "normal")]
    pub latency: String,

    /// Quality requirement (basic, good, best)
    #[arg(long, default_value = "good")]
    pub quality: String,

    /// Power level (eco, balanced, precision)
    #[arg(long, default_value = "balanced")]
    pub power: String,

    /// Only route to providers that keep data local
    #[arg(long)]
    pub privacy: bool,

    /// Provider the account holds its own key for (repeatable)
    #[arg(long, value_name = "PROVIDER")]
    pub byok: Vec<String>,
}

/// Ledger subcommands.
#[derive(Subcommand, Debug)]
pub enum LedgerCommand {
    /// Add credits to an account
    Credit {
        /// Account id
        account: String,
        /// Amount in credits (negative only for adjustments)
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Credit kind (purchase, refund, bonus, adjustment)
        #[arg(long, default_value = "purchase")]
        kind: String,
        /// Free-form note stored with the transaction
        #[arg(long)]
        note: Option<String>,
    },

    /// Remove credits from an account
    Debit {
        /// Account id
        account: String,
        /// Amount in credits
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Free-form note stored with the transaction
        #[arg(long)]
        note: Option<String>,
    },

    /// Show an account's balance and monthly cap
    Balance {
        /// Account id; all accounts when omitted
        account: Option<String>,
    },

    /// Show an account's transactions, newest first
    History {
        /// Account id
        account: String,
        /// Maximum rows to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Also show refused debits
        #[arg(long)]
        rejected: bool,
    },

    /// Set or clear an account's monthly spending cap
    Cap {
        /// Account id
        account: String,
        /// Cap in credits
        #[arg(conflicts_with = "clear", required_unless_present = "clear")]
        amount: Option<String>,
        /// Remove the cap
        #[arg(long)]
        clear: bool,
    },
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}
