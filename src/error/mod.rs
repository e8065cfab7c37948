//! Error types for llmroute.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into eight categories:
//! - **Routing**: no provider could be selected for a request
//! - **Ledger**: debits and credits rejected by the credit ledger
//! - **Catalog**: provider catalog loading and validation
//! - **Health**: provider probes (never surfaced to routing callers)
//! - **Provider**: failures of the abstracted provider call
//! - **Configuration**: config file parsing, validation, or missing values
//! - **Storage**: transaction journal persistence
//! - **Internal**: unexpected errors, bugs, or unclassified issues
//!
//! Each error has a stable error code (e.g., `LLMR-L001`) for programmatic handling.

use rust_decimal::Decimal;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No provider could be selected.
    Routing,
    /// Ledger rejected a balance mutation.
    Ledger,
    /// Catalog refresh or validation failed.
    Catalog,
    /// Health probe failures.
    Health,
    /// Provider call failures.
    Provider,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Journal persistence issues.
    Storage,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Routing => "Routing error",
            Self::Ledger => "Ledger error",
            Self::Catalog => "Catalog error",
            Self::Health => "Health probe error",
            Self::Provider => "Provider error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Routing => "R",
            Self::Ledger => "L",
            Self::Catalog => "K",
            Self::Health => "H",
            Self::Provider => "P",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for the operator CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// No provider could serve the request
    NoProvider = 2,
    /// Config or catalog could not be parsed or validated
    ParseError = 3,
    /// Ledger rejected the operation
    LedgerRejected = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for llmroute operations.
#[derive(Error, Debug)]
pub enum RouterError {
    // ==========================================================================
    // Routing errors (Category: Routing)
    // ==========================================================================
    /// Every candidate pool at every cascade level was empty.
    #[error("no provider available: {reason}")]
    NoProviderAvailable { reason: String },

    // ==========================================================================
    // Ledger errors (Category: Ledger)
    // ==========================================================================
    /// Debit would drive the balance negative.
    #[error("insufficient funds for {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: String,
        requested: Decimal,
        available: Decimal,
    },

    /// Non-positive amount for a kind that requires a positive one.
    #[error("invalid amount {amount} for {kind}")]
    InvalidAmount { amount: Decimal, kind: String },

    /// Debit would exceed the account's monthly spending cap.
    #[error("monthly spending cap {cap} reached for {account}: spent {spent}, requested {requested}")]
    SpendingCapExceeded {
        account: String,
        cap: Decimal,
        spent: Decimal,
        requested: Decimal,
    },

    /// Account has never been credited.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    // ==========================================================================
    // Catalog errors (Category: Catalog)
    // ==========================================================================
    /// Catalog source could not be loaded; the previous snapshot stays active.
    #[error("catalog refresh failed: {reason}")]
    CatalogRefreshFailed { reason: String },

    /// Catalog content violates an invariant.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    // ==========================================================================
    // Health errors (Category: Health)
    // ==========================================================================
    /// A provider probe did not finish within its timeout.
    #[error("probe of {provider} timed out after {timeout_ms}ms")]
    ProviderProbeTimeout { provider: String, timeout_ms: u64 },

    /// A provider probe returned an error.
    #[error("probe of {provider} failed: {message}")]
    ProbeFailed { provider: String, message: String },

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// The abstracted provider call failed.
    #[error("call to {provider}/{model} failed: {message}")]
    ProviderCallFailed {
        provider: String,
        model: String,
        message: String,
    },

    /// The provider call did not return before the caller's timeout.
    #[error("call to {provider}/{model} timed out after {timeout_ms}ms")]
    ProviderCallTimeout {
        provider: String,
        model: String,
        timeout_ms: u64,
    },

    /// Primary and every fallback target failed.
    #[error("all {attempts} route target(s) failed")]
    FallbackExhausted { attempts: usize },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// Journal read or write failed.
    #[error("journal error: {0}")]
    Storage(String),

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RouterError {
    /// Map error to a CLI exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::NoProviderAvailable { .. } | Self::FallbackExhausted { .. } => {
                ExitCode::NoProvider
            }

            Self::Config(_)
            | Self::ConfigInvalid { .. }
            | Self::InvalidCatalog(_)
            | Self::CatalogRefreshFailed { .. } => ExitCode::ParseError,

            Self::InsufficientFunds { .. }
            | Self::InvalidAmount { .. }
            | Self::SpendingCapExceeded { .. }
            | Self::AccountNotFound(_) => ExitCode::LedgerRejected,

            Self::ProviderProbeTimeout { .. }
            | Self::ProbeFailed { .. }
            | Self::ProviderCallFailed { .. }
            | Self::ProviderCallTimeout { .. }
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NoProviderAvailable { .. } => ErrorCategory::Routing,

            Self::InsufficientFunds { .. }
            | Self::InvalidAmount { .. }
            | Self::SpendingCapExceeded { .. }
            | Self::AccountNotFound(_) => ErrorCategory::Ledger,

            Self::CatalogRefreshFailed { .. } | Self::InvalidCatalog(_) => ErrorCategory::Catalog,

            Self::ProviderProbeTimeout { .. } | Self::ProbeFailed { .. } => ErrorCategory::Health,

            Self::ProviderCallFailed { .. }
            | Self::ProviderCallTimeout { .. }
            | Self::FallbackExhausted { .. } => ErrorCategory::Provider,

            Self::Config(_) | Self::ConfigInvalid { .. } => ErrorCategory::Configuration,

            Self::Storage(_) => ErrorCategory::Storage,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `LLMR-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoProviderAvailable { .. } => "LLMR-R001",

            Self::InsufficientFunds { .. } => "LLMR-L001",
            Self::InvalidAmount { .. } => "LLMR-L002",
            Self::SpendingCapExceeded { .. } => "LLMR-L003",
            Self::AccountNotFound(_) => "LLMR-L004",

            Self::CatalogRefreshFailed { .. } => "LLMR-K001",
            Self::InvalidCatalog(_) => "LLMR-K002",

            Self::ProviderProbeTimeout { .. } => "LLMR-H001",
            Self::ProbeFailed { .. } => "LLMR-H002",

            Self::ProviderCallFailed { .. } => "LLMR-P001",
            Self::ProviderCallTimeout { .. } => "LLMR-P002",
            Self::FallbackExhausted { .. } => "LLMR-P010",

            Self::Config(_) => "LLMR-C001",
            Self::ConfigInvalid { .. } => "LLMR-C002",

            Self::Storage(_) => "LLMR-S001",

            Self::Io(_) => "LLMR-X001",
            Self::Json(_) => "LLMR-X002",
            Self::Other(_) => "LLMR-X099",
        }
    }

    /// Returns whether retrying the same operation later may succeed.
    ///
    /// Ledger rejections and routing failures are terminal; provider call
    /// failures and probe failures are transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderCallFailed { .. }
                | Self::ProviderCallTimeout { .. }
                | Self::ProviderProbeTimeout { .. }
                | Self::ProbeFailed { .. }
                | Self::CatalogRefreshFailed { .. }
        )
    }

    /// Returns the provider id if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::ProviderProbeTimeout { provider, .. }
            | Self::ProbeFailed { provider, .. }
            | Self::ProviderCallFailed { provider, .. }
            | Self::ProviderCallTimeout { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Returns the account id if this error concerns a ledger account.
    #[must_use]
    pub fn account(&self) -> Option<&str> {
        match self {
            Self::InsufficientFunds { account, .. }
            | Self::SpendingCapExceeded { account, .. }
            | Self::AccountNotFound(account) => Some(account),
            _ => None,
        }
    }

    /// One-line operator hint for the CLI.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoProviderAvailable { .. } => {
                Some("Check `llmroute catalog` for tier eligibility and provider health.")
            }
            Self::InsufficientFunds { .. } => {
                Some("Top up with `llmroute ledger credit --account <id> --amount <n>`.")
            }
            Self::SpendingCapExceeded { .. } => {
                Some("Raise or clear the cap with `llmroute ledger cap --account <id>`.")
            }
            Self::Config(_) | Self::ConfigInvalid { .. } => {
                Some("Run `llmroute config` to inspect the resolved configuration.")
            }
            _ => None,
        }
    }
}

/// Result type alias for llmroute operations.
pub type Result<T> = std::result::Result<T, RouterError>;

// =============================================================================
// Tests
// =============================================================================
