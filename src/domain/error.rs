//! Domain error types.

use rust_decimal::Decimal;

/// Top-level error type for papertrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("no data found for {symbol}")]
    NoData { symbol: String },

    #[error("invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("no position found for {symbol}")]
    NoPosition { symbol: String },

    #[error("market data provider error: {reason}")]
    Provider { reason: String },

    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    #[error("computation error: {reason}")]
    Computation { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        TraderError::InvalidParameters {
            reason: reason.into(),
        }
    }

    pub fn provider(reason: impl Into<String>) -> Self {
        TraderError::Provider {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        TraderError::Persistence {
            reason: reason.into(),
        }
    }

    /// Process exit status reported by the CLI for this error.
    pub fn exit_status(&self) -> u8 {
        match self {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Persistence { .. } => 3,
            TraderError::InvalidParameters { .. }
            | TraderError::InsufficientFunds { .. }
            | TraderError::InsufficientShares { .. }
            | TraderError::NoPosition { .. } => 4,
            TraderError::NoData { .. } => 5,
            TraderError::Provider { .. } | TraderError::Computation { .. } => 6,
        }
    }

    /// True for errors caused by the request itself rather than a collaborator.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TraderError::InvalidParameters { .. }
                | TraderError::InsufficientFunds { .. }
                | TraderError::InsufficientShares { .. }
                | TraderError::NoPosition { .. }
        )
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
