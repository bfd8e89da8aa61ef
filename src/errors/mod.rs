/// Structured error handling for tradeguard
///
/// Every error that crosses a component boundary is a tagged enum. Callers
/// pattern-match on the variant, or on [`ErrorClass`] when they only need to
/// know whether to retry, abort, or treat the failure as a closed gate.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// CLASSIFICATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; the same operation may succeed if repeated
    Retryable,
    /// Terminal for this operation; surface to the caller
    Fatal,
    /// A safety gate refused the operation; needs an explicit operator action
    GateBlocked,
}

/// Which shared gate refused a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    CapitalLock,
    OpsPaused,
    DrpNotReady,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::CapitalLock => "capital_lock",
            GateReason::OpsPaused => "ops_paused",
            GateReason::DrpNotReady => "drp_not_ready",
        }
    }
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CHAIN / NETWORK
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("cannot decode transaction: {0}")]
    Decode(String),
}

impl ChainError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::Transport(_) | ChainError::Timeout(_) => ErrorClass::Retryable,
            // Node-side rejections (e.g. "nonce too low") are surfaced as-is;
            // the builder still retries them as send attempts.
            ChainError::Rpc { .. } => ErrorClass::Retryable,
            ChainError::MalformedResponse(_) | ChainError::Decode(_) => ErrorClass::Fatal,
        }
    }
}

// =============================================================================
// NONCE MANAGEMENT
// =============================================================================

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("nonce drift detected for {address}: cached next {cached}, chain reports {on_chain}")]
    DriftDetected {
        address: String,
        cached: u64,
        on_chain: u64,
    },

    #[error("nonce space exhausted for {address}")]
    Exhausted { address: String },

    #[error("on-chain nonce query failed for {address}: {source}")]
    Chain {
        address: String,
        #[source]
        source: ChainError,
    },

    #[error("nonce cache io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid nonce snapshot {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl NonceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            NonceError::Chain { source, .. } => source.class(),
            _ => ErrorClass::Fatal,
        }
    }
}

// =============================================================================
// TRANSACTION DISPATCH
// =============================================================================

#[derive(Debug, Error)]
pub enum TxError {
    #[error("kill switch active")]
    KillSwitchActive,

    #[error("gate blocked: {0}")]
    GateBlocked(GateReason),

    #[error("gas estimation failed: {0}")]
    GasEstimationFailed(#[source] ChainError),

    #[error("send failed after {attempts} attempts: {last}")]
    SendFailed {
        attempts: u32,
        #[source]
        last: ChainError,
    },

    #[error(transparent)]
    Nonce(#[from] NonceError),
}

impl TxError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TxError::KillSwitchActive | TxError::GateBlocked(_) => ErrorClass::GateBlocked,
            TxError::GasEstimationFailed(_) | TxError::SendFailed { .. } => ErrorClass::Fatal,
            TxError::Nonce(e) => e.class(),
        }
    }

    /// High-severity aborts get an outbound alert in addition to the log entry
    pub fn is_high_severity(&self) -> bool {
        !matches!(self, TxError::GasEstimationFailed(_))
    }
}

// =============================================================================
// DISASTER RECOVERY
// =============================================================================

#[derive(Debug, Error)]
pub enum DrpError {
    #[error("DRP export failed: {0}")]
    ExportFailed(String),

    #[error("DRP archive invalid: member '{member}' {reason}")]
    ArchiveInvalid { member: String, reason: String },

    #[error("no DRP archive found in {}", .0.display())]
    NoArchive(PathBuf),

    #[error("DRP procedure timed out after {0}s")]
    Timeout(u64),

    #[error("DRP procedure failed: {0}")]
    ProcedureFailed(String),

    #[error("DRP encryption error: {0}")]
    Crypto(String),

    #[error("DRP io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DrpError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> DrpError {
        let path = path.into();
        move |source| DrpError::Io { path, source }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DrpError::Timeout(_) => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config already initialized")]
    AlreadyInitialized,

    #[error("config not initialized")]
    NotInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_errors_classified_as_gate_blocked() {
        assert_eq!(TxError::KillSwitchActive.class(), ErrorClass::GateBlocked);
        assert_eq!(
            TxError::GateBlocked(GateReason::DrpNotReady).class(),
            ErrorClass::GateBlocked
        );
    }

    #[test]
    fn test_send_failed_is_fatal_once_retries_exhausted() {
        let err = TxError::SendFailed {
            attempts: 3,
            last: ChainError::Transport("connection reset".to_string()),
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_nonce_drift_is_fatal() {
        let err = TxError::from(NonceError::DriftDetected {
            address: "0xabc".to_string(),
            cached: 4,
            on_chain: 7,
        });
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_gate_reason_wire_names() {
        assert_eq!(GateReason::CapitalLock.to_string(), "capital_lock");
        assert_eq!(
            serde_json::to_string(&GateReason::OpsPaused).unwrap(),
            "\"ops_paused\""
        );
    }
}
