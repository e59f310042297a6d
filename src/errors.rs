use thiserror::Error;

/// Errors surfaced by the on-chain driver after its retry budget is spent.
///
/// The chain adapter retries transient RPC failures internally; by the time
/// a `ChainError` reaches the engine it is final for the current operation.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    /// RPC failure, timeout, or nonce mismatch that outlived the adapter's
    /// retry budget.
    #[error("Transient chain error: {0}")]
    Transient(String),

    /// On-chain revert (slippage, balance too low, range collision).
    /// Terminal for the current transaction. `tx_hashes` carries the hashes
    /// of any sub-transactions that landed before the failure.
    #[error("Revert: {reason}")]
    Revert {
        reason: String,
        tx_hashes: Vec<String>,
    },

    /// The transaction succeeded but the expected log is absent.
    /// The caller cannot know the actual outcome, so this is treated as a
    /// revert for safety.
    #[error("Expected event {event} missing from receipt of {tx_hash}")]
    EventMissing { event: String, tx_hash: String },

    /// Generic RPC-level error (malformed response, unknown method).
    #[error("RPC error: {0}")]
    Rpc(String),
}

impl ChainError {
    pub fn revert(reason: impl Into<String>) -> Self {
        ChainError::Revert {
            reason: reason.into(),
            tx_hashes: Vec::new(),
        }
    }
}

/// Band-layout computation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// Fee tier has no known tick spacing.
    #[error("Unknown fee tier: {0}")]
    UnknownFeeTier(u32),

    /// Width percent must be positive and finite.
    #[error("Invalid range width: {0}%")]
    InvalidWidth(f64),

    /// Clamping to the global tick bounds collapsed a band.
    #[error("Band {index} collapsed after clamping: [{lower}, {upper})")]
    CollapsedBand { index: usize, lower: i32, upper: i32 },
}

/// Band-ledger invariant violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Expected {expected} bands, got {got}")]
    WrongBandCount { expected: usize, got: usize },

    #[error("Bands {left} and {right} are not contiguous")]
    NotContiguous { left: usize, right: usize },

    #[error("Band {index} has width {width}, expected {expected}")]
    WrongWidth {
        index: usize,
        width: i32,
        expected: i32,
    },

    #[error("Band with token id {0} not found")]
    UnknownTokenId(String),

    #[error("Duplicate token id {0}")]
    DuplicateTokenId(String),
}

/// Durable-state write failures, used by the fail-fast persistence path.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Top-level engine error. Everything a keeper operation can fail with.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The engine is in a terminal state and refuses further work.
    #[error("Engine halted in state {0}")]
    Halted(&'static str),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_display() {
        let e = ChainError::Revert {
            reason: "STF".to_string(),
            tx_hashes: vec!["0xabc".to_string()],
        };
        assert_eq!(e.to_string(), "Revert: STF");

        let e = ChainError::EventMissing {
            event: "IncreaseLiquidity".to_string(),
            tx_hash: "0xdef".to_string(),
        };
        assert!(e.to_string().contains("IncreaseLiquidity"));
    }

    #[test]
    fn test_engine_error_from_layers() {
        let e: EngineError = LayoutError::UnknownFeeTier(123).into();
        assert!(matches!(e, EngineError::Layout(_)));

        let e: EngineError = ChainError::revert("slippage").into();
        assert!(matches!(e, EngineError::Chain(_)));
    }

    #[test]
    fn test_halted_display_names_the_state() {
        let e = EngineError::Halted("Stopped");
        assert_eq!(e.to_string(), "Engine halted in state Stopped");
    }
}
