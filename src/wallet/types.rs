use crate::gateway::GatewayError;
use crate::ledger::LedgerError;
use crate::types::CodecError;
use crate::wallet::sync::repositories::StoreError;

/// Error types for the sync orchestrator
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
    #[error("Gateway error: {0}")]
    GatewayError(#[from] GatewayError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    #[error("Transaction parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Sync error: {0}")]
    SyncError(String),
}
