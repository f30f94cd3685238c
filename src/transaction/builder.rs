//! Transaction builder
//!
//! Collects outputs, memo and remark for an unsigned transaction and hands them to the ledger's
//! coin selection. The result reserves its inputs until it is published or released.

use crate::ledger::{Ledger, LedgerError};
use crate::types::{Address, OutputType, Transaction, TransactionOutput, Uint256};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionError {
    #[error("Transaction validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("{0} is not supported by this sub-wallet")]
    Unsupported(String),
}

impl From<LedgerError> for TransactionError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { .. } => {
                TransactionError::InsufficientBalance(e.to_string())
            }
            other => TransactionError::ValidationError(other.to_string()),
        }
    }
}

/// Builder for unsigned transactions spending from one ledger
pub struct TransactionBuilder {
    ledger: Arc<Ledger>,
    from: Option<Address>,
    outputs: Vec<TransactionOutput>,
    memo: String,
    remark: String,
    use_voted_utxo: bool,
    auto_reduce_output_amount: bool,
    voting_allowed: bool,
}

impl TransactionBuilder {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            from: None,
            outputs: Vec::new(),
            memo: String::new(),
            remark: String::new(),
            use_voted_utxo: false,
            auto_reduce_output_amount: false,
            voting_allowed: true,
        }
    }

    /// Only spend outputs held by `address`. Change also goes back to it.
    pub fn from_address(mut self, address: Address) -> Self {
        self.from = Some(address);
        self
    }

    /// Pay `amount` of the native asset to `address`.
    pub fn pay_to(self, address: Address, amount: u64) -> Self {
        let asset_id = self.ledger.native_asset_id();
        self.pay_asset(asset_id, address, amount)
    }

    pub fn pay_asset(mut self, asset_id: Uint256, address: Address, amount: u64) -> Self {
        self.outputs.push(TransactionOutput::new(asset_id, amount, address));
        self
    }

    /// Lock `amount` of the native asset as a vote output at `address`.
    pub fn vote(mut self, address: Address, amount: u64) -> Self {
        let mut output = TransactionOutput::new(self.ledger.native_asset_id(), amount, address);
        output.output_type = OutputType::Vote;
        self.outputs.push(output);
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    /// Local note kept with the transaction once it is published. Not part of the hash.
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    pub fn use_voted_utxo(mut self, use_voted_utxo: bool) -> Self {
        self.use_voted_utxo = use_voted_utxo;
        self
    }

    /// When the balance cannot cover outputs plus fee, shrink the last output instead of failing.
    pub fn auto_reduce_output_amount(mut self, auto_reduce: bool) -> Self {
        self.auto_reduce_output_amount = auto_reduce;
        self
    }

    pub(crate) fn voting_allowed(mut self, allowed: bool) -> Self {
        self.voting_allowed = allowed;
        self
    }

    /// Select inputs, add change and fee, and return the unsigned transaction.
    pub fn build(self) -> Result<Transaction, TransactionError> {
        let votes = self
            .outputs
            .iter()
            .any(|o| o.output_type == OutputType::Vote);
        if !self.voting_allowed && (votes || self.use_voted_utxo) {
            return Err(TransactionError::Unsupported("Voting".to_string()));
        }

        debug!(
            "Building transaction with {} outputs on {}",
            self.outputs.len(),
            self.ledger.chain_id()
        );
        let mut tx = self.ledger.create_transaction(
            self.from.as_ref(),
            self.outputs,
            &self.memo,
            self.use_voted_utxo,
            self.auto_reduce_output_amount,
        )?;
        if !self.remark.is_empty() {
            tx.set_remark(self.remark);
        }
        info!(
            "Built transaction {} spending {} inputs",
            tx.hash(),
            tx.inputs().len()
        );
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::ledger::{DiscardEvents, SeedAccount};
    use crate::types::{Asset, TransactionInput, TxPayload, Uint168};

    fn funded_ledger(amount: u64) -> Arc<Ledger> {
        let ledger = Arc::new(Ledger::new(
            "ELA",
            Arc::new(SeedAccount::new([5; 32])),
            LedgerConfig::default(),
            Arc::new(DiscardEvents),
        ));
        let to = ledger.get_receive_address();
        let funding = Transaction::new(
            TxPayload::TransferAsset,
            vec![TransactionInput::new(Uint256([0xee; 32]), 0)],
            vec![TransactionOutput::new(Asset::native_id(), amount, to)],
            0,
            "",
        )
        .with_block(10, 1_700_000_000);
        ledger.set_block_height(20);
        assert!(ledger.register_transaction(funding));
        ledger
    }

    fn stranger() -> Address {
        Uint168::with_prefix(0x21, &[0x42; 20])
    }

    #[test]
    fn builds_and_keeps_the_remark() {
        let ledger = funded_ledger(1_000_000);
        let tx = TransactionBuilder::new(ledger.clone())
            .pay_to(stranger(), 100_000)
            .with_memo("invoice 7")
            .with_remark("coffee")
            .build()
            .expect("build");
        assert_eq!(tx.memo(), "invoice 7");
        assert_eq!(tx.remark(), "coffee");
        assert_eq!(tx.outputs()[0].amount, 100_000);
        assert_eq!(ledger.release_transaction(&tx), tx.inputs().len());
    }

    #[test]
    fn shortfalls_map_to_insufficient_balance() {
        let ledger = funded_ledger(50_000);
        let err = TransactionBuilder::new(ledger)
            .pay_to(stranger(), 100_000)
            .build()
            .unwrap_err();
        assert!(matches!(err, TransactionError::InsufficientBalance(_)));
    }

    #[test]
    fn voting_needs_a_voting_wallet() {
        let ledger = funded_ledger(1_000_000);
        let err = TransactionBuilder::new(ledger.clone())
            .voting_allowed(false)
            .vote(stranger(), 10_000)
            .build()
            .unwrap_err();
        assert_eq!(err, TransactionError::Unsupported("Voting".to_string()));

        let err = TransactionBuilder::new(ledger)
            .build()
            .unwrap_err();
        assert!(matches!(err, TransactionError::ValidationError(_)));
    }
}
