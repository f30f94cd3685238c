//! Fee arithmetic and greedy coin selection.

use crate::ledger::LedgerError;
use crate::ledger::utxo::Utxo;

/// Standard fee per started kilobyte of transaction size.
pub const TX_FEE_PER_KB: u64 = 1000;
/// Estimated size of a typical output.
pub const TX_OUTPUT_SIZE: usize = 34;
/// Estimated size of a typical compact-pubkey input.
pub const TX_INPUT_SIZE: usize = 148;
/// Fixed overhead of a transaction: version, type, counts and lock time.
pub const TX_BASE_SIZE: usize = 10;
pub const TX_MAX_SIZE: usize = 100_000;
pub const DEFAULT_FEE_PER_KB: u64 = 10_000;
pub const MIN_FEE_PER_KB: u64 = TX_FEE_PER_KB;
pub const MAX_FEE_PER_KB: u64 = (TX_FEE_PER_KB * 1_000_100 + 190) / 191;
/// Smallest output amount the network relays.
pub const TX_MIN_OUTPUT_AMOUNT: u64 =
    TX_FEE_PER_KB * 3 * (TX_OUTPUT_SIZE + TX_INPUT_SIZE) as u64 / 1000;

pub fn estimate_size(inputs: usize, outputs: usize, memo_len: usize) -> usize {
    TX_BASE_SIZE + TX_INPUT_SIZE * inputs + TX_OUTPUT_SIZE * outputs + memo_len
}

/// Fee for `size` bytes, rounded up to the next kilobyte.
pub fn fee_for_size(size: usize, fee_per_kb: u64) -> u64 {
    (size as u64).div_ceil(1000).saturating_mul(fee_per_kb)
}

/// Parameters of one greedy selection pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SelectionRequest {
    /// Amount the selected inputs must cover, before fee.
    pub target: u64,
    /// Whether this pass also has to cover the fee.
    pub pays_fee: bool,
    /// Inputs already chosen by an earlier pass.
    pub prior_inputs: usize,
    /// Outputs of the final transaction, change included.
    pub outputs: usize,
    pub memo_len: usize,
    pub fee_per_kb: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Selection {
    pub inputs: Vec<Utxo>,
    pub total: u64,
    pub fee: u64,
}

impl Selection {
    pub fn required(&self, target: u64) -> u64 {
        target.saturating_add(self.fee)
    }

    pub fn shortfall(&self, target: u64) -> u64 {
        self.required(target).saturating_sub(self.total)
    }
}

impl SelectionRequest {
    fn fee_with(&self, inputs: usize) -> u64 {
        if !self.pays_fee {
            return 0;
        }
        let size = estimate_size(self.prior_inputs + inputs, self.outputs, self.memo_len);
        fee_for_size(size, self.fee_per_kb)
    }
}

/// Accumulate candidates in order until the target (and fee, if this pass pays it) is covered.
///
/// Running out of candidates is not an error here; the caller inspects `shortfall` and decides
/// whether to reduce an output or fail.
pub(crate) fn select_coins(
    candidates: &[Utxo],
    request: &SelectionRequest,
) -> Result<Selection, LedgerError> {
    let mut selection = Selection {
        fee: request.fee_with(0),
        ..Selection::default()
    };
    if request.target == 0 && !request.pays_fee {
        return Ok(selection);
    }

    for utxo in candidates {
        selection.inputs.push(utxo.clone());
        selection.total = selection
            .total
            .checked_add(utxo.amount)
            .ok_or(LedgerError::AmountOverflow)?;

        let size = estimate_size(
            request.prior_inputs + selection.inputs.len(),
            request.outputs,
            request.memo_len,
        );
        if size > TX_MAX_SIZE {
            return Err(LedgerError::TxTooLarge { size });
        }
        selection.fee = request.fee_with(selection.inputs.len());

        if selection.total >= selection.required(request.target) {
            break;
        }
    }

    Ok(selection)
}
