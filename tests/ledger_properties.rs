use proptest::prelude::*;
use spv_wallet_sync::config::LedgerConfig;
use spv_wallet_sync::ledger::{BalanceType, DiscardEvents, Ledger, SeedAccount, SubAccount};
use spv_wallet_sync::types::{
    Address, Asset, OutPoint, Transaction, TransactionInput, TransactionOutput, TxPayload, Uint168,
    Uint256,
};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Receive {
        address: u32,
        amount: u64,
        height: Option<u32>,
    },
    Spend {
        pick: usize,
        to_self: bool,
        height: Option<u32>,
    },
    Confirm {
        pick: usize,
        height: u32,
    },
    Remove {
        pick: usize,
    },
    ChainHeight(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u32..6, 1_000u64..2_000_000, proptest::option::of(1u32..60))
            .prop_map(|(address, amount, height)| Op::Receive { address, amount, height }),
        2 => (any::<usize>(), any::<bool>(), proptest::option::of(1u32..60))
            .prop_map(|(pick, to_self, height)| Op::Spend { pick, to_self, height }),
        1 => (any::<usize>(), 1u32..60).prop_map(|(pick, height)| Op::Confirm { pick, height }),
        1 => any::<usize>().prop_map(|pick| Op::Remove { pick }),
        1 => (0u32..80).prop_map(Op::ChainHeight),
    ]
}

fn stranger() -> Address {
    Uint168::with_prefix(0x21, &[0x77; 20])
}

struct World {
    ledger: Ledger,
    account: SeedAccount,
    nonce: u32,
}

impl World {
    fn new() -> Self {
        let account = SeedAccount::new([9; 32]);
        let ledger = Ledger::new(
            "ELA",
            Arc::new(account.clone()),
            LedgerConfig::default(),
            Arc::new(DiscardEvents),
        );
        Self {
            ledger,
            account,
            nonce: 0,
        }
    }

    fn fresh_outpoint(&mut self) -> TransactionInput {
        self.nonce += 1;
        let mut bytes = [0xabu8; 32];
        bytes[..4].copy_from_slice(&self.nonce.to_le_bytes());
        TransactionInput::new(Uint256(bytes), 0)
    }

    fn apply(&mut self, op: &Op) {
        let native = Asset::native_id();
        match op {
            Op::Receive {
                address,
                amount,
                height,
            } => {
                let to = self.account.derive_address(false, *address);
                let input = self.fresh_outpoint();
                let mut tx = Transaction::new(
                    TxPayload::TransferAsset,
                    vec![input],
                    vec![TransactionOutput::new(native, *amount, to)],
                    0,
                    "",
                );
                if let Some(h) = height {
                    tx = tx.with_block(*h, u64::from(*h));
                }
                self.ledger.register_transaction(tx);
            }
            Op::Spend {
                pick,
                to_self,
                height,
            } => {
                let utxos = self.ledger.get_all_utxo();
                if utxos.is_empty() {
                    return;
                }
                let utxo = &utxos[pick % utxos.len()];
                let to = if *to_self {
                    self.account.derive_address(true, 0)
                } else {
                    stranger()
                };
                let mut tx = Transaction::new(
                    TxPayload::TransferAsset,
                    vec![TransactionInput::new(utxo.outpoint.tx_hash, utxo.outpoint.index)],
                    vec![TransactionOutput::new(native, (utxo.amount / 2).max(1), to)],
                    0,
                    "",
                );
                if let Some(h) = height {
                    tx = tx.with_block(*h, u64::from(*h));
                }
                self.ledger.register_transaction(tx);
            }
            Op::Confirm { pick, height } => {
                let txs = self.ledger.get_all_transactions();
                if txs.is_empty() {
                    return;
                }
                let hash = txs[pick % txs.len()].hash();
                self.ledger.update_transactions(&[hash], *height, u64::from(*height));
            }
            Op::Remove { pick } => {
                let txs = self.ledger.get_all_transactions();
                if txs.is_empty() {
                    return;
                }
                let hash = txs[pick % txs.len()].hash();
                self.ledger.remove_transaction(&hash);
            }
            Op::ChainHeight(h) => self.ledger.set_block_height(*h),
        }
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let native = Asset::native_id();
        let height = self.ledger.block_height();
        let utxos = self.ledger.get_all_utxo();

        let confirmed: u128 = utxos
            .iter()
            .filter(|u| u.asset_id == native && u.is_confirmed_at(height))
            .map(|u| u128::from(u.amount))
            .sum();
        let all: u128 = utxos.iter().map(|u| u128::from(u.amount)).sum();
        prop_assert_eq!(self.ledger.get_balance(&native, BalanceType::Confirmed), confirmed);
        prop_assert_eq!(self.ledger.get_balance(&native, BalanceType::Total), all);

        let partitions = self.ledger.utxo_partitions();
        let mut seen: HashSet<OutPoint> = HashSet::new();
        for utxo in partitions
            .unspent
            .iter()
            .chain(&partitions.spending)
            .chain(&partitions.spent)
        {
            prop_assert!(seen.insert(utxo.outpoint), "{:?} is in two partitions", utxo.outpoint);
        }
        Ok(())
    }
}

proptest! {
    #[test]
    fn confirmed_balance_matches_confirmed_outputs(ops in proptest::collection::vec(op(), 1..40)) {
        let mut world = World::new();
        for op in &ops {
            world.apply(op);
            world.check()?;
        }
    }

    #[test]
    fn registering_twice_changes_nothing(ops in proptest::collection::vec(op(), 1..30)) {
        let mut world = World::new();
        for op in &ops {
            world.apply(op);
        }
        let native = Asset::native_id();
        let before = (
            world.ledger.get_all_transactions(),
            world.ledger.get_balance(&native, BalanceType::Total),
        );
        for tx in before.0.clone() {
            prop_assert!(!world.ledger.register_transaction(tx));
        }
        let after = (
            world.ledger.get_all_transactions(),
            world.ledger.get_balance(&native, BalanceType::Total),
        );
        prop_assert_eq!(before, after);
    }
}
