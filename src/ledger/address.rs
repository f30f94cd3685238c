//! Address derivation seams and the gap-limited address chains built on them.

use crate::types::hash::{PREFIX_STANDARD, sha256_160, sha256d};
use crate::types::{Address, Uint256};
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_EXTERNAL_GAP_LIMIT: u32 = 10;
pub const DEFAULT_INTERNAL_GAP_LIMIT: u32 = 5;

/// Derives the receive (external) and change (internal) address chains of one sub-wallet.
///
/// Key material lives behind this trait; the ledger only ever sees program hashes.
pub trait SubAccount: Send + Sync {
    fn derive_address(&self, internal: bool, index: u32) -> Address;
}

/// Hands out the sub-account for a coin index. Implemented by whatever manages keys.
pub trait AccountSource: Send + Sync {
    fn sub_account(&self, coin_index: u32) -> Arc<dyn SubAccount>;
}

/// Watch-only account whose addresses are a hash of a fixed seed.
///
/// Holds no signing keys, so it can only observe. Used by the demo binary and tests.
#[derive(Debug, Clone)]
pub struct SeedAccount {
    seed: [u8; 32],
}

impl SeedAccount {
    pub fn new(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    pub fn from_hex(seed: &str) -> Result<Self, crate::types::CodecError> {
        Ok(Self::new(Uint256::from_hex(seed)?.0))
    }
}

impl SubAccount for SeedAccount {
    fn derive_address(&self, internal: bool, index: u32) -> Address {
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.seed);
        data.push(u8::from(internal));
        data.extend_from_slice(&index.to_le_bytes());
        Address::with_prefix(PREFIX_STANDARD, &sha256_160(&data))
    }
}

impl AccountSource for SeedAccount {
    fn sub_account(&self, coin_index: u32) -> Arc<dyn SubAccount> {
        let mut data = self.seed.to_vec();
        data.extend_from_slice(&coin_index.to_le_bytes());
        Arc::new(SeedAccount::new(sha256d(&data).0))
    }
}

/// External and internal chains derived so far, plus which addresses have been seen in use.
pub(crate) struct AddressChains {
    account: Arc<dyn SubAccount>,
    external: Vec<Address>,
    internal: Vec<Address>,
    used: HashSet<Address>,
    all: HashSet<Address>,
}

impl AddressChains {
    pub fn new(account: Arc<dyn SubAccount>) -> Self {
        Self {
            account,
            external: Vec::new(),
            internal: Vec::new(),
            used: HashSet::new(),
            all: HashSet::new(),
        }
    }

    /// Extend the chain so exactly `gap_limit` unused addresses follow the last used one, and
    /// return them.
    pub fn unused_addresses(&mut self, gap_limit: u32, internal: bool) -> Vec<Address> {
        let chain = if internal {
            &mut self.internal
        } else {
            &mut self.external
        };

        let mut start = chain.len();
        while start > 0 && !self.used.contains(&chain[start - 1]) {
            start -= 1;
        }

        let wanted = start + gap_limit as usize;
        while chain.len() < wanted {
            let index = chain.len() as u32;
            let address = self.account.derive_address(internal, index);
            chain.push(address);
            self.all.insert(address);
        }

        chain[start..wanted].to_vec()
    }

    pub fn mark_used(&mut self, address: &Address) -> bool {
        self.all.contains(address) && self.used.insert(*address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.all.contains(address)
    }

    pub fn is_used(&self, address: &Address) -> bool {
        self.used.contains(address)
    }

    pub fn chain(&self, internal: bool) -> &[Address] {
        if internal { &self.internal } else { &self.external }
    }
}
