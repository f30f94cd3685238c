//! Registry of sub-wallets keyed by chain id.
//!
//! Sub-wallets are created and destroyed explicitly. Creating one opens its ledger from the
//! store and starts its orchestrator; destroying one shuts the orchestrator down.

use crate::config::{LedgerConfig, SyncConfig, WalletConfig};
use crate::gateway::PeerGatewayFactory;
use crate::ledger::AccountSource;
use crate::ledger::address::DEFAULT_EXTERNAL_GAP_LIMIT;
use crate::ledger::selection::{MAX_FEE_PER_KB, MIN_FEE_PER_KB};
use crate::wallet::WalletSyncError;
use crate::wallet::sub_wallet::{SubWallet, SubWalletKind};
use crate::wallet::sync::{WalletStore, WalletSyncOrchestrator};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub const MAX_CHAIN_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Wallet registry is not initialized")]
    NotInitialized,

    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("Unknown chain id {0}")]
    UnknownChain(String),

    #[error("Sub-wallet {0} already exists")]
    DuplicateSubWallet(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sync error: {0}")]
    Sync(#[from] WalletSyncError),
}

pub struct WalletRegistry {
    accounts: Option<Arc<dyn AccountSource>>,
    store: Arc<dyn WalletStore>,
    factory: Arc<dyn PeerGatewayFactory>,
    ledger_config: LedgerConfig,
    sync_config: SyncConfig,
    wallets: Mutex<BTreeMap<String, Arc<SubWallet>>>,
}

impl WalletRegistry {
    /// An uninitialized registry; attach an account source before creating sub-wallets.
    pub fn new(
        store: Arc<dyn WalletStore>,
        factory: Arc<dyn PeerGatewayFactory>,
        config: &WalletConfig,
    ) -> Self {
        Self {
            accounts: None,
            store,
            factory,
            ledger_config: config.ledger.clone(),
            sync_config: config.sync.clone(),
            wallets: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_account_source(mut self, accounts: Arc<dyn AccountSource>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.accounts.is_some()
    }

    fn accounts(&self) -> Result<&Arc<dyn AccountSource>, RegistryError> {
        self.accounts.as_ref().ok_or(RegistryError::NotInitialized)
    }

    fn check_chain_id(chain_id: &str) -> Result<(), RegistryError> {
        if chain_id.is_empty() {
            return Err(RegistryError::InvalidChainId("chain id is empty".to_string()));
        }
        if chain_id.chars().count() > MAX_CHAIN_ID_LEN {
            return Err(RegistryError::InvalidChainId(format!(
                "chain id is longer than {} characters",
                MAX_CHAIN_ID_LEN
            )));
        }
        Ok(())
    }

    /// Open the sub-wallet for `chain_id` and start syncing it.
    pub async fn create_sub_wallet(
        &self,
        kind: SubWalletKind,
        chain_id: &str,
        coin_index: u32,
        fee_per_kb: u64,
    ) -> Result<Arc<SubWallet>, RegistryError> {
        let accounts = self.accounts()?;
        Self::check_chain_id(chain_id)?;
        if !(MIN_FEE_PER_KB..=MAX_FEE_PER_KB).contains(&fee_per_kb) {
            return Err(RegistryError::InvalidArgument(format!(
                "fee per kB {} is outside {}..={}",
                fee_per_kb, MIN_FEE_PER_KB, MAX_FEE_PER_KB
            )));
        }

        let mut wallets = self.wallets.lock().await;
        if wallets.contains_key(chain_id) {
            return Err(RegistryError::DuplicateSubWallet(chain_id.to_string()));
        }

        let ledger_config = LedgerConfig {
            fee_per_kb,
            ..self.ledger_config.clone()
        };
        let orchestrator = WalletSyncOrchestrator::new(
            chain_id,
            accounts.sub_account(coin_index),
            ledger_config,
            self.sync_config.clone(),
            self.store.clone(),
            self.factory.as_ref(),
        )
        .await?;
        orchestrator.start().await?;

        let wallet = Arc::new(SubWallet::new(kind, coin_index, orchestrator));
        wallets.insert(chain_id.to_string(), wallet.clone());
        info!(
            "Created {} sub-wallet {} at coin index {}",
            kind.behavior().name,
            chain_id,
            coin_index
        );
        Ok(wallet)
    }

    /// Create the sub-wallet, then derive `limit_gap` more addresses per chain and rescan.
    pub async fn recover_sub_wallet(
        &self,
        kind: SubWalletKind,
        chain_id: &str,
        coin_index: u32,
        fee_per_kb: u64,
        limit_gap: u32,
    ) -> Result<Arc<SubWallet>, RegistryError> {
        if limit_gap > DEFAULT_EXTERNAL_GAP_LIMIT {
            return Err(RegistryError::InvalidArgument(format!(
                "limit gap should be less than or equal to {}",
                DEFAULT_EXTERNAL_GAP_LIMIT
            )));
        }
        let wallet = self
            .create_sub_wallet(kind, chain_id, coin_index, fee_per_kb)
            .await?;
        wallet.orchestrator().recover(limit_gap).await?;
        Ok(wallet)
    }

    pub async fn destroy_sub_wallet(&self, chain_id: &str) -> Result<(), RegistryError> {
        self.accounts()?;
        let wallet = self
            .wallets
            .lock()
            .await
            .remove(chain_id)
            .ok_or_else(|| RegistryError::UnknownChain(chain_id.to_string()))?;
        wallet.orchestrator().shutdown().await;
        info!("Destroyed sub-wallet {}", chain_id);
        Ok(())
    }

    pub async fn get_sub_wallet(&self, chain_id: &str) -> Option<Arc<SubWallet>> {
        self.wallets.lock().await.get(chain_id).cloned()
    }

    /// Chain ids of open sub-wallets, sorted.
    pub async fn chain_ids(&self) -> Vec<String> {
        self.wallets.lock().await.keys().cloned().collect()
    }

    pub async fn shutdown_all(&self) {
        let wallets = std::mem::take(&mut *self.wallets.lock().await);
        for (chain_id, wallet) in wallets {
            wallet.orchestrator().shutdown().await;
            info!("Shut down sub-wallet {}", chain_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::OfflineGatewayFactory;
    use crate::ledger::SeedAccount;
    use crate::wallet::sync::MemoryWalletStore;

    fn registry() -> WalletRegistry {
        WalletRegistry::new(
            Arc::new(MemoryWalletStore::new()),
            Arc::new(OfflineGatewayFactory),
            &WalletConfig::default(),
        )
    }

    #[tokio::test]
    async fn uninitialized_registry_refuses_work() {
        let registry = registry();
        assert!(matches!(
            registry
                .create_sub_wallet(SubWalletKind::Mainchain, "ELA", 0, 10_000)
                .await,
            Err(RegistryError::NotInitialized)
        ));
        assert!(matches!(
            registry.destroy_sub_wallet("ELA").await,
            Err(RegistryError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn create_checks_preconditions() {
        let registry = registry().with_account_source(Arc::new(SeedAccount::new([1; 32])));
        let too_long = "x".repeat(MAX_CHAIN_ID_LEN + 1);
        for chain_id in ["", too_long.as_str()] {
            assert!(matches!(
                registry
                    .create_sub_wallet(SubWalletKind::Normal, chain_id, 0, 10_000)
                    .await,
                Err(RegistryError::InvalidChainId(_))
            ));
        }
        assert!(matches!(
            registry
                .create_sub_wallet(SubWalletKind::Normal, "ELA", 0, 1)
                .await,
            Err(RegistryError::InvalidArgument(_))
        ));

        let wallet = registry
            .create_sub_wallet(SubWalletKind::Mainchain, "ELA", 0, 10_000)
            .await
            .expect("create");
        assert_eq!(wallet.ledger().get_fee_per_kb(), 10_000);
        assert!(matches!(
            registry
                .create_sub_wallet(SubWalletKind::Mainchain, "ELA", 0, 10_000)
                .await,
            Err(RegistryError::DuplicateSubWallet(_))
        ));
        registry.shutdown_all().await;
        assert!(registry.chain_ids().await.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_and_recover() {
        let registry = registry().with_account_source(Arc::new(SeedAccount::new([2; 32])));
        assert!(matches!(
            registry
                .recover_sub_wallet(SubWalletKind::IdChain, "IdChain", 1, 10_000, 11)
                .await,
            Err(RegistryError::InvalidArgument(_))
        ));

        registry
            .recover_sub_wallet(SubWalletKind::IdChain, "IdChain", 1, 10_000, 10)
            .await
            .expect("recover");
        registry
            .create_sub_wallet(SubWalletKind::Mainchain, "ELA", 0, 10_000)
            .await
            .expect("create");
        assert_eq!(registry.chain_ids().await, vec!["ELA", "IdChain"]);

        let id_chain = registry.get_sub_wallet("IdChain").await.expect("present");
        assert_eq!(id_chain.kind(), SubWalletKind::IdChain);
        assert_eq!(id_chain.coin_index(), 1);

        registry.destroy_sub_wallet("IdChain").await.expect("destroy");
        assert!(registry.get_sub_wallet("IdChain").await.is_none());
        assert!(matches!(
            registry.destroy_sub_wallet("IdChain").await,
            Err(RegistryError::UnknownChain(_))
        ));
        registry.shutdown_all().await;
    }
}
