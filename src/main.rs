use spv_wallet_sync::gateway::OfflineGatewayFactory;
use spv_wallet_sync::ledger::{BalanceType, SeedAccount, WalletListener};
use spv_wallet_sync::types::{Uint256, sha256d};
use spv_wallet_sync::wallet::sync::{FileWalletStore, PeerManagerListener};
use spv_wallet_sync::{SubWalletKind, WalletConfig, WalletRegistry};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Logs what the main chain sub-wallet reports.
struct LogListener;

impl PeerManagerListener for LogListener {
    fn sync_started(&self) {
        info!("Sync started");
    }

    fn sync_stopped(&self, error: Option<&str>) {
        match error {
            Some(error) => warn!("Sync stopped: {}", error),
            None => info!("Sync stopped"),
        }
    }

    fn block_height_increased(&self, block_height: u32) {
        info!("Block height {}", block_height);
    }

    fn tx_published(&self, hash: &Uint256, error: Option<&str>) {
        if let Some(error) = error {
            warn!("Publishing {} failed: {}", hash, error);
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

impl WalletListener for LogListener {
    fn balance_changed(&self, asset_id: &Uint256, balance: u128) {
        info!("Balance of {} is now {}", asset_id, balance);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match WalletConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    for directive in config.log_filter.split(',').filter(|d| !d.trim().is_empty()) {
        match directive.trim().parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {:?}: {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();

    info!("Starting SPV wallet sync service");
    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: WalletConfig) -> Result<(), Box<dyn std::error::Error>> {
    let account = match &config.demo_seed {
        Some(seed) => SeedAccount::from_hex(seed)?,
        None => SeedAccount::new(sha256d(config.data_dir.to_string_lossy().as_bytes()).0),
    };
    let store = Arc::new(FileWalletStore::new(config.data_dir.clone()));
    info!("Using data directory {:?}", config.data_dir);

    let registry = WalletRegistry::new(store, Arc::new(OfflineGatewayFactory), &config)
        .with_account_source(Arc::new(account));
    let wallet = registry
        .create_sub_wallet(SubWalletKind::Mainchain, "ELA", 0, config.ledger.fee_per_kb)
        .await?;

    let listener = Arc::new(LogListener);
    wallet.orchestrator().hub().register_peer_listener(listener.clone());
    wallet.orchestrator().hub().register_wallet_listener(listener);

    let ledger = wallet.ledger();
    info!("Receive address: {}", ledger.get_receive_address());
    info!(
        "Balance: {} ELA confirmed, {} ELA total",
        wallet.formatted_balance(BalanceType::Confirmed),
        wallet.formatted_balance(BalanceType::Total)
    );
    info!(
        "{} stored transactions",
        wallet.orchestrator().get_all_transactions_count().await?
    );

    registry.shutdown_all().await;
    Ok(())
}
