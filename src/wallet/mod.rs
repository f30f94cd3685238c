pub mod registry;
pub mod sub_wallet;
pub mod sync;
pub mod types;

pub use registry::{RegistryError, WalletRegistry};
pub use sub_wallet::{KindBehavior, SubWallet, SubWalletKind};
pub use sync::WalletSyncOrchestrator;
pub use types::*;
