/// Builder for unsigned transactions
pub mod builder;

pub use builder::{TransactionBuilder, TransactionError};

/// Number of decimal places of the native asset (ELA).
pub const ELA_DECIMALS: u32 = 8;
