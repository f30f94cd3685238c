//!
//! Utility module for the SPV wallet.
//!
//! Re-exports formatting helpers used by the binary and log lines.
/// Utility functions for formatting and display
pub mod index;

pub use index::format_token_amount;
