//! AI-position ledger — the agent's own bookkeeping of what it holds.
//!
//! The brokerage account is shared with a human operator, so the brokerage's
//! reported totals can never tell us how much the agent is allowed to sell.
//! This crate keeps an append-only, crash-safe transaction log per
//! (broker, account) and derives the agent-held quantity per symbol from it.
//! The `can_sell` guard layered on top is what keeps the agent from ever
//! liquidating manually-held shares.

pub mod entry;
pub mod lock;
pub mod manager;
pub mod protection;

pub use entry::LedgerEntry;
pub use lock::LedgerLock;
pub use manager::{PositionLedger, SellCheck};
pub use protection::ProtectionList;
