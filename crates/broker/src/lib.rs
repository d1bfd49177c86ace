//! Broker adapters: one uniform trade lifecycle over heterogeneous backends.
//!
//! The [`BrokerAdapter`] owns the shared pre-trade validation, the sell-guard
//! wiring into the AI-position ledger, and the trade orchestration template.
//! Concrete backends ([`SimBackend`], [`QmtBackend`], [`FutuBackend`]) supply
//! only the backend-specific order-submission and query primitives behind the
//! [`BrokerBackend`] trait.

pub mod adapter;
pub mod backend;
pub mod factory;
pub mod futu;
pub mod qmt;
pub mod sim;

pub use adapter::BrokerAdapter;
pub use backend::BrokerBackend;
pub use factory::{create_broker, BrokerRegistry};
pub use futu::{FutuBackend, FutuConfig};
pub use qmt::{QmtBackend, QmtConfig};
pub use sim::SimBackend;
