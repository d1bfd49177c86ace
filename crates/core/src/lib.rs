pub mod error;
pub mod models;
pub mod types;

pub use error::{Result, TraderError};
pub use models::{
    AccountSummary, OrderRequest, PositionReport, PositionView, SymbolPosition, TradeFill,
    TradeOutcome, TradeRejection,
};
pub use types::{Market, OrderType, TradeAction};
