//! The shared trade lifecycle wrapped around any [`BrokerBackend`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use trader_core::error::Result;
use trader_core::models::{
    OrderRequest, PositionReport, PositionView, SymbolPosition, TradeFill, TradeOutcome,
    TradeRejection,
};
use trader_core::types::{OrderType, TradeAction};
use trader_ledger::{PositionLedger, SellCheck};

use crate::backend::BrokerBackend;

/// A connected brokerage with the AI-position ledger wired into every sell.
///
/// Structured rejections (validation, sell-guard, backend refusal, missing
/// price, failed connect) come back as `Ok(TradeOutcome::Rejected)`; only
/// ledger I/O and lock faults are `Err`, because after those the caller can
/// no longer trust the agent's bookkeeping.
pub struct BrokerAdapter {
    backend: Box<dyn BrokerBackend>,
    ledger: PositionLedger,
    connected: AtomicBool,
}

impl std::fmt::Debug for BrokerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerAdapter")
            .field("broker_type", &self.backend.broker_type())
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl BrokerAdapter {
    pub fn new(backend: Box<dyn BrokerBackend>, ledger: PositionLedger) -> Self {
        Self {
            backend,
            ledger,
            connected: AtomicBool::new(false),
        }
    }

    pub fn broker_type(&self) -> &'static str {
        self.backend.broker_type()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Idempotent connect: returns immediately when already connected. A
    /// failed handshake leaves the adapter disconnected and is safe to retry.
    pub async fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.establish().await?;
        self.connected.store(true, Ordering::SeqCst);
        info!(broker = self.backend.broker_type(), "broker connected");
        Ok(())
    }

    pub async fn buy(
        &self,
        symbol: &str,
        amount: u64,
        price: Option<f64>,
        order_type: OrderType,
    ) -> Result<TradeOutcome> {
        self.trade(TradeAction::Buy, symbol, amount, price, order_type).await
    }

    pub async fn sell(
        &self,
        symbol: &str,
        amount: u64,
        price: Option<f64>,
        order_type: OrderType,
    ) -> Result<TradeOutcome> {
        self.trade(TradeAction::Sell, symbol, amount, price, order_type).await
    }

    pub async fn price(&self, symbol: &str) -> Result<f64> {
        self.connect().await?;
        self.backend.quote(symbol).await
    }

    async fn trade(
        &self,
        action: TradeAction,
        symbol: &str,
        amount: u64,
        price: Option<f64>,
        order_type: OrderType,
    ) -> Result<TradeOutcome> {
        // 1. Shared validation, before any I/O.
        if symbol.trim().is_empty() {
            return Ok(TradeOutcome::rejected("symbol must not be empty", symbol));
        }
        if amount == 0 {
            return Ok(TradeOutcome::Rejected(
                TradeRejection::new("amount must be greater than 0", symbol).with_amount(amount),
            ));
        }
        if order_type == OrderType::Limit && !price.map(|p| p > 0.0).unwrap_or(false) {
            return Ok(TradeOutcome::Rejected(
                TradeRejection::new("limit order requires a positive price", symbol)
                    .with_amount(amount),
            ));
        }
        if let Some(p) = price {
            if !(p > 0.0) {
                return Ok(TradeOutcome::Rejected(
                    TradeRejection::new(format!("price must be greater than 0, got {}", p), symbol)
                        .with_amount(amount),
                ));
            }
        }

        // 2. Connection, before any order touches the backend.
        if let Err(e) = self.connect().await {
            return Ok(TradeOutcome::Rejected(
                TradeRejection::new(format!("not connected: {}", e), symbol).with_amount(amount),
            ));
        }

        // 3. Venue lot-size convention.
        let lot = self.backend.lot_size(symbol);
        if lot > 1 && amount % lot != 0 {
            return Ok(TradeOutcome::Rejected(
                TradeRejection::new(
                    format!(
                        "{} trades in multiples of {} shares, got {}",
                        symbol, lot, amount
                    ),
                    symbol,
                )
                .with_amount(amount),
            ));
        }

        // 4. Sell-guard. A ledger read failure propagates: never default to
        //    "allowed" on an unreadable ledger.
        if action == TradeAction::Sell {
            if let SellCheck::Denied { reason } = self.ledger.can_sell(symbol, amount)? {
                let (ai, total) = self.position_breakdown(symbol).await;
                warn!(symbol, amount, %reason, "sell blocked by guard");
                return Ok(TradeOutcome::Rejected(TradeRejection {
                    error: reason,
                    symbol: symbol.to_string(),
                    amount: Some(amount),
                    ai_position: Some(ai),
                    total_position: Some(total),
                    manual_position: Some(total.saturating_sub(ai)),
                }));
            }
        }

        // 5. Execution price: caller's for limit orders, backend quote for
        //    market orders without one. No price, no order.
        let exec_price = match price {
            Some(p) => p,
            None => match self.backend.quote(symbol).await {
                Ok(p) if p > 0.0 => p,
                Ok(p) => {
                    return Ok(TradeOutcome::Rejected(
                        TradeRejection::new(
                            format!("no usable quote for {} (got {})", symbol, p),
                            symbol,
                        )
                        .with_amount(amount),
                    ))
                }
                Err(e) => {
                    return Ok(TradeOutcome::Rejected(
                        TradeRejection::new(
                            format!("cannot resolve price for {}: {}", symbol, e),
                            symbol,
                        )
                        .with_amount(amount),
                    ))
                }
            },
        };

        // 6. Submit. Backend refusals surface as rejections with the
        //    backend's message preserved, never as silent success.
        let order = OrderRequest {
            symbol: symbol.to_string(),
            amount,
            price: Some(exec_price),
            order_type,
            action,
        };
        let order_id = match self.backend.submit(&order, exec_price).await {
            Ok(id) => id,
            Err(e) => {
                warn!(symbol, amount, error = %e, "order rejected by backend");
                return Ok(TradeOutcome::Rejected(
                    TradeRejection::new(e.to_string(), symbol).with_amount(amount),
                ));
            }
        };

        // 7. Record the brokerage's now-current total, not a local guess.
        //    The field is informational, so a failed query degrades to 0.
        let total_position = match self.backend.total_positions().await {
            Ok(map) => map.get(symbol).copied().unwrap_or(0),
            Err(e) => {
                warn!(symbol, error = %e, "post-trade position query failed, recording total 0");
                0
            }
        };

        // 8. Ledger append is fatal on failure: the trade executed, and the
        //    caller must know the bookkeeping did not.
        let ai_position = match action {
            TradeAction::Buy => self.ledger.record_buy(symbol, amount, exec_price, total_position)?,
            TradeAction::Sell => {
                self.ledger.record_sell(symbol, amount, exec_price, total_position)?
            }
        };

        info!(
            broker = self.backend.broker_type(),
            %action,
            symbol,
            amount,
            price = exec_price,
            ai_position,
            total_position,
            order_id = %order_id,
            "trade executed"
        );
        Ok(TradeOutcome::Filled(TradeFill {
            order_id,
            message: format!("{} order submitted", action),
            symbol: symbol.to_string(),
            amount,
            price: exec_price,
            ai_position,
            total_position,
        }))
    }

    /// Best-effort (ai, total) pair used to enrich guard rejections. Fetch
    /// failures degrade to zeros rather than masking the original denial.
    async fn position_breakdown(&self, symbol: &str) -> (u64, u64) {
        let ai = self.ledger.position(symbol).unwrap_or(0);
        let total = match self.backend.total_positions().await {
            Ok(map) => map.get(symbol).copied().unwrap_or(0),
            Err(_) => 0,
        };
        (ai, total)
    }

    /// Position breakdown: brokerage totals, agent-held, and the inferred
    /// manual remainder. Observability path: the account/cash query fails
    /// soft to zeros instead of failing the whole call.
    pub async fn position(&self, symbol: Option<&str>) -> Result<PositionView> {
        let total_positions = match self.connect().await {
            Ok(()) => match self.backend.total_positions().await {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, "total position query failed, reporting empty totals");
                    Default::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "not connected, reporting empty totals");
                Default::default()
            }
        };
        let ai_positions = self.ledger.positions()?;

        let mut manual_positions = std::collections::HashMap::new();
        for (sym, &total) in &total_positions {
            let ai = ai_positions.get(sym).copied().unwrap_or(0);
            if total > ai {
                manual_positions.insert(sym.clone(), total - ai);
            }
        }

        if let Some(sym) = symbol {
            return Ok(PositionView::Symbol(SymbolPosition {
                symbol: sym.to_string(),
                total_position: total_positions.get(sym).copied().unwrap_or(0),
                ai_position: ai_positions.get(sym).copied().unwrap_or(0),
                manual_position: manual_positions.get(sym).copied().unwrap_or(0),
            }));
        }

        let summary = match self.backend.account_summary().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "account query failed, reporting zero cash");
                Default::default()
            }
        };
        Ok(PositionView::Full(PositionReport {
            total_positions,
            ai_positions,
            manual_positions,
            cash: summary.cash,
            total_asset: summary.total_asset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use trader_core::error::TraderError;
    use trader_core::models::AccountSummary;

    use super::*;
    use crate::sim::SimBackend;

    fn ledger_for(backend: &dyn BrokerBackend, dir: &std::path::Path) -> PositionLedger {
        PositionLedger::open(backend.broker_type(), "default", dir).unwrap()
    }

    fn sim_adapter(dir: &std::path::Path) -> BrokerAdapter {
        let backend = SimBackend::new(1_000_000.0);
        backend.set_quote("AAPL", 150.0);
        backend.set_quote("600519.SH", 1650.0);
        let ledger = ledger_for(&backend, dir);
        BrokerAdapter::new(Box::new(backend), ledger)
    }

    #[tokio::test]
    async fn test_buy_accumulates_through_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = sim_adapter(dir.path());

        let first = adapter.buy("AAPL", 10, Some(150.0), OrderType::Limit).await.unwrap();
        assert!(first.is_filled());
        let second = adapter.buy("AAPL", 5, Some(155.0), OrderType::Limit).await.unwrap();
        match second {
            TradeOutcome::Filled(fill) => {
                assert_eq!(fill.ai_position, 15);
                assert_eq!(fill.total_position, 15);
                assert!(!fill.order_id.is_empty());
            }
            TradeOutcome::Rejected(r) => panic!("unexpected rejection: {}", r.error),
        }
        assert_eq!(adapter.ledger().position("AAPL").unwrap(), 15);
    }

    #[tokio::test]
    async fn test_sell_guard_blocks_before_backend() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = sim_adapter(dir.path());
        adapter.buy("AAPL", 10, Some(150.0), OrderType::Limit).await.unwrap();

        let outcome = adapter.sell("AAPL", 15, Some(160.0), OrderType::Limit).await.unwrap();
        match outcome {
            TradeOutcome::Rejected(rej) => {
                assert!(rej.error.contains("insufficient"));
                assert_eq!(rej.ai_position, Some(10));
                assert_eq!(rej.total_position, Some(10));
                assert_eq!(rej.manual_position, Some(0));
            }
            TradeOutcome::Filled(_) => panic!("guard must reject 15 against 10"),
        }
        // recordSell was never reached: holding unchanged, not clamped.
        assert_eq!(adapter.ledger().position("AAPL").unwrap(), 10);
    }

    #[tokio::test]
    async fn test_sell_within_holding_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = sim_adapter(dir.path());
        adapter.buy("AAPL", 10, Some(150.0), OrderType::Limit).await.unwrap();

        let outcome = adapter.sell("AAPL", 4, Some(160.0), OrderType::Limit).await.unwrap();
        match outcome {
            TradeOutcome::Filled(fill) => {
                assert_eq!(fill.ai_position, 6);
                assert_eq!(fill.total_position, 6);
            }
            TradeOutcome::Rejected(r) => panic!("unexpected rejection: {}", r.error),
        }
    }

    #[tokio::test]
    async fn test_manual_shares_stay_protected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimBackend::new(1_000_000.0);
        backend.set_quote("AAPL", 150.0);
        // Human operator already holds 40 shares in the shared account.
        backend.seed_holding("AAPL", 40);
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        adapter.buy("AAPL", 10, Some(150.0), OrderType::Limit).await.unwrap();

        // Total is 50, but the agent may only sell its own 10.
        let outcome = adapter.sell("AAPL", 30, Some(160.0), OrderType::Limit).await.unwrap();
        match outcome {
            TradeOutcome::Rejected(rej) => {
                assert_eq!(rej.ai_position, Some(10));
                assert_eq!(rej.total_position, Some(50));
                assert_eq!(rej.manual_position, Some(40));
            }
            TradeOutcome::Filled(_) => panic!("must not sell manual holdings"),
        }

        match adapter.position(Some("AAPL")).await.unwrap() {
            PositionView::Symbol(p) => {
                assert_eq!(p.total_position, 50);
                assert_eq!(p.ai_position, 10);
                assert_eq!(p.manual_position, 40);
            }
            PositionView::Full(_) => panic!("expected symbol-scoped view"),
        }
    }

    #[tokio::test]
    async fn test_validation_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = sim_adapter(dir.path());

        let empty = adapter.buy("", 10, Some(150.0), OrderType::Market).await.unwrap();
        assert!(!empty.is_filled());

        let zero = adapter.buy("AAPL", 0, Some(150.0), OrderType::Market).await.unwrap();
        assert!(!zero.is_filled());

        let no_limit_price = adapter.buy("AAPL", 10, None, OrderType::Limit).await.unwrap();
        match no_limit_price {
            TradeOutcome::Rejected(rej) => assert!(rej.error.contains("limit")),
            _ => panic!("limit order without price must be rejected"),
        }
    }

    #[tokio::test]
    async fn test_lot_size_enforced_before_backend() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = sim_adapter(dir.path());

        let odd = adapter.buy("600519.SH", 50, Some(1650.0), OrderType::Limit).await.unwrap();
        match odd {
            TradeOutcome::Rejected(rej) => assert!(rej.error.contains("multiples of 100")),
            _ => panic!("A-share odd lot must be rejected"),
        }

        let lot = adapter.buy("600519.SH", 100, Some(1650.0), OrderType::Limit).await.unwrap();
        assert!(lot.is_filled());
    }

    #[tokio::test]
    async fn test_market_order_resolves_quote() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = sim_adapter(dir.path());

        let outcome = adapter.buy("AAPL", 10, None, OrderType::Market).await.unwrap();
        match outcome {
            TradeOutcome::Filled(fill) => assert_eq!(fill.price, 150.0),
            TradeOutcome::Rejected(r) => panic!("unexpected rejection: {}", r.error),
        }
    }

    #[tokio::test]
    async fn test_market_order_without_any_price_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimBackend::new(1_000_000.0); // no quotes at all
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        let outcome = adapter.buy("AAPL", 10, None, OrderType::Market).await.unwrap();
        match outcome {
            TradeOutcome::Rejected(rej) => assert!(rej.error.contains("price")),
            _ => panic!("no price source must fail the operation"),
        }
        // Nothing was recorded.
        assert_eq!(adapter.ledger().position("AAPL").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_backend_rejection_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SimBackend::new(100.0); // not enough cash for anything
        backend.set_quote("AAPL", 150.0);
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        let outcome = adapter.buy("AAPL", 10, Some(150.0), OrderType::Limit).await.unwrap();
        match outcome {
            TradeOutcome::Rejected(rej) => assert!(rej.error.contains("Insufficient cash")),
            _ => panic!("backend rejection must not become success"),
        }
        assert_eq!(adapter.ledger().position("AAPL").unwrap(), 0);
    }

    // Counting backend for connect semantics and degradation paths.
    struct FlakyBackend {
        establish_calls: std::sync::Arc<AtomicUsize>,
        fail_establish: bool,
    }

    #[async_trait]
    impl BrokerBackend for FlakyBackend {
        fn broker_type(&self) -> &'static str {
            "sim"
        }
        async fn establish(&self) -> Result<()> {
            self.establish_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_establish {
                Err(TraderError::Network("gateway unreachable".into()))
            } else {
                Ok(())
            }
        }
        async fn submit(&self, _order: &OrderRequest, _price: f64) -> Result<String> {
            Ok("1".into())
        }
        async fn total_positions(&self) -> Result<HashMap<String, u64>> {
            Err(TraderError::Network("positions unavailable".into()))
        }
        async fn account_summary(&self) -> Result<AccountSummary> {
            Err(TraderError::Network("account unavailable".into()))
        }
        async fn quote(&self, _symbol: &str) -> Result<f64> {
            Ok(10.0)
        }
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let backend = FlakyBackend {
            establish_calls: calls.clone(),
            fail_establish: false,
        };
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        adapter.connect().await.unwrap();
        adapter.connect().await.unwrap();
        assert!(adapter.is_connected());
        // Auto-connect inside a trade must not re-handshake either.
        adapter.buy("AAPL", 1, Some(10.0), OrderType::Limit).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_retryable_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FlakyBackend {
            establish_calls: std::sync::Arc::new(AtomicUsize::new(0)),
            fail_establish: true,
        };
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        let outcome = adapter.buy("AAPL", 1, Some(10.0), OrderType::Limit).await.unwrap();
        match outcome {
            TradeOutcome::Rejected(rej) => assert!(rej.error.contains("not connected")),
            _ => panic!("connect failure must reject before the backend call"),
        }
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn test_position_degrades_to_zero_cash() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FlakyBackend {
            establish_calls: std::sync::Arc::new(AtomicUsize::new(0)),
            fail_establish: false,
        };
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        match adapter.position(None).await.unwrap() {
            PositionView::Full(report) => {
                assert_eq!(report.cash, 0.0);
                assert_eq!(report.total_asset, 0.0);
                assert!(report.total_positions.is_empty());
            }
            PositionView::Symbol(_) => panic!("expected full report"),
        }
    }

    #[tokio::test]
    async fn test_post_trade_total_degrades_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FlakyBackend {
            establish_calls: std::sync::Arc::new(AtomicUsize::new(0)),
            fail_establish: false,
        };
        let ledger = ledger_for(&backend, dir.path());
        let adapter = BrokerAdapter::new(Box::new(backend), ledger);

        let outcome = adapter.buy("AAPL", 1, Some(10.0), OrderType::Limit).await.unwrap();
        match outcome {
            TradeOutcome::Filled(fill) => {
                assert_eq!(fill.total_position, 0);
                assert_eq!(fill.ai_position, 1); // ledger still updated
            }
            TradeOutcome::Rejected(r) => panic!("unexpected rejection: {}", r.error),
        }
    }
}
