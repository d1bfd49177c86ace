//! Broker selection: mode registry plus symbol-based market detection.
//!
//! Backends register constructors by mode name; an unknown or unresolved
//! mode fails loudly at creation time. Trading against the wrong backend is
//! unsafe, so there is deliberately no silent fallback.

use std::collections::HashMap;

use trader_config::Settings;
use trader_core::error::{Result, TraderError};
use trader_core::types::Market;
use trader_ledger::{PositionLedger, ProtectionList};

use crate::adapter::BrokerAdapter;
use crate::futu::{FutuBackend, FutuConfig};
use crate::qmt::{QmtBackend, QmtConfig};
use crate::sim::SimBackend;

type Constructor = Box<dyn Fn(&Settings) -> Result<BrokerAdapter> + Send + Sync>;

pub struct BrokerRegistry {
    constructors: HashMap<String, Constructor>,
}

impl BrokerRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in backends: "sim", "qmt", "futu".
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("sim", |settings| {
            let backend = SimBackend::new(settings.sim.initial_cash);
            let ledger = build_ledger("sim", &settings.sim.account_id, settings)?;
            Ok(BrokerAdapter::new(Box::new(backend), ledger))
        });
        registry.register("qmt", |settings| {
            let backend = QmtBackend::new(QmtConfig {
                bridge_url: settings.qmt.bridge_url.clone(),
                account: settings.qmt.account_id.clone(),
                strategy_name: settings.qmt.strategy_name.clone(),
            });
            let ledger = build_ledger("qmt", &settings.qmt.account_id, settings)?;
            Ok(BrokerAdapter::new(Box::new(backend), ledger))
        });
        registry.register("futu", |settings| {
            let backend = FutuBackend::new(FutuConfig {
                host: settings.futu.host.clone(),
                port: settings.futu.port,
                market: settings.futu.market.clone(),
                account: settings.futu.account_id.clone(),
            });
            let ledger = build_ledger("futu", &settings.futu.account_id, settings)?;
            Ok(BrokerAdapter::new(Box::new(backend), ledger))
        });
        registry
    }

    pub fn register<F>(&mut self, mode: &str, ctor: F)
    where
        F: Fn(&Settings) -> Result<BrokerAdapter> + Send + Sync + 'static,
    {
        self.constructors.insert(mode.to_string(), Box::new(ctor));
    }

    pub fn create(&self, mode: &str, settings: &Settings) -> Result<BrokerAdapter> {
        let ctor = self.constructors.get(mode).ok_or_else(|| {
            TraderError::Config(format!(
                "unknown broker mode '{}' (registered: {})",
                mode,
                self.modes().join(", ")
            ))
        })?;
        ctor(settings)
    }

    pub fn modes(&self) -> Vec<String> {
        let mut modes: Vec<String> = self.constructors.keys().cloned().collect();
        modes.sort();
        modes
    }
}

fn build_ledger(broker_type: &str, account_id: &str, settings: &Settings) -> Result<PositionLedger> {
    let mut ledger = PositionLedger::open(broker_type, account_id, &settings.ledger_dir)?
        .with_protection(ProtectionList::new(settings.protected_positions_file.clone()));
    if let Some(today) = settings.today {
        ledger = ledger.with_today(today);
    }
    Ok(ledger)
}

/// Map a symbol to the mode that trades its market: domestic-exchange
/// suffixes go to the QMT terminal, everything else to the Futu gateway.
pub fn mode_for_symbol(symbol: &str) -> &'static str {
    match Market::from_symbol(symbol) {
        Market::SH | Market::SZ => "qmt",
        Market::US | Market::HK => "futu",
    }
}

/// Resolve the broker mode (explicit argument wins over configuration,
/// "auto" derives it from the symbol) and build the adapter.
pub fn create_broker(
    settings: &Settings,
    symbol: Option<&str>,
    explicit_mode: Option<&str>,
) -> Result<BrokerAdapter> {
    let mode = explicit_mode
        .map(str::to_string)
        .or_else(|| settings.broker_mode.clone())
        .ok_or_else(|| {
            TraderError::Config("BROKER_MODE not specified in config or arguments".into())
        })?;

    let mode = if mode == "auto" {
        let symbol = symbol.ok_or_else(|| {
            TraderError::Config("cannot auto-detect broker mode without a symbol".into())
        })?;
        mode_for_symbol(symbol).to_string()
    } else {
        mode
    };

    BrokerRegistry::builtin().create(&mode, settings)
}
