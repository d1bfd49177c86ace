//! The ledger handle: append-only writes, cached projection, sell-guard.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{info, warn};

use trader_core::error::{Result, TraderError};
use trader_core::types::TradeAction;

use crate::entry::LedgerEntry;
use crate::lock::LedgerLock;
use crate::protection::ProtectionList;

/// How long a cached projection stays valid between writes. Bounds how often
/// repeated queries rescan the whole file.
const CACHE_TTL: Duration = Duration::from_secs(5);

/// Verdict of the sell-guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellCheck {
    Allowed,
    Denied { reason: String },
}

impl SellCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SellCheck::Allowed)
    }

    pub fn reason(&self) -> &str {
        match self {
            SellCheck::Allowed => "sell permitted",
            SellCheck::Denied { reason } => reason,
        }
    }
}

struct CachedPositions {
    positions: HashMap<String, u64>,
    fetched_at: Instant,
}

/// Append-only transaction log of the agent's own holdings for one
/// (broker_type, account_id) pair.
///
/// One physical file per broker type (`{dir}/{broker_type}_ai_positions.jsonl`);
/// multiple accounts may share it, and readers filter by `account_id`. Every
/// read and append holds the exclusive cross-process [`LedgerLock`] for its
/// full duration. The in-process cache is private to this handle; other
/// processes see writes through the file alone.
pub struct PositionLedger {
    broker_type: String,
    account_id: String,
    path: PathBuf,
    today: Option<NaiveDate>,
    protection: ProtectionList,
    cache: Mutex<Option<CachedPositions>>,
    cache_ttl: Duration,
}

impl PositionLedger {
    /// Open (creating if needed) the ledger file for a broker/account pair.
    pub fn open(broker_type: &str, account_id: &str, ledger_dir: &Path) -> Result<Self> {
        let path = ledger_dir.join(format!("{}_ai_positions.jsonl", broker_type));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            OpenOptions::new().create(true).append(true).open(&path)?;
        }
        Ok(Self {
            broker_type: broker_type.to_string(),
            account_id: account_id.to_string(),
            path,
            today: None,
            protection: ProtectionList::disabled(),
            cache: Mutex::new(None),
            cache_ttl: CACHE_TTL,
        })
    }

    /// Override the trading day stamped on records (backtest/replay runs).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_protection(mut self, protection: ProtectionList) -> Self {
        self.protection = protection;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn broker_type(&self) -> &str {
        &self.broker_type
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Record an agent buy. Returns the agent's holding after the buy.
    /// A write failure is fatal: the caller must not assume the position
    /// updated if this returns `Err`.
    pub fn record_buy(
        &self,
        symbol: &str,
        amount: u64,
        price: f64,
        total_position: u64,
    ) -> Result<u64> {
        let new_qty = self.position(symbol)? + amount;
        self.append(TradeAction::Buy, symbol, amount, price, total_position, new_qty)?;
        Ok(new_qty)
    }

    /// Record an agent sell. Clamps at zero rather than rejecting: the
    /// `can_sell` guard upstream is the primary enforcement, and the clamp
    /// also absorbs reconciliation against fills smaller than requested.
    pub fn record_sell(
        &self,
        symbol: &str,
        amount: u64,
        price: f64,
        total_position: u64,
    ) -> Result<u64> {
        let current = self.position(symbol)?;
        if amount > current {
            warn!(
                symbol,
                current, amount, "sell exceeds agent holding, clamping position to 0"
            );
        }
        let new_qty = current.saturating_sub(amount);
        self.append(TradeAction::Sell, symbol, amount, price, total_position, new_qty)?;
        Ok(new_qty)
    }

    fn append(
        &self,
        action: TradeAction,
        symbol: &str,
        amount: u64,
        price: f64,
        total_position: u64,
        ai_position: u64,
    ) -> Result<()> {
        let entry = LedgerEntry {
            date: self.today_string(),
            action,
            symbol: symbol.to_string(),
            amount,
            price,
            ai_position,
            total_position,
            account_id: self.account_id.clone(),
        };
        entry.validate()?;
        let line = serde_json::to_string(&entry)?;

        let guard = LedgerLock::acquire(&self.path)?;
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        // Invalidate while still holding the lock so the next reader in this
        // process cannot observe the pre-write projection.
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
        drop(guard);

        info!(
            broker = %self.broker_type,
            account = %self.account_id,
            %action,
            symbol,
            amount,
            ai_position,
            "ledger entry appended"
        );
        Ok(())
    }

    fn today_string(&self) -> String {
        match self.today {
            Some(d) => d.format("%Y-%m-%d").to_string(),
            None => chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
        }
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Current agent-held quantity for one symbol (0 if never traded).
    pub fn position(&self, symbol: &str) -> Result<u64> {
        Ok(self.positions()?.get(symbol).copied().unwrap_or(0))
    }

    /// Snapshot of all agent-held quantities for this account.
    pub fn positions(&self) -> Result<HashMap<String, u64>> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.positions.clone());
                }
            }
        }

        let guard = LedgerLock::acquire(&self.path)?;
        let positions = self.scan_positions()?;
        drop(guard);

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = Some(CachedPositions {
            positions: positions.clone(),
            fetched_at: Instant::now(),
        });
        Ok(positions)
    }

    /// The sell-guard. Quantity shortfall and protection-list membership are
    /// independent denials; a ledger read failure propagates as `Err` and is
    /// never treated as "allowed".
    pub fn can_sell(&self, symbol: &str, amount: u64) -> Result<SellCheck> {
        let held = self.position(symbol)?;
        if held < amount {
            return Ok(SellCheck::Denied {
                reason: format!("insufficient AI position: {} < {}", held, amount),
            });
        }
        if self.protection.is_protected(&self.broker_type, symbol) {
            return Ok(SellCheck::Denied {
                reason: format!("{} is on the protected list", symbol),
            });
        }
        Ok(SellCheck::Allowed)
    }

    /// Full replay of this account's entries in file order (oldest first),
    /// optionally filtered by symbol. Audit surface, not a control input.
    pub fn history(&self, symbol: Option<&str>) -> Result<Vec<LedgerEntry>> {
        let guard = LedgerLock::acquire(&self.path)?;
        let file = std::fs::File::open(&self.path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let Some(entry) = self.parse_line(&line) else {
                continue;
            };
            if entry.account_id != self.account_id {
                continue;
            }
            if let Some(want) = symbol {
                if entry.symbol != want {
                    continue;
                }
            }
            entries.push(entry);
        }
        drop(guard);
        Ok(entries)
    }

    /// Scan the whole file under the caller-held lock; last record per
    /// (account, symbol) wins, by file order.
    fn scan_positions(&self) -> Result<HashMap<String, u64>> {
        let file = std::fs::File::open(&self.path)?;
        let mut positions = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if let Some(entry) = self.parse_line(&line) {
                if entry.account_id == self.account_id {
                    positions.insert(entry.symbol, entry.ai_position);
                }
            }
        }
        Ok(positions)
    }

    /// Parse one file line; blank and corrupt lines (e.g. the tail left by a
    /// crashed writer) are skipped, never fatal.
    fn parse_line(&self, line: &str) -> Option<LedgerEntry> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<LedgerEntry>(trimmed) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "skipping malformed ledger line");
                None
            }
        }
    }
}
