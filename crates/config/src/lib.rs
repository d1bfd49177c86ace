//! Environment-derived settings for the trading agent.
//!
//! Every knob comes from an environment variable (a `.env` file is loaded by
//! the CLI before this runs). Missing optional keys fall back to documented
//! defaults; malformed values are fatal configuration errors rather than
//! silently defaulted.

use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required config: {0}")]
    Missing(String),
    #[error("Invalid config value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Broker mode: "sim" | "qmt" | "futu" | "auto". `None` when unset;
    /// the factory treats an unresolved mode as fatal.
    pub broker_mode: Option<String>,
    /// Trading-day override for ledger records (backtest/replay runs).
    pub today: Option<NaiveDate>,
    /// Optional protection-list file (symbols the agent must never sell).
    pub protected_positions_file: Option<PathBuf>,
    /// Directory holding the per-broker ledger files.
    pub ledger_dir: PathBuf,
    pub sim: SimSettings,
    pub qmt: QmtSettings,
    pub futu: FutuSettings,
}

#[derive(Debug, Clone)]
pub struct SimSettings {
    pub account_id: String,
    pub initial_cash: f64,
}

#[derive(Debug, Clone)]
pub struct QmtSettings {
    pub account_id: String,
    pub bridge_url: String,
    pub strategy_name: String,
}

#[derive(Debug, Clone)]
pub struct FutuSettings {
    pub account_id: String,
    pub host: String,
    pub port: u16,
    pub market: String,
}

fn var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var_opt(key).unwrap_or_else(|| default.to_string())
}

fn var_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match var_opt(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let today = match var_opt("TODAY_DATE") {
            Some(raw) => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| ConfigError::Invalid {
                    key: "TODAY_DATE".into(),
                    value: raw,
                })?,
            ),
            None => None,
        };

        Ok(Settings {
            broker_mode: var_opt("BROKER_MODE"),
            today,
            protected_positions_file: var_opt("PROTECTED_POSITIONS_FILE").map(PathBuf::from),
            ledger_dir: PathBuf::from(var_or("LEDGER_DIR", "data/ai_positions")),
            sim: SimSettings {
                account_id: var_or("SIM_ACCOUNT_ID", "default"),
                initial_cash: var_parsed("SIM_INITIAL_CASH", 1_000_000.0)?,
            },
            qmt: QmtSettings {
                account_id: var_or("QMT_ACCOUNT_ID", "default"),
                bridge_url: var_or("QMT_BRIDGE_URL", "http://127.0.0.1:8001"),
                strategy_name: var_or("QMT_STRATEGY_NAME", "AI-Trader"),
            },
            futu: FutuSettings {
                account_id: var_or("FUTU_ACCOUNT_ID", "default"),
                host: var_or("FUTU_HOST", "127.0.0.1"),
                port: var_parsed("FUTU_PORT", 11111)?,
                market: var_or("FUTU_MARKET", "US"),
            },
        })
    }
}

impl Default for Settings {
    /// Defaults without touching the environment (tests, embedding).
    fn default() -> Self {
        Settings {
            broker_mode: None,
            today: None,
            protected_positions_file: None,
            ledger_dir: PathBuf::from("data/ai_positions"),
            sim: SimSettings {
                account_id: "default".into(),
                initial_cash: 1_000_000.0,
            },
            qmt: QmtSettings {
                account_id: "default".into(),
                bridge_url: "http://127.0.0.1:8001".into(),
                strategy_name: "AI-Trader".into(),
            },
            futu: FutuSettings {
                account_id: "default".into(),
                host: "127.0.0.1".into(),
                port: 11111,
                market: "US".into(),
            },
        }
    }
}
