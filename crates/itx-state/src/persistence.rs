//! Persistent state journal.
//!
//! A JSON object with two members: `risk_state` (decimals stored as strings
//! to avoid binary-float drift across process restarts) and `belief_state`
//! (an opaque blob owned by the belief engine). Written by the Runner on
//! every decision and trade close; read once at boot.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use itx_schemas::Micros;

use crate::types::RiskState;

mod decimal_string {
    use itx_schemas::Micros;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Micros, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_decimal_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Micros, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Micros::parse_decimal(&s).map_err(serde::de::Error::custom)
    }
}

/// On-disk shape of [`RiskState`]. `daily_pnl` round-trips through a plain
/// decimal string; `last_entry_time` is ISO 8601 with offset via chrono's
/// serde impl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRiskState {
    pub kill_switch_active: bool,
    #[serde(with = "decimal_string")]
    pub daily_pnl: Micros,
    pub consecutive_losses: u32,
    pub trades_today: u32,
    pub last_entry_time: Option<DateTime<Utc>>,
}

impl From<RiskState> for PersistedRiskState {
    fn from(s: RiskState) -> Self {
        Self {
            kill_switch_active: s.kill_switch_active,
            daily_pnl: s.daily_pnl,
            consecutive_losses: s.consecutive_losses,
            trades_today: s.trades_today,
            last_entry_time: s.last_entry_time,
        }
    }
}

impl From<PersistedRiskState> for RiskState {
    fn from(p: PersistedRiskState) -> Self {
        Self {
            kill_switch_active: p.kill_switch_active,
            daily_pnl: p.daily_pnl,
            consecutive_losses: p.consecutive_losses,
            trades_today: p.trades_today,
            last_entry_time: p.last_entry_time,
        }
    }
}

/// The full journal document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub risk_state: PersistedRiskState,
    pub belief_state: Value,
    #[serde(default)]
    pub current_day: Option<u32>,
}

/// Write the journal, replacing any existing file. Writes to a sibling
/// `.tmp` path and renames over the target so a crash mid-write never leaves
/// a half-written journal behind.
pub fn save_journal(
    path: &Path,
    risk_state: &RiskState,
    current_day: Option<u32>,
    belief_state: Value,
) -> Result<()> {
    let persisted = PersistedState {
        risk_state: PersistedRiskState::from(*risk_state),
        belief_state,
        current_day,
    };
    let json = serde_json::to_string_pretty(&persisted).context("serialize state journal")?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, json)
        .with_context(|| format!("write state journal tmp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename state journal into place at {}", path.display()))?;
    Ok(())
}

/// Load the journal. Returns `None` if the file does not exist yet (fresh
/// boot — caller should start from [`crate::StateStore::new`]).
pub fn load_journal(path: &Path) -> Result<Option<PersistedState>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("read state journal at {}", path.display()))?;
    let persisted: PersistedState =
        serde_json::from_str(&data).with_context(|| format!("parse state journal at {}", path.display()))?;
    Ok(Some(persisted))
}
