//! The concrete event payload sum type every persisted event in a run's
//! stream is one variant of. `itx_schemas::EventEnvelope<T>` is the generic
//! envelope this fills `T` in for; `itx_db::events::NewEvent` is the opaque
//! JSON shape it serialises down to before hashing and storage.

use chrono::{DateTime, Utc};
use itx_schemas::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use itx_db::NewEvent;

/// Every event type the Runner appends to a run's stream. Tagged so the
/// stored `event_type` column and the payload shape can never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum EventPayload {
    #[serde(rename = "BAR_1M")]
    Bar1m {
        end_ts: i64,
        open_micros: i64,
        high_micros: i64,
        low_micros: i64,
        close_micros: i64,
        volume: i64,
    },
    #[serde(rename = "DECISION_RECORD")]
    DecisionRecord {
        outcome: String,
        reason: Option<String>,
        theta_effective: f64,
        score: Option<f64>,
    },
    #[serde(rename = "ORDER_INTENT")]
    OrderIntent {
        client_order_id: String,
        direction: Direction,
        qty: i64,
    },
    #[serde(rename = "ORDER_SUBMITTED")]
    OrderSubmitted { client_order_id: String },
    #[serde(rename = "ORDER_REJECTED")]
    OrderRejected {
        client_order_id: String,
        reason: String,
    },
    #[serde(rename = "FILL")]
    Fill {
        client_order_id: String,
        cumulative_qty: i64,
        price_micros: i64,
    },
    #[serde(rename = "PARTIAL_FILL")]
    PartialFill {
        client_order_id: String,
        cumulative_qty: i64,
        price_micros: i64,
    },
    #[serde(rename = "TRADE_CLOSED")]
    TradeClosed {
        trade_id: String,
        exit_reason: String,
        realized_pnl_micros: i64,
    },
    #[serde(rename = "READINESS_SNAPSHOT")]
    ReadinessSnapshot {
        connected: bool,
        data_quality: f64,
        dvs: f64,
        eqs: f64,
        kill_switch_active: bool,
    },
    #[serde(rename = "NO_TRADE")]
    NoTrade { reason: String },
}

impl EventPayload {
    /// The `event_type` column value, independent of serde's tag so callers
    /// that only need the discriminant skip a full JSON round-trip.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::Bar1m { .. } => "BAR_1M",
            EventPayload::DecisionRecord { .. } => "DECISION_RECORD",
            EventPayload::OrderIntent { .. } => "ORDER_INTENT",
            EventPayload::OrderSubmitted { .. } => "ORDER_SUBMITTED",
            EventPayload::OrderRejected { .. } => "ORDER_REJECTED",
            EventPayload::Fill { .. } => "FILL",
            EventPayload::PartialFill { .. } => "PARTIAL_FILL",
            EventPayload::TradeClosed { .. } => "TRADE_CLOSED",
            EventPayload::ReadinessSnapshot { .. } => "READINESS_SNAPSHOT",
            EventPayload::NoTrade { .. } => "NO_TRADE",
        }
    }

    /// Build the `itx_db` append request for this payload. `payload_json` is
    /// the bare payload (no envelope wrapper) — the envelope's other fields
    /// (`stream_id`, `event_type`, `config_hash`) are carried by the
    /// surrounding `NewEvent`, not duplicated inside the JSON blob.
    pub fn into_new_event(self, stream_id: String, ts_utc: DateTime<Utc>, config_hash: String) -> NewEvent {
        let event_type = self.event_type().to_string();
        let payload_json = payload_only(&self);
        NewEvent {
            stream_id,
            ts_utc,
            event_type,
            payload_json,
            config_hash,
        }
    }
}

fn payload_only(p: &EventPayload) -> Value {
    let full = serde_json::to_value(p).expect("EventPayload always serialises");
    full.get("payload").cloned().unwrap_or(Value::Null)
}

/// Event types a replay fingerprint must exclude: broker-observed fills carry
/// real-world timing/price noise a pure replay can't reproduce bit-exactly.
pub fn is_deterministic_event_type(event_type: &str) -> bool {
    !matches!(event_type, "FILL" | "PARTIAL_FILL")
}

pub fn now_stream_id(run_id: &uuid::Uuid) -> String {
    format!("run:{run_id}")
}
