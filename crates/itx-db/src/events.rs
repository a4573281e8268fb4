//! Event Store: append-only, idempotent, fingerprinted event log.
//!
//! Distinct from [`crate`]'s OMS outbox/inbox tables and from
//! `itx-audit`'s hash-chained JSONL writer — this is the durable record a
//! session replays from. Payloads are opaque JSON here; the concrete
//! `EventPayload` sum type and its (de)serialisation boundary live in
//! `itx-runtime`, which depends on this crate, not the other way around.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};

/// An event ready to append. `event_id` is derived from its content, not
/// supplied by the caller, so two logically identical events always collide
/// on the same primary key.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub stream_id: String,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload_json: Value,
    pub config_hash: String,
}

impl NewEvent {
    /// SHA-256 content hash over `(stream_id, ts, type, payload, config_hash)`.
    pub fn event_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stream_id.as_bytes());
        hasher.update(self.ts_utc.to_rfc3339().as_bytes());
        hasher.update(self.event_type.as_bytes());
        hasher.update(canonical_json_bytes(&self.payload_json));
        hasher.update(self.config_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A stored event, as read back from `read_stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub stream_id: String,
    pub event_id: String,
    pub seq: i64,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload_json: Value,
    pub config_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A stream-wide fingerprint over deterministic event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub stream_id: String,
    pub event_count: usize,
    pub hash: String,
}

/// Canonicalise a JSON value to sorted-key bytes so semantically identical
/// payloads with differently-ordered object keys hash the same.
fn canonical_json_bytes(v: &Value) -> Vec<u8> {
    fn canon(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for k in keys {
                    out.insert(k.clone(), canon(&map[k]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(canon).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_vec(&canon(v)).unwrap_or_default()
}

/// Install the `events`/`schema_migrations` tables. Safe to re-run — uses
/// `create table if not exists`, independent of the `sqlx::migrate!` runner
/// so the Event Store can be installed standalone (e.g. by a test harness
/// that never runs the full migration set).
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        create table if not exists schema_migrations (
            version     text primary key,
            name        text not null,
            executed_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("events::init_schema: schema_migrations create failed")?;

    sqlx::query(
        r#"
        create table if not exists events (
            stream_id    text not null,
            event_id     text not null,
            seq          bigint not null,
            ts_utc       timestamptz not null,
            event_type   text not null,
            payload_json jsonb not null,
            config_hash  text not null,
            created_at   timestamptz not null default now(),
            primary key (stream_id, event_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("events::init_schema: events create failed")?;

    sqlx::query(
        "create unique index if not exists idx_events_stream_seq on events (stream_id, seq)",
    )
    .execute(pool)
    .await
    .context("events::init_schema: idx_events_stream_seq create failed")?;

    sqlx::query(
        r#"
        insert into schema_migrations (version, name)
        values ('20260101000004', 'events')
        on conflict (version) do nothing
        "#,
    )
    .execute(pool)
    .await
    .context("events::init_schema: schema_migrations stamp failed")?;

    Ok(())
}

/// Append one event. Returns `false` without mutating storage if an event
/// with the same content hash already exists in this stream (idempotent
/// retry after a crash between compute and durable commit).
pub async fn append(pool: &PgPool, event: NewEvent) -> Result<bool> {
    let event_id = event.event_id();

    let mut tx = pool.begin().await.context("append: begin tx failed")?;

    let next_seq: (i64,) = sqlx::query_as(
        "select coalesce(max(seq), 0) + 1 from events where stream_id = $1",
    )
    .bind(&event.stream_id)
    .fetch_one(&mut *tx)
    .await
    .context("append: next seq query failed")?;

    let row: Option<(String,)> = sqlx::query_as(
        r#"
        insert into events (stream_id, event_id, seq, ts_utc, event_type, payload_json, config_hash)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (stream_id, event_id) do nothing
        returning event_id
        "#,
    )
    .bind(&event.stream_id)
    .bind(&event_id)
    .bind(next_seq.0)
    .bind(event.ts_utc)
    .bind(&event.event_type)
    .bind(&event.payload_json)
    .bind(&event.config_hash)
    .fetch_optional(&mut *tx)
    .await
    .context("append: insert failed")?;

    tx.commit().await.context("append: commit failed")?;

    Ok(row.is_some())
}

/// Read a stream's events in insertion (seq) order.
pub async fn read_stream(pool: &PgPool, stream_id: &str) -> Result<Vec<StoredEvent>> {
    let rows = sqlx::query(
        r#"
        select stream_id, event_id, seq, ts_utc, event_type, payload_json, config_hash, created_at
        from events
        where stream_id = $1
        order by seq asc
        "#,
    )
    .bind(stream_id)
    .fetch_all(pool)
    .await
    .context("read_stream failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(StoredEvent {
            stream_id: row.try_get("stream_id")?,
            event_id: row.try_get("event_id")?,
            seq: row.try_get("seq")?,
            ts_utc: row.try_get("ts_utc")?,
            event_type: row.try_get("event_type")?,
            payload_json: row.try_get("payload_json")?,
            config_hash: row.try_get("config_hash")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(out)
}

/// Event types exempt from the replay-determinism fingerprint: observed
/// broker fills carry real-world timing/price noise a pure replay can't
/// reproduce bit-exactly.
const NON_DETERMINISTIC_EVENT_TYPES: &[&str] = &["FILL", "PARTIAL_FILL"];

/// Compute a stream-wide fingerprint over the ordered, deterministic-event
/// payload sequence. `contracts_hash`, if given, is folded in so two streams
/// computed under different contract versions never collide.
pub async fn replay_stream(
    pool: &PgPool,
    stream_id: &str,
    contracts_hash: Option<&str>,
) -> Result<Fingerprint> {
    let events = read_stream(pool, stream_id).await?;

    let mut hasher = Sha256::new();
    if let Some(h) = contracts_hash {
        hasher.update(h.as_bytes());
    }

    let mut counted = 0usize;
    for e in &events {
        if NON_DETERMINISTIC_EVENT_TYPES.contains(&e.event_type.as_str()) {
            continue;
        }
        hasher.update(e.event_type.as_bytes());
        hasher.update(canonical_json_bytes(&e.payload_json));
        counted += 1;
    }

    Ok(Fingerprint {
        stream_id: stream_id.to_string(),
        event_count: counted,
        hash: hex::encode(hasher.finalize()),
    })
}
