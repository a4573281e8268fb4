use anyhow::{Context, Result};
use itx_reconcile::{BrokerSnapshot, OrderSnapshot, OrderStatus, Side};
use itx_schemas::{Bar, Micros};
use std::collections::BTreeMap;
use std::fs;

/// Load closed bars from a CSV with columns
/// `end_ts,open,high,low,close,volume`, prices as plain decimal strings.
pub fn load_bars_csv(path: &str) -> Result<Vec<Bar>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open bars csv: {path}"))?;
    let mut out = Vec::new();

    for rec in rdr.records() {
        let rec = rec?;
        let end_ts: i64 = rec[0].parse().context("parse end_ts")?;
        let bar = Bar {
            end_ts,
            open: Micros::parse_decimal(&rec[1]).context("parse open")?,
            high: Micros::parse_decimal(&rec[2]).context("parse high")?,
            low: Micros::parse_decimal(&rec[3]).context("parse low")?,
            close: Micros::parse_decimal(&rec[4]).context("parse close")?,
            volume: rec[5].parse().context("parse volume")?,
            bid: None,
            ask: None,
        };
        out.push(bar);
    }

    for w in out.windows(2) {
        if !(w[0].end_ts < w[1].end_ts) {
            anyhow::bail!("bars not strictly increasing by end_ts");
        }
    }

    Ok(out)
}

fn parse_side(s: &str) -> Result<Side> {
    match s {
        "Buy" => Ok(Side::Buy),
        "Sell" => Ok(Side::Sell),
        other => anyhow::bail!("unknown side: {other}"),
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus> {
    match s {
        "New" => Ok(OrderStatus::New),
        "Accepted" => Ok(OrderStatus::Accepted),
        "PartiallyFilled" => Ok(OrderStatus::PartiallyFilled),
        "Filled" => Ok(OrderStatus::Filled),
        "Canceled" => Ok(OrderStatus::Canceled),
        "Rejected" => Ok(OrderStatus::Rejected),
        "Unknown" => Ok(OrderStatus::Unknown),
        other => anyhow::bail!("unknown order status: {other}"),
    }
}

/// Load a broker snapshot fixture. `itx_reconcile::BrokerSnapshot` carries no
/// serde impls (it's pure reconciliation-domain state, never sent over the
/// wire in production), so this parses the documented JSON shape by hand:
///
/// ```json
/// {
///   "fetched_at_ms": 1700000000000,
///   "positions": {"MESZ5": 1},
///   "orders": [
///     {"order_id": "o1", "symbol": "MESZ5", "side": "Buy", "qty": 1, "filled_qty": 1, "status": "Filled"}
///   ]
/// }
/// ```
pub fn load_broker_snapshot_json(path: &str) -> Result<BrokerSnapshot> {
    let s = fs::read_to_string(path).with_context(|| format!("read snapshot: {path}"))?;
    let v: serde_json::Value = serde_json::from_str(&s).context("parse snapshot json")?;

    let fetched_at_ms = v.get("fetched_at_ms").and_then(|x| x.as_i64()).unwrap_or(0);

    let mut positions = BTreeMap::new();
    if let Some(obj) = v.get("positions").and_then(|p| p.as_object()) {
        for (symbol, qty) in obj {
            let qty_signed = qty.as_i64().with_context(|| format!("position qty for {symbol} must be an integer"))?;
            positions.insert(symbol.clone(), qty_signed);
        }
    }

    let mut orders = BTreeMap::new();
    if let Some(arr) = v.get("orders").and_then(|o| o.as_array()) {
        for entry in arr {
            let order_id = entry
                .get("order_id")
                .and_then(|x| x.as_str())
                .context("order missing order_id")?
                .to_string();
            let symbol = entry
                .get("symbol")
                .and_then(|x| x.as_str())
                .context("order missing symbol")?
                .to_string();
            let side = parse_side(entry.get("side").and_then(|x| x.as_str()).context("order missing side")?)?;
            let qty = entry.get("qty").and_then(|x| x.as_i64()).context("order missing qty")?;
            let filled_qty = entry.get("filled_qty").and_then(|x| x.as_i64()).context("order missing filled_qty")?;
            let status = parse_order_status(
                entry.get("status").and_then(|x| x.as_str()).context("order missing status")?,
            )?;
            orders.insert(
                order_id.clone(),
                OrderSnapshot::new(order_id, symbol, side, qty, filled_qty, status),
            );
        }
    }

    Ok(BrokerSnapshot {
        orders,
        positions,
        fetched_at_ms,
    })
}

mod recovery;

pub use recovery::{recover_outbox_against_broker, FakeBroker, RecoveryReport};

pub mod orchestrator;
pub mod paper_broker;

pub use orchestrator::{Orchestrator, OrchestratorBar, OrchestratorConfig, OrchestratorReport};
pub use paper_broker::PaperBroker as OrchestratorPaperBroker;
