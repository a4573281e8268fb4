//! `status` / `readiness` / `preflight`: the go/no-go JSON contract every
//! operational surface (CLI, and eventually any outer supervisor) reads
//! before touching a run. All three share one shape —
//! `{go, reasons, warnings, checks}` — and differ only in which checks run.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub status: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub go: bool,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub checks: BTreeMap<String, CheckOutcome>,
}

struct Checks {
    outcomes: BTreeMap<String, CheckOutcome>,
}

impl Checks {
    fn new() -> Self {
        Self {
            outcomes: BTreeMap::new(),
        }
    }

    fn record(&mut self, name: &str, status: CheckStatus, detail: impl Into<String>) {
        self.outcomes.insert(
            name.to_string(),
            CheckOutcome {
                status: status.as_str().to_string(),
                detail: detail.into(),
            },
        );
    }

    fn finish(self) -> ReadinessReport {
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();
        for (name, outcome) in &self.outcomes {
            match outcome.status.as_str() {
                "fail" => reasons.push(name.clone()),
                "warn" => warnings.push(name.clone()),
                _ => {}
            }
        }
        ReadinessReport {
            go: reasons.is_empty(),
            reasons,
            warnings,
            checks: self.outcomes,
        }
    }
}

fn cfg_f64(v: &serde_json::Value, ptr: &str) -> Option<f64> {
    v.pointer(ptr).and_then(|x| x.as_f64())
}

fn cfg_bool(v: &serde_json::Value, ptr: &str, default: bool) -> bool {
    v.pointer(ptr).and_then(|x| x.as_bool()).unwrap_or(default)
}

/// `itx status` — is the database reachable and does the run exist at all.
pub async fn build_status_report(pool: &PgPool, run_id: Uuid) -> Result<ReadinessReport> {
    let mut checks = Checks::new();

    match itx_db::status(pool).await {
        Ok(s) if s.ok && s.has_runs_table => {
            checks.record("db_connected", CheckStatus::Pass, "database reachable, runs table present");
        }
        Ok(_) => {
            checks.record("db_connected", CheckStatus::Fail, "database reachable but runs table missing");
        }
        Err(e) => {
            checks.record("db_connected", CheckStatus::Fail, format!("database unreachable: {e}"));
            return Ok(checks.finish());
        }
    }

    match itx_db::fetch_run(pool, run_id).await {
        Ok(r) => checks.record("run_exists", CheckStatus::Pass, format!("status={}", r.status.as_str())),
        Err(e) => checks.record("run_exists", CheckStatus::Fail, format!("run not found: {e}")),
    }

    Ok(checks.finish())
}

/// `itx readiness` — status checks plus the deadman heartbeat.
pub async fn build_readiness_report(pool: &PgPool, run_id: Uuid, deadman_ttl_seconds: i64) -> Result<ReadinessReport> {
    let mut report = build_status_report(pool, run_id).await?;
    if !report.go {
        return Ok(report);
    }

    let mut checks = Checks::new();
    checks.outcomes = std::mem::take(&mut report.checks);

    match itx_db::deadman_expired(pool, run_id, deadman_ttl_seconds).await {
        Ok(true) => checks.record(
            "deadman_heartbeat",
            CheckStatus::Fail,
            format!("no heartbeat within {deadman_ttl_seconds}s"),
        ),
        Ok(false) => checks.record("deadman_heartbeat", CheckStatus::Pass, "heartbeat within TTL"),
        Err(e) => checks.record("deadman_heartbeat", CheckStatus::Warn, format!("could not evaluate: {e}")),
    }

    Ok(checks.finish())
}

/// `itx preflight` — full arm-gate: readiness checks plus the same
/// reconcile-clean and risk-limit conditions `itx_db::arm_preflight` enforces,
/// but reported structurally instead of failing fast on the first violation.
pub async fn build_preflight_report(pool: &PgPool, run_id: Uuid, deadman_ttl_seconds: i64) -> Result<ReadinessReport> {
    let mut report = build_readiness_report(pool, run_id, deadman_ttl_seconds).await?;
    if !report.go {
        return Ok(report);
    }

    let mut checks = Checks::new();
    checks.outcomes = std::mem::take(&mut report.checks);

    let run = itx_db::fetch_run(pool, run_id).await?;
    let is_live = run.mode.eq_ignore_ascii_case("LIVE");
    let cfg = &run.config_json;

    if is_live && cfg_bool(cfg, "/arming/require_clean_reconcile", true) {
        match itx_db::reconcile_checkpoint_load_latest(pool, run_id).await? {
            Some(cp) if cp.verdict == "CLEAN" => {
                checks.record("reconcile_clean", CheckStatus::Pass, "latest checkpoint verdict=CLEAN");
            }
            Some(cp) => {
                checks.record("reconcile_clean", CheckStatus::Fail, format!("latest checkpoint verdict={}", cp.verdict));
            }
            None => {
                checks.record("reconcile_clean", CheckStatus::Fail, "no reconcile checkpoint on record");
            }
        }
    } else {
        checks.record("reconcile_clean", CheckStatus::Pass, "not required outside LIVE mode");
    }

    if is_live {
        match cfg_f64(cfg, "/risk/daily_loss_limit") {
            Some(limit) if limit > 0.0 => {
                checks.record("risk_limits_configured", CheckStatus::Pass, format!("daily_loss_limit={limit}"));
            }
            _ => {
                checks.record("risk_limits_configured", CheckStatus::Fail, "risk/daily_loss_limit missing or non-positive");
            }
        }
    } else {
        checks.record("risk_limits_configured", CheckStatus::Pass, "not required outside LIVE mode");
    }

    Ok(checks.finish())
}
