//! Runner: the single-threaded, bar-driven decision loop.
//!
//! Each bar runs the full pipeline in one pass: drain broker events, append
//! the bar, compute signals through permission/theta, run the selector or
//! tick the open trade, apply the constitutional filter, submit through the
//! supervisor, then persist state and emit a readiness snapshot. The
//! pipeline itself (this module's [`step_bar`]) is synchronous, pure-function
//! code with no `.await` points, so the same function drives both the live
//! async Runner (this crate's [`Runner`], which wraps Postgres I/O around
//! it) and an offline synchronous backtest driver.

pub mod events;

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use itx_belief::{update_beliefs, BeliefConfig, BeliefState};
use itx_bias::{compute_bias_state, compute_strategy_state, BiasSpec, StrategySpec};
use itx_execution::supervisor::{derive_client_order_id, BrokerEvent, ParentOrder};
use itx_integrity::{compute_dvs, compute_eqs, DataState, DvsRule, EqsRule, ExecutionState};
use itx_permission::{compute_theta_effective, evaluate_permission, ThresholdModifierConfig, TimeContext};
use itx_portfolio::trade::{InvalidationRule, TickAction, Trade};
use itx_risk::{
    evaluate_order_intent, ConstitutionConfig, ConstitutionalState, FilterDecision,
    OrderIntent as RiskOrderIntent, SessionClock,
};
use itx_schemas::{Bar, Direction};
use itx_signals::{compute_signal_vector, RollingWindow, SignalVector};
use itx_state::{PersistedState, RiskState, StateStore};
use itx_strategy::{select, Decision, NoTradeReason, StrategyTemplate};

pub use events::EventPayload;

/// Static registries + thresholds the pipeline is evaluated against for one
/// run. Loaded once at boot from the layered config, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contracts {
    pub bias_registry: Vec<BiasSpec>,
    pub strategy_registry: Vec<StrategySpec>,
    pub templates: Vec<StrategyTemplate>,
    pub belief_config: BeliefConfig,
    pub theta_base: f64,
    pub threshold_config: ThresholdModifierConfig,
    pub constitution_config: ConstitutionConfig,
    pub dvs_rules: Vec<DvsRule>,
    pub eqs_rules: Vec<EqsRule>,
    pub dvs_recovery_per_bar: f64,
    pub eqs_recovery_per_bar: f64,
    pub eqs_slippage_min_expected: f64,
    pub min_data_quality: f64,
    pub rolling_window_len: usize,
    pub bracket_ttl_seconds: i64,
    pub max_trade_minutes: i64,
}

impl Contracts {
    /// Deserialise from the merged/hashed config document produced by
    /// `itx_config::load_layered_yaml`. Every field is read from a
    /// top-level key of the same name; a contract document missing a
    /// required section fails loudly rather than silently defaulting.
    pub fn from_config_json(doc: &Value) -> Result<Contracts> {
        serde_json::from_value(doc.clone()).context("contracts: config document does not match Contracts shape")
    }
}

/// One closed market-data bar as delivered to the Runner, plus the
/// connectivity/data-quality facts the heartbeat pre-check (§4.13, P9) needs
/// before anything downstream runs.
#[derive(Debug, Clone)]
pub struct BarTick {
    pub bar: Bar,
    pub ts_utc: DateTime<Utc>,
    pub connected: bool,
    pub data_state: DataState,
    pub execution_state: ExecutionState,
    pub broker_events: Vec<(String, BrokerEvent)>,
}

/// Why this bar produced no trade, including the fail-closed short-circuit
/// reasons that bypass the rest of the pipeline entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatReason {
    NotConnected,
    DataQualityBelowMin,
}

/// Mutable state the pipeline carries from bar to bar. Reconstructed at boot
/// from the persisted journal plus each pure engine's own empty default.
pub struct RuntimeState {
    pub window: RollingWindow,
    pub belief_state: BeliefState,
    pub state_store: StateStore,
    pub dvs: f64,
    pub eqs: f64,
    pub open_trade: Option<Trade>,
    pub parent: Option<ParentOrder>,
    pub next_order_seq: u64,
    pub last_close_price: Option<f64>,
}

impl RuntimeState {
    pub fn new(rolling_window_len: usize) -> Self {
        Self {
            window: RollingWindow::new(rolling_window_len.max(1)),
            belief_state: BeliefState::default(),
            state_store: StateStore::new(),
            dvs: 1.0,
            eqs: 1.0,
            open_trade: None,
            parent: None,
            next_order_seq: 0,
            last_close_price: None,
        }
    }

    /// Restore from a previously persisted journal. The rolling window and
    /// the open parent/trade are intentionally not part of the journal: a
    /// cold restart resumes flat and rebuilds the window from replayed bars.
    pub fn from_persisted(rolling_window_len: usize, persisted: PersistedState) -> Result<Self> {
        let mut state = Self::new(rolling_window_len);
        let risk_state: RiskState = persisted.risk_state.into();
        state.state_store = StateStore::from_persisted(risk_state, persisted.current_day);
        state.belief_state =
            serde_json::from_value(persisted.belief_state).context("restore belief_state from journal")?;
        Ok(state)
    }
}

/// Everything one `step_bar` call produced, ready to append and act on.
/// Events are returned in the order they should be durably appended.
pub struct StepOutput {
    pub events: Vec<EventPayload>,
    pub decision_outcome: String,
    pub submit_order: Option<(String, Direction, i64)>,
}

fn micros_to_f64(v: itx_schemas::Micros) -> f64 {
    v.raw() as f64 / 1_000_000.0
}

/// Run one bar through the full pipeline. Pure function: no IO, no wall
/// clock reads beyond what's supplied in `tick`. Mutates `state` in place and
/// returns the ordered event list the caller must durably append.
pub fn step_bar(tick: &BarTick, contracts: &Contracts, state: &mut RuntimeState) -> StepOutput {
    let mut events = Vec::new();
    let bar = tick.bar;

    events.push(EventPayload::Bar1m {
        end_ts: bar.end_ts,
        open_micros: bar.open.raw(),
        high_micros: bar.high.raw(),
        low_micros: bar.low.raw(),
        close_micros: bar.close.raw(),
        volume: bar.volume,
    });

    // Fold broker events into the working parent first, so a FILL observed
    // on this bar is reflected before the selector/trade-manager run.
    if let Some(parent) = state.parent.as_mut() {
        for (event_id, broker_event) in &tick.broker_events {
            let _ = parent.apply(broker_event, Some(event_id.as_str()));
        }
    }

    state.dvs = compute_dvs(state.dvs, &tick.data_state, &contracts.dvs_rules, contracts.dvs_recovery_per_bar);
    state.eqs = compute_eqs(
        state.eqs,
        &tick.execution_state,
        &contracts.eqs_rules,
        contracts.eqs_recovery_per_bar,
        contracts.eqs_slippage_min_expected,
    );
    let data_quality = state.dvs.min(state.eqs);

    // P9: fail-closed on disconnect or degraded data quality, before any of
    // the decision pipeline runs.
    if !tick.connected || data_quality < contracts.min_data_quality {
        let reason = if !tick.connected {
            HeartbeatReason::NotConnected
        } else {
            HeartbeatReason::DataQualityBelowMin
        };
        events.push(EventPayload::NoTrade {
            reason: format!("{reason:?}"),
        });
        events.push(readiness_snapshot(tick.connected, data_quality, tick.ts_utc, state));
        state.window.push(bar);
        return StepOutput {
            events,
            decision_outcome: format!("NO_TRADE:{reason:?}"),
            submit_order: None,
        };
    }

    let signals = compute_signal_vector(&bar, &state.window);
    state.belief_state = update_beliefs(&signals, &state.belief_state, &contracts.belief_config, state.last_close_price);
    state.last_close_price = Some(micros_to_f64(bar.close));

    let bias_state = compute_bias_state(&signals, &contracts.bias_registry);
    let strategy_state = compute_strategy_state(&signals, &bias_state, &contracts.strategy_registry);

    let trend_direction = dominant_trend_direction(&signals);
    let permission = evaluate_permission(
        &bias_state,
        &contracts.bias_registry,
        &strategy_state,
        &contracts.strategy_registry,
        trend_direction,
    );

    let time_ctx = TimeContext::default();
    let range_compression = signals.get(itx_signals::SignalId::RangeCompression);
    let theta_effective = compute_theta_effective(
        contracts.theta_base,
        &time_ctx,
        bias_state.regime.vol_regime,
        range_compression,
        &bias_state,
        &contracts.bias_registry,
        &contracts.threshold_config,
    );

    let mut submit_order = None;
    let mut decision_outcome;

    if let Some(trade) = state.open_trade.as_mut() {
        let action = trade.tick(tick.ts_utc.timestamp(), &signals);
        decision_outcome = format!("TRADE_MANAGED:{action:?}");
        if !matches!(action, TickAction::Hold) {
            events.push(EventPayload::TradeClosed {
                trade_id: trade.trade_id.clone(),
                exit_reason: format!("{action:?}"),
                realized_pnl_micros: trade.realized_pnl.map(|p| p.raw()).unwrap_or(0),
            });
            state.open_trade = None;
        }
    } else {
        let active_bias_ids: HashSet<&str> = bias_state.active.iter().map(|b| b.bias_id.as_str()).collect();
        let decision = select(
            &contracts.templates,
            &permission,
            &active_bias_ids,
            &state.belief_state,
            &signals,
            theta_effective,
        );

        match decision {
            Decision::Trade {
                template_id,
                direction,
                entry_type,
                score,
            } => {
                let risk_state = state.state_store.get_risk_state(tick.ts_utc);
                let constitutional_state = ConstitutionalState {
                    daily_pnl_micros: risk_state.daily_pnl.raw(),
                    consecutive_losses: risk_state.consecutive_losses,
                    trades_today: risk_state.trades_today,
                    // The selector only runs when no trade is open (see the
                    // `if let Some(trade) = ...` branch above), so the book is flat.
                    current_position: 0,
                    current_dvs: state.dvs,
                    current_eqs: state.eqs,
                    kill_switch_active: risk_state.kill_switch_active,
                };
                let intent = RiskOrderIntent {
                    qty: direction.sign(),
                    entry_type,
                    has_stop: true,
                    has_target: true,
                };
                let now_et = SessionClock.local_time(tick.ts_utc);
                let filter_decision =
                    evaluate_order_intent(&contracts.constitution_config, &constitutional_state, &intent, now_et);

                events.push(EventPayload::DecisionRecord {
                    outcome: format!("{filter_decision:?}"),
                    reason: None,
                    theta_effective,
                    score: Some(score),
                });

                match filter_decision {
                    FilterDecision::Allow => {
                        let client_order_id =
                            derive_client_order_id(None, tick.ts_utc.timestamp_millis(), state.next_order_seq);
                        state.next_order_seq += 1;

                        let mut parent = ParentOrder::new(client_order_id.clone(), intent.qty.abs(), tick.ts_utc.timestamp());
                        parent.on_submit();
                        state.parent = Some(parent);

                        let trade = Trade::new(
                            client_order_id.clone(),
                            template_id,
                            InvalidationRule::None,
                            direction,
                            intent.qty.abs(),
                            contracts.max_trade_minutes,
                        );
                        state.open_trade = Some(trade);

                        events.push(EventPayload::OrderIntent {
                            client_order_id: client_order_id.clone(),
                            direction,
                            qty: intent.qty.abs(),
                        });
                        events.push(EventPayload::OrderSubmitted {
                            client_order_id: client_order_id.clone(),
                        });
                        submit_order = Some((client_order_id, direction, intent.qty.abs()));
                        decision_outcome = "TRADE_SUBMITTED".to_string();
                    }
                    FilterDecision::Reject(reason) => {
                        events.push(EventPayload::OrderRejected {
                            client_order_id: format!("rejected-{}", tick.ts_utc.timestamp_millis()),
                            reason: reason.as_code().to_string(),
                        });
                        decision_outcome = format!("REJECTED:{}", reason.as_code());
                    }
                }
            }
            Decision::NoTrade { reason } => {
                events.push(EventPayload::NoTrade {
                    reason: no_trade_reason_code(reason).to_string(),
                });
                decision_outcome = format!("NO_TRADE:{}", no_trade_reason_code(reason));
            }
        }
    }

    events.push(readiness_snapshot(tick.connected, data_quality, tick.ts_utc, state));
    state.window.push(bar);

    StepOutput {
        events,
        decision_outcome,
        submit_order,
    }
}

fn readiness_snapshot(connected: bool, data_quality: f64, ts_utc: DateTime<Utc>, state: &mut RuntimeState) -> EventPayload {
    let kill_switch_active = state.state_store.get_risk_state(ts_utc).kill_switch_active;
    EventPayload::ReadinessSnapshot {
        connected,
        data_quality,
        dvs: state.dvs,
        eqs: state.eqs,
        kill_switch_active,
    }
}

fn no_trade_reason_code(reason: NoTradeReason) -> &'static str {
    match reason {
        NoTradeReason::PermissionDenied => "permission_denied",
        NoTradeReason::NoEligibleTemplate => "no_eligible_template",
        NoTradeReason::ScoreBelowThreshold => "score_below_threshold",
        NoTradeReason::MissingConfirmation => "missing_confirmation",
    }
}

fn dominant_trend_direction(signals: &SignalVector) -> Option<Direction> {
    let hhll = signals.get(itx_signals::SignalId::HhllTrendStrength);
    if hhll > 0.1 {
        Some(Direction::Long)
    } else if hhll < -0.1 {
        Some(Direction::Short)
    } else {
        None
    }
}

/// Async boundary: owns the event store and config hash, drives `step_bar`
/// per bar, and appends its output durably. The decision pipeline above has
/// no `.await` points; this struct is the only place in the crate that does.
pub struct Runner {
    pub pool: sqlx::PgPool,
    pub stream_id: String,
    pub config_hash: String,
    pub contracts: Contracts,
    pub state: RuntimeState,
}

impl Runner {
    pub fn new(pool: sqlx::PgPool, stream_id: String, config_hash: String, contracts: Contracts) -> Self {
        let state = RuntimeState::new(contracts.rolling_window_len);
        Self {
            pool,
            stream_id,
            config_hash,
            contracts,
            state,
        }
    }

    /// Run one bar end to end: compute, then durably append every event the
    /// bar produced, in order, idempotently.
    pub async fn run_bar(&mut self, tick: BarTick) -> Result<StepOutput> {
        let ts_utc = tick.ts_utc;
        let output = step_bar(&tick, &self.contracts, &mut self.state);

        for event in &output.events {
            let new_event = event.clone().into_new_event(self.stream_id.clone(), ts_utc, self.config_hash.clone());
            itx_db::append(&self.pool, new_event)
                .await
                .context("runner: append event failed")?;
        }

        Ok(output)
    }
}
