//! Offline, synchronous orchestrator: drives `itx_runtime::step_bar` over an
//! in-memory bar sequence with a deterministic paper broker standing in for
//! Postgres and the live broker adapter.
//!
//! This is the same pure pipeline the async `itx_runtime::Runner` wraps I/O
//! around — no network, no event store, no wall clock reads beyond what the
//! caller supplies per bar. A submitted order's ack/fill is folded back into
//! the *next* bar's tick, since `step_bar` only ever reads `broker_events` at
//! the top of a call, before a parent order submitted this same bar exists.

use chrono::{DateTime, TimeZone, Utc};
use itx_belief::BeliefConfig;
use itx_execution::supervisor::BrokerEvent;
use itx_integrity::{DataState, DvsRule, EqsRule, ExecutionState};
use itx_permission::ThresholdModifierConfig;
use itx_risk::ConstitutionConfig;
use itx_runtime::{BarTick, Contracts, RuntimeState, StepOutput};
use itx_schemas::{Bar, Direction, Micros};

use crate::paper_broker::PaperBroker;

/// One closed bar fed into the orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorBar {
    pub symbol: String,
    pub end_ts: i64,
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    pub volume: i64,
}

/// Contracts plus the handful of knobs the orchestrator itself needs
/// (everything else flows straight into `itx_runtime::Contracts`).
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub contracts: Contracts,
}

impl OrchestratorConfig {
    /// Empty registries, default-derived engine configs, a permissive data
    /// quality floor. Enough to drive the pipeline end to end in a test
    /// without tripping the permission/constitutional gates on missing
    /// contract data; callers that want a trade to actually fire must supply
    /// their own `bias_registry`/`strategy_registry`/`templates`.
    pub fn test_defaults() -> Self {
        Self {
            contracts: Contracts {
                bias_registry: Vec::new(),
                strategy_registry: Vec::new(),
                templates: Vec::new(),
                belief_config: BeliefConfig::default(),
                theta_base: 0.5,
                threshold_config: ThresholdModifierConfig::default(),
                constitution_config: ConstitutionConfig::default(),
                dvs_rules: Vec::<DvsRule>::new(),
                eqs_rules: Vec::<EqsRule>::new(),
                dvs_recovery_per_bar: 0.05,
                eqs_recovery_per_bar: 0.05,
                eqs_slippage_min_expected: 0.01,
                min_data_quality: 0.0,
                rolling_window_len: 50,
                bracket_ttl_seconds: 900,
                max_trade_minutes: 60,
            },
        }
    }
}

/// Summary of one orchestrator run, for test assertions.
#[derive(Debug)]
pub struct OrchestratorReport {
    pub bars_processed: usize,
    pub decisions: Vec<String>,
    pub broker_acks: usize,
    pub broker_fills: usize,
    pub events: Vec<itx_runtime::EventPayload>,
}

/// Drives `step_bar` over a bar sequence, feeding its own paper broker's
/// acks/fills back in as the next bar's `broker_events`.
pub struct Orchestrator {
    contracts: Contracts,
    state: RuntimeState,
    broker: PaperBroker,
    pending_broker_events: Vec<(String, BrokerEvent)>,
    next_event_seq: u64,
}

fn ts_utc(end_ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(end_ts, 0).single().expect("end_ts in range")
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let state = RuntimeState::new(config.contracts.rolling_window_len);
        Self {
            contracts: config.contracts,
            state,
            broker: PaperBroker::new(),
            pending_broker_events: Vec::new(),
            next_event_seq: 0,
        }
    }

    fn next_event_id(&mut self) -> String {
        self.next_event_seq += 1;
        format!("orch-evt-{}", self.next_event_seq)
    }

    /// Run the full bar sequence, returning every event appended and each
    /// bar's decision outcome in order.
    pub fn run(&mut self, bars: &[OrchestratorBar]) -> OrchestratorReport {
        let mut events = Vec::new();
        let mut decisions = Vec::new();

        for ob in bars {
            let bar = Bar {
                end_ts: ob.end_ts,
                open: Micros::new(ob.open_micros),
                high: Micros::new(ob.high_micros),
                low: Micros::new(ob.low_micros),
                close: Micros::new(ob.close_micros),
                volume: ob.volume,
                bid: None,
                ask: None,
            };

            let tick = BarTick {
                bar,
                ts_utc: ts_utc(ob.end_ts),
                connected: true,
                data_state: DataState::default(),
                execution_state: ExecutionState::default(),
                broker_events: std::mem::take(&mut self.pending_broker_events),
            };

            let StepOutput {
                events: bar_events,
                decision_outcome,
                submit_order,
            } = itx_runtime::step_bar(&tick, &self.contracts, &mut self.state);

            if let Some((client_order_id, direction, qty)) = submit_order {
                let side = match direction {
                    Direction::Long => "BUY",
                    Direction::Short => "SELL",
                };
                let (ack, fill) = self.broker.submit_order(&ob.symbol, side, qty, ob.close_micros);

                let ack_id = self.next_event_id();
                self.pending_broker_events.push((
                    ack_id,
                    BrokerEvent::Ack {
                        broker_order_id: ack.order_id.clone(),
                    },
                ));
                let fill_id = self.next_event_id();
                self.pending_broker_events.push((
                    fill_id,
                    BrokerEvent::Fill {
                        cumulative_qty: qty,
                        price: Micros::new(fill.price_micros),
                    },
                ));
                let _ = client_order_id;
            }

            decisions.push(decision_outcome);
            events.extend(bar_events);
        }

        OrchestratorReport {
            bars_processed: bars.len(),
            decisions,
            broker_acks: self.broker.ack_count(),
            broker_fills: self.broker.fill_count(),
            events,
        }
    }
}
