//! QoT sliding-window evaluation.
//!
//! Pure computation: the engine feeds every telemetry sample through
//! [`QotMonitor::observe`] with an explicit clock reading. Persistency
//! suppresses single-sample outliers; cooldown keeps reconfigurations apart
//! while the physical layer settles.

use std::collections::VecDeque;

use tokio::time::Instant;

use lumen_common::config::QotConfig;
use lumen_common::models::TelemetryFields;
use lumen_common::protocol::TelemetryReport;

/// Samples retained per connection for inspection via the status API.
const WINDOW_CAP: usize = 32;

/// Per-connection QoT bookkeeping, owned by the engine.
#[derive(Debug, Default)]
pub struct QotState {
    window: VecDeque<TelemetryFields>,
    bad_count: u32,
    last_action: Option<Instant>,
    /// First endpoint observed degraded in the current bad streak.
    trigger: Option<(String, String)>,
}

impl QotState {
    pub fn bad_count(&self) -> u32 {
        self.bad_count
    }

    pub fn last_sample(&self) -> Option<&TelemetryFields> {
        self.window.back()
    }
}

/// Verdict for a persistent degradation that warrants action now.
#[derive(Debug, Clone, PartialEq)]
pub struct QotAction {
    pub bad_count: u32,
    pub osnr: f64,
    pub pre_fec_ber: f64,
    /// Agent and interface that first reported the degradation streak.
    pub agent_id: String,
    pub interface: String,
}

impl QotAction {
    /// The `reason` payload carried in `reconfigConnection`.
    pub fn reason(&self) -> String {
        serde_json::json!({
            "bad_count": self.bad_count,
            "osnr": self.osnr,
            "pre_fec_ber": self.pre_fec_ber,
            "interface": self.interface,
            "agent_id": self.agent_id,
        })
        .to_string()
    }
}

/// Stateless evaluator over per-connection [`QotState`].
#[derive(Debug, Clone)]
pub struct QotMonitor {
    cfg: QotConfig,
}

impl QotMonitor {
    pub fn new(cfg: QotConfig) -> Self {
        Self { cfg }
    }

    /// Whether a single sample violates the thresholds.
    pub fn is_degraded(&self, fields: &TelemetryFields) -> bool {
        fields.osnr < self.cfg.osnr_threshold_db || fields.pre_fec_ber > self.cfg.ber_threshold
    }

    /// Feed one sample. Returns an action when the degradation is persistent
    /// and the cooldown has elapsed; the bad streak resets on action.
    pub fn observe(
        &self,
        state: &mut QotState,
        report: &TelemetryReport,
        now: Instant,
    ) -> Option<QotAction> {
        let fields = report.data.fields;
        if state.window.len() == WINDOW_CAP {
            state.window.pop_front();
        }
        state.window.push_back(fields);

        if !self.is_degraded(&fields) {
            state.bad_count = 0;
            state.trigger = None;
            return None;
        }

        state.bad_count += 1;
        if state.trigger.is_none() {
            state.trigger = Some((report.agent_id.clone(), report.data.interface.clone()));
        }

        if state.bad_count < self.cfg.persistency_samples {
            return None;
        }
        let cooled_down = state
            .last_action
            .map_or(true, |t| now.duration_since(t) >= self.cfg.cooldown);
        if !cooled_down {
            return None;
        }

        let (agent_id, interface) = state
            .trigger
            .clone()
            .unwrap_or_else(|| (report.agent_id.clone(), report.data.interface.clone()));
        let action = QotAction {
            bad_count: state.bad_count,
            osnr: fields.osnr,
            pre_fec_ber: fields.pre_fec_ber,
            agent_id,
            interface,
        };

        state.bad_count = 0;
        state.trigger = None;
        state.last_action = Some(now);
        Some(action)
    }

    /// Clamp a commanded tx-power into the transceiver safety bounds.
    pub fn clamp_tx(&self, dbm: f64) -> f64 {
        dbm.clamp(self.cfg.tx_min_dbm, self.cfg.tx_max_dbm)
    }

    /// One adjustment step up from the last commanded power.
    pub fn step_tx(&self, last_dbm: f64) -> f64 {
        self.clamp_tx(last_dbm + self.cfg.tx_step_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_common::protocol::TelemetrySample;
    use std::time::Duration;

    fn report(osnr: f64, ber: f64) -> TelemetryReport {
        TelemetryReport {
            agent_id: "agt-1".into(),
            pop_id: "pop1".into(),
            router_id: "router1".into(),
            data: TelemetrySample {
                connection_id: "con_1".into(),
                interface: "Ethernet56".into(),
                timestamp: 0.0,
                fields: TelemetryFields {
                    rx_power: -12.0,
                    tx_power: -2.0,
                    osnr,
                    pre_fec_ber: ber,
                },
            },
        }
    }

    fn monitor() -> QotMonitor {
        QotMonitor::new(QotConfig::default())
    }

    #[tokio::test]
    async fn degraded_predicate() {
        let m = monitor();
        assert!(m.is_degraded(&report(17.0, 1e-5).data.fields));
        assert!(m.is_degraded(&report(25.0, 1e-2).data.fields));
        assert!(!m.is_degraded(&report(25.0, 1e-5).data.fields));
    }

    #[tokio::test]
    async fn three_degraded_samples_trigger_once() {
        let m = monitor();
        let mut state = QotState::default();
        let now = Instant::now();

        assert!(m.observe(&mut state, &report(17.0, 1e-5), now).is_none());
        assert!(m.observe(&mut state, &report(17.0, 1e-5), now).is_none());
        let action = m.observe(&mut state, &report(17.0, 1e-5), now).unwrap();

        assert_eq!(action.bad_count, 3);
        assert_eq!(action.osnr, 17.0);
        assert_eq!(action.interface, "Ethernet56");
        assert_eq!(state.bad_count(), 0, "bad streak resets after action");
    }

    #[tokio::test]
    async fn healthy_sample_resets_streak() {
        let m = monitor();
        let mut state = QotState::default();
        let now = Instant::now();

        m.observe(&mut state, &report(17.0, 1e-5), now);
        m.observe(&mut state, &report(17.0, 1e-5), now);
        m.observe(&mut state, &report(22.0, 1e-5), now);
        assert_eq!(state.bad_count(), 0);
        assert!(m.observe(&mut state, &report(17.0, 1e-5), now).is_none());
    }

    #[tokio::test]
    async fn cooldown_suppresses_back_to_back_actions() {
        let m = monitor();
        let mut state = QotState::default();
        let t0 = Instant::now();

        for _ in 0..3 {
            m.observe(&mut state, &report(17.0, 1e-5), t0);
        }
        assert!(state.last_action.is_some());

        // Still inside the 20 s cooldown: no matter how many degraded
        // samples arrive, nothing fires.
        let t1 = t0 + Duration::from_secs(10);
        for _ in 0..6 {
            assert!(m.observe(&mut state, &report(16.0, 1e-5), t1).is_none());
        }

        // Past the cooldown the accumulated streak acts immediately.
        let t2 = t0 + Duration::from_secs(20);
        assert!(m.observe(&mut state, &report(16.0, 1e-5), t2).is_some());
    }

    #[tokio::test]
    async fn tx_power_stays_within_safety_bounds() {
        let m = monitor();
        assert_eq!(m.step_tx(-2.0), -1.0);
        assert_eq!(m.step_tx(-0.5), 0.0);
        assert_eq!(m.step_tx(0.0), 0.0);
        assert_eq!(m.clamp_tx(-20.0), -15.0);
        assert_eq!(m.clamp_tx(3.0), 0.0);
    }

    #[tokio::test]
    async fn reason_payload_carries_context() {
        let action = QotAction {
            bad_count: 3,
            osnr: 17.0,
            pre_fec_ber: 1e-5,
            agent_id: "agt-1".into(),
            interface: "Ethernet56".into(),
        };
        let reason: serde_json::Value = serde_json::from_str(&action.reason()).unwrap();
        assert_eq!(reason["bad_count"], 3);
        assert_eq!(reason["agent_id"], "agt-1");
        assert_eq!(reason["interface"], "Ethernet56");
    }
}
