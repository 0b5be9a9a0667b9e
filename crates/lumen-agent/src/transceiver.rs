//! Coherent transceiver capability.
//!
//! The agent drives pluggables through this small interface. `MockTransceiver`
//! generates realistic synthetic optics for development; `SonicCliTransceiver`
//! shells out to the SONiC utilities on a real switch. Selection happens via
//! `MOCK_HARDWARE` at startup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use lumen_common::models::TelemetryFields;

#[async_trait]
pub trait Transceiver: Send + Sync {
    /// Whether a module is seated in the port.
    async fn presence(&self, interface: &str) -> bool;

    /// Tune the carrier and tx-power, then enable the laser.
    async fn configure(
        &self,
        interface: &str,
        frequency_thz: f64,
        tx_power_dbm: f64,
    ) -> anyhow::Result<()>;

    /// One coherent-optics reading.
    async fn read_sample(&self, interface: &str) -> anyhow::Result<TelemetryFields>;

    /// Disable the laser and leave the port admin-down.
    async fn disable(&self, interface: &str) -> anyhow::Result<()>;
}

// ── Mock ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct CarrierState {
    frequency_thz: f64,
    tx_power_dbm: f64,
    enabled: bool,
}

/// Simulated hardware: remembers per-port carrier state and produces
/// readings that track the commanded tx-power.
#[derive(Default)]
pub struct MockTransceiver {
    carriers: Mutex<HashMap<String, CarrierState>>,
    configure_calls: AtomicU32,
}

impl MockTransceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of hardware mutations attempted; used to verify
    /// command idempotence.
    pub fn configure_calls(&self) -> u32 {
        self.configure_calls.load(Ordering::SeqCst)
    }

    pub fn carrier_enabled(&self, interface: &str) -> bool {
        self.carriers
            .lock()
            .unwrap()
            .get(interface)
            .map(|c| c.enabled)
            .unwrap_or(false)
    }

    pub fn tx_power(&self, interface: &str) -> Option<f64> {
        self.carriers
            .lock()
            .unwrap()
            .get(interface)
            .map(|c| c.tx_power_dbm)
    }
}

#[async_trait]
impl Transceiver for MockTransceiver {
    async fn presence(&self, _interface: &str) -> bool {
        true
    }

    async fn configure(
        &self,
        interface: &str,
        frequency_thz: f64,
        tx_power_dbm: f64,
    ) -> anyhow::Result<()> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        self.carriers.lock().unwrap().insert(
            interface.to_string(),
            CarrierState {
                frequency_thz,
                tx_power_dbm,
                enabled: true,
            },
        );
        tracing::debug!(interface, frequency_thz, tx_power_dbm, "mock carrier configured");
        Ok(())
    }

    async fn read_sample(&self, interface: &str) -> anyhow::Result<TelemetryFields> {
        use rand::Rng;
        let carrier = {
            let carriers = self.carriers.lock().unwrap();
            carriers.get(interface).copied()
        };
        let Some(carrier) = carrier else {
            anyhow::bail!("no carrier configured on {interface}");
        };
        if !carrier.enabled {
            anyhow::bail!("laser disabled on {interface}");
        }

        let mut rng = rand::rng();
        let tx = carrier.tx_power_dbm;
        // Higher launch power buys OSNR margin, with per-sample noise.
        let osnr = 21.0 + 0.8 * (tx + 2.0) + rng.random_range(-0.8..0.8);
        Ok(TelemetryFields {
            rx_power: tx - 17.0 + rng.random_range(-0.5..0.5),
            tx_power: tx,
            osnr,
            pre_fec_ber: 10f64.powf(-5.0 - 0.15 * (osnr - 18.0)),
        })
    }

    async fn disable(&self, interface: &str) -> anyhow::Result<()> {
        if let Some(carrier) = self.carriers.lock().unwrap().get_mut(interface) {
            carrier.enabled = false;
        }
        tracing::debug!(interface, "mock carrier disabled");
        Ok(())
    }
}

// ── SONiC CLI ───────────────────────────────────────────────────────

/// Drives transceivers through the SONiC command-line utilities.
pub struct SonicCliTransceiver;

impl SonicCliTransceiver {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<String> {
        let output = std::process::Command::new(program).args(args).output()?;
        if !output.status.success() {
            anyhow::bail!(
                "{program} {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SonicCliTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transceiver for SonicCliTransceiver {
    async fn presence(&self, interface: &str) -> bool {
        self.run("sfputil", &["show", "presence", "-p", interface])
            .map(|out| out.contains("Present"))
            .unwrap_or(false)
    }

    async fn configure(
        &self,
        interface: &str,
        frequency_thz: f64,
        tx_power_dbm: f64,
    ) -> anyhow::Result<()> {
        let ghz = format!("{:.0}", frequency_thz * 1000.0);
        let dbm = format!("{tx_power_dbm:.1}");
        self.run(
            "config",
            &["interface", "transceiver", "frequency", interface, &ghz],
        )?;
        self.run(
            "config",
            &["interface", "transceiver", "tx-power", interface, &dbm],
        )?;
        self.run("config", &["interface", "startup", interface])?;
        tracing::info!(interface, ghz = %ghz, dbm = %dbm, "carrier configured");
        Ok(())
    }

    async fn read_sample(&self, interface: &str) -> anyhow::Result<TelemetryFields> {
        let dom = self.run("sfputil", &["show", "dom", "-p", interface])?;
        parse_dom(&dom).ok_or_else(|| anyhow::anyhow!("unparseable DOM output for {interface}"))
    }

    async fn disable(&self, interface: &str) -> anyhow::Result<()> {
        self.run("config", &["interface", "shutdown", interface])?;
        tracing::info!(interface, "interface shut down");
        Ok(())
    }
}

/// Pull the four QoT fields out of `sfputil show dom` output.
fn parse_dom(output: &str) -> Option<TelemetryFields> {
    let field = |name: &str| -> Option<f64> {
        output.lines().find_map(|line| {
            let line = line.trim();
            line.strip_prefix(name)?
                .trim_start_matches([':', ' '])
                .split_whitespace()
                .next()?
                .parse()
                .ok()
        })
    };
    Some(TelemetryFields {
        rx_power: field("RxPower")?,
        tx_power: field("TxPower")?,
        osnr: field("OSNR")?,
        pre_fec_ber: field("PreFECBER")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_requires_configuration_before_reading() {
        let t = MockTransceiver::new();
        assert!(t.read_sample("Ethernet56").await.is_err());

        t.configure("Ethernet56", 193.1, -2.0).await.unwrap();
        let sample = t.read_sample("Ethernet56").await.unwrap();
        assert_eq!(sample.tx_power, -2.0);
        assert!(sample.osnr > 15.0 && sample.osnr < 30.0);
        assert!(sample.pre_fec_ber > 0.0);

        t.disable("Ethernet56").await.unwrap();
        assert!(t.read_sample("Ethernet56").await.is_err());
        assert!(!t.carrier_enabled("Ethernet56"));
    }

    #[tokio::test]
    async fn mock_osnr_tracks_tx_power() {
        let t = MockTransceiver::new();
        t.configure("Ethernet56", 193.1, -10.0).await.unwrap();
        let low: f64 = {
            let mut acc = 0.0;
            for _ in 0..16 {
                acc += t.read_sample("Ethernet56").await.unwrap().osnr;
            }
            acc / 16.0
        };
        t.configure("Ethernet56", 193.1, 0.0).await.unwrap();
        let high: f64 = {
            let mut acc = 0.0;
            for _ in 0..16 {
                acc += t.read_sample("Ethernet56").await.unwrap().osnr;
            }
            acc / 16.0
        };
        assert!(high > low, "expected OSNR to rise with launch power");
    }

    #[test]
    fn dom_parsing() {
        let out = "\
            Ethernet56:\n\
            RxPower: -12.3 dBm\n\
            TxPower: -2.0 dBm\n\
            OSNR: 21.4 dB\n\
            PreFECBER: 2.0e-5\n";
        let fields = parse_dom(out).unwrap();
        assert_eq!(fields.tx_power, -2.0);
        assert_eq!(fields.osnr, 21.4);
        assert_eq!(fields.pre_fec_ber, 2.0e-5);
        assert!(parse_dom("garbage").is_none());
    }
}
