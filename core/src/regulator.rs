//! Regulator filing gateway.
//!
//! The real gateway is an unreliable remote system. `SimulatedRegulator`
//! stands in for it in the runner and in tests, failing a configured
//! fraction of calls from a seeded stream.

use crate::{
    config::RegulatorConfig,
    report::RegulatoryReport,
    rng::{StreamRng, StreamSlot},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub acknowledgment_number: String,
}

#[async_trait]
pub trait RegulatorSubmit: Send + Sync {
    async fn submit(&self, report: &RegulatoryReport) -> anyhow::Result<SubmissionReceipt>;
}

pub struct SimulatedRegulator {
    failure_rate: f64,
    state: Mutex<SimState>,
}

struct SimState {
    rng: StreamRng,
    sequence: u64,
}

impl SimulatedRegulator {
    pub fn new(config: &RegulatorConfig) -> Self {
        Self {
            failure_rate: config.failure_rate,
            state: Mutex::new(SimState {
                rng: StreamRng::new(config.seed, StreamSlot::Regulator),
                sequence: 0,
            }),
        }
    }

    /// Number of receipts issued so far.
    pub fn accepted(&self) -> u64 {
        self.state.lock().map(|s| s.sequence).unwrap_or_default()
    }
}

#[async_trait]
impl RegulatorSubmit for SimulatedRegulator {
    async fn submit(&self, report: &RegulatoryReport) -> anyhow::Result<SubmissionReceipt> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("simulated regulator state poisoned"))?;

        if state.rng.chance(self.failure_rate) {
            anyhow::bail!("regulator gateway unavailable");
        }

        state.sequence += 1;
        let prefix = report.report_type.as_str();
        let token = state.rng.next_u64() & 0xFFFF_FFFF;
        Ok(SubmissionReceipt {
            submission_id: format!("{prefix}-{:06}", state.sequence),
            acknowledgment_number: format!("ACK{token:08X}"),
        })
    }
}
