//! Operational health checks and pause control
//!
//! Health checks are named predicates evaluated in registration order. Any
//! check that returns `Ok(false)` or an error pauses trading through the
//! shared gate state. Resuming needs an `ops_resume` approval.

use parking_lot::Mutex;
use std::sync::Arc;

use super::founder_gate::{FounderGate, ACTION_OPS_RESUME};
use super::gatekeeper::PauseSignal;
use super::state::GateState;
use crate::logger::{self, LogTag};
use crate::metrics;
use crate::notifications::{Notification, WebhookNotifier};

pub type HealthCheck = Box<dyn Fn() -> Result<bool, String> + Send + Sync>;

pub const HEALTH_FAIL: &str = "health_fail";

pub struct OpsAgent {
    checks: Vec<(String, HealthCheck)>,
    gates: Arc<GateState>,
    notifier: WebhookNotifier,
    founder: FounderGate,
    pause_reason: Mutex<Option<String>>,
}

impl OpsAgent {
    pub fn new(gates: Arc<GateState>, notifier: WebhookNotifier, founder: FounderGate) -> Self {
        Self {
            checks: Vec::new(),
            gates,
            notifier,
            founder,
            pause_reason: Mutex::new(None),
        }
    }

    pub fn register_check<F>(&mut self, name: &str, check: F)
    where
        F: Fn() -> Result<bool, String> + Send + Sync + 'static,
    {
        self.checks.push((name.to_string(), Box::new(check)));
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run every check; returns the names that failed
    ///
    /// A non-empty result has already paused trading.
    pub fn run_checks(&self) -> Vec<String> {
        let mut failures = Vec::new();
        for (name, check) in &self.checks {
            match check() {
                Ok(true) => {}
                Ok(false) => failures.push(name.clone()),
                Err(e) => {
                    logger::error(
                        LogTag::Ops,
                        &format!("Health check '{}' raised: {}", name, e),
                    );
                    failures.push(name.clone());
                }
            }
        }

        if failures.is_empty() {
            logger::debug(LogTag::Ops, "Health checks ok");
        } else {
            logger::error(
                LogTag::Ops,
                &format!("Health checks failed: {}", failures.join(",")),
            );
            self.auto_pause(HEALTH_FAIL);
        }
        failures
    }

    /// Pause trading; returns false if already paused
    pub fn auto_pause(&self, reason: &str) -> bool {
        let mut current = self.pause_reason.lock();
        if self.gates.set_paused(true) {
            return false;
        }
        *current = Some(reason.to_string());
        metrics::global().record_alert();
        logger::error(LogTag::Ops, &format!("Trading auto-paused: {}", reason));
        true
    }

    /// Pause and alert the webhook if this call did the pausing
    pub async fn auto_pause_and_notify(&self, reason: &str) {
        if self.auto_pause(reason) {
            self.notifier
                .send_best_effort(&Notification::ops_paused(reason))
                .await;
        }
    }

    pub fn paused(&self) -> bool {
        self.gates.is_paused()
    }

    pub fn pause_reason(&self) -> Option<String> {
        self.pause_reason.lock().clone()
    }

    /// Clear the pause with an `ops_resume` approval
    pub fn resume(&self, approved: bool, founder_token: Option<&str>) -> bool {
        if !approved || !self.founder.check(ACTION_OPS_RESUME, founder_token) {
            logger::warning(LogTag::Ops, "Resume rejected");
            return false;
        }
        let mut current = self.pause_reason.lock();
        self.gates.set_paused(false);
        *current = None;
        logger::warning(LogTag::Ops, "Trading resumed");
        true
    }

    /// Best-effort post to the alert webhook
    pub async fn notify(&self, message: &str) {
        logger::info(LogTag::Ops, &format!("Notify: {}", message));
        if let Err(e) = self.notifier.send_message(message).await {
            logger::debug(LogTag::Ops, &format!("Notify failed: {}", e));
        }
    }
}

impl PauseSignal for OpsAgent {
    fn paused(&self) -> bool {
        OpsAgent::paused(self)
    }
}
