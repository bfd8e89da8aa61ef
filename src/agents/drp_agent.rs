//! DRP readiness tracking and automated rollback
//!
//! Readiness follows the latest export outcome. When readiness is lost and
//! the newest archive has gone stale, `auto_recover` rolls back from it,
//! at most once per staleness window for a given archive.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::gatekeeper::RecoveryReadiness;
use super::state::GateState;
use crate::drp::{self, RecoveryProcedure};
use crate::errors::DrpError;
use crate::logger::{self, LogTag};
use crate::metrics;
use crate::notifications::{Notification, WebhookNotifier};

pub struct DrpAgent {
    ready: AtomicBool,
    gates: Arc<GateState>,
    procedure: Arc<dyn RecoveryProcedure>,
    notifier: WebhookNotifier,
    last_attempt: Mutex<Option<(PathBuf, SystemTime)>>,
}

impl DrpAgent {
    pub fn new(
        gates: Arc<GateState>,
        procedure: Arc<dyn RecoveryProcedure>,
        notifier: WebhookNotifier,
        initially_ready: bool,
    ) -> Self {
        gates.set_drp_ready(initially_ready);
        Self {
            ready: AtomicBool::new(initially_ready),
            gates,
            procedure,
            notifier,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn procedure(&self) -> &Arc<dyn RecoveryProcedure> {
        &self.procedure
    }

    pub fn record_export(&self, success: bool) {
        self.ready.store(success, Ordering::SeqCst);
        self.gates.set_drp_ready(success);
        if success {
            logger::debug(LogTag::Drp, "DRP export ok; ready");
        } else {
            metrics::global().record_drp_anomaly();
            logger::error(LogTag::Drp, "DRP export failed; trading gated until recovery");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Roll back from the newest stale archive while not ready
    ///
    /// Returns `Ok(true)` only when a rollback ran and succeeded.
    pub async fn auto_recover(&self, export_dir: &Path, timeout: Duration) -> Result<bool, DrpError> {
        if self.is_ready() {
            return Ok(false);
        }

        let Some((archive, modified)) = drp::newest_archive(export_dir)? else {
            logger::warning(
                LogTag::Drp,
                &format!("Auto-recover: no archive in {}", export_dir.display()),
            );
            return Ok(false);
        };

        let now = SystemTime::now();
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= timeout {
            logger::debug(
                LogTag::Drp,
                &format!(
                    "Auto-recover: {} is {}s old, within {}s window",
                    archive.display(),
                    age.as_secs(),
                    timeout.as_secs()
                ),
            );
            return Ok(false);
        }

        {
            let mut last = self.last_attempt.lock();
            if let Some((last_archive, at)) = last.as_ref() {
                let since = now.duration_since(*at).unwrap_or(Duration::ZERO);
                if *last_archive == archive && since < timeout {
                    logger::debug(
                        LogTag::Drp,
                        &format!("Auto-recover already attempted for {}", archive.display()),
                    );
                    return Ok(false);
                }
            }
            *last = Some((archive.clone(), now));
        }

        logger::warning(
            LogTag::Drp,
            &format!(
                "Auto-recover: rolling back from {} ({}s old)",
                archive.display(),
                age.as_secs()
            ),
        );
        let result = self.procedure.rollback(Some(&archive), false).await;
        self.notifier
            .send_best_effort(&Notification::drp_recovery(
                archive.display().to_string(),
                result.is_ok(),
            ))
            .await;

        result?;
        self.record_export(true);
        Ok(true)
    }
}

impl RecoveryReadiness for DrpAgent {
    fn is_ready(&self) -> bool {
        DrpAgent::is_ready(self)
    }
}
