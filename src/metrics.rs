//! Process-wide safety counters
//!
//! Counters only ever increase. Components bump them at the point where the
//! event is decided; `snapshot` and `render` read them without locking.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    alerts: AtomicU64,
    kill_events: AtomicU64,
    drp_anomalies: AtomicU64,
    tx_sent: AtomicU64,
    tx_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub alerts: u64,
    pub kill_events: u64,
    pub drp_anomalies: u64,
    pub tx_sent: u64,
    pub tx_failed: u64,
}

static METRICS: Metrics = Metrics::new();

/// The counters shared by every component in this process
pub fn global() -> &'static Metrics {
    &METRICS
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            alerts: AtomicU64::new(0),
            kill_events: AtomicU64::new(0),
            drp_anomalies: AtomicU64::new(0),
            tx_sent: AtomicU64::new(0),
            tx_failed: AtomicU64::new(0),
        }
    }

    /// Risk breach or automatic pause
    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kill_event(&self) {
        self.kill_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Failed DRP export
    pub fn record_drp_anomaly(&self) {
        self.drp_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_sent(&self) {
        self.tx_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Dispatch that exhausted its send attempts
    pub fn record_tx_failed(&self) {
        self.tx_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            alerts: self.alerts.load(Ordering::Relaxed),
            kill_events: self.kill_events.load(Ordering::Relaxed),
            drp_anomalies: self.drp_anomalies.load(Ordering::Relaxed),
            tx_sent: self.tx_sent.load(Ordering::Relaxed),
            tx_failed: self.tx_failed.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// `name value` lines in Prometheus text exposition order
    pub fn render(&self) -> String {
        format!(
            "alert_count {}\nkill_events_total {}\ndrp_anomalies_total {}\ntx_sent_total {}\ntx_failed_total {}\n",
            self.alerts, self.kill_events, self.drp_anomalies, self.tx_sent, self.tx_failed
        )
    }
}
