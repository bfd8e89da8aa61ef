//! Notification types for operator alerts
//!
//! Defines the alerts the gating layer can push to the ops webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of notifications that can be sent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NotificationType {
    /// A dispatch was aborted by a gate or exhausted its retries
    TxAborted {
        tx_id: String,
        strategy_id: String,
        reason: String,
    },

    /// The capital circuit breaker tripped
    CapitalLocked {
        balance: f64,
        drawdown_pct: f64,
        losses: f64,
    },

    /// Trading paused by the ops agent
    OpsPaused { reason: String },

    /// Automated rollback ran from a DRP archive
    DrpRecovery { archive: String, success: bool },

    /// Free-form message (e.g. `OpsAgent::notify`)
    Message { text: String },

    /// System error or warning notification
    SystemError {
        message: String,
        severity: ErrorSeverity,
    },
}

/// Severity levels for alerts
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A notification with timestamp
#[derive(Clone, Debug)]
pub struct Notification {
    pub notification_type: NotificationType,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Create a new notification with current timestamp
    pub fn new(notification_type: NotificationType) -> Self {
        Self {
            notification_type,
            timestamp: Utc::now(),
        }
    }

    pub fn tx_aborted(tx_id: &str, strategy_id: &str, reason: String) -> Self {
        Self::new(NotificationType::TxAborted {
            tx_id: tx_id.to_string(),
            strategy_id: strategy_id.to_string(),
            reason,
        })
    }

    pub fn capital_locked(balance: f64, drawdown_pct: f64, losses: f64) -> Self {
        Self::new(NotificationType::CapitalLocked {
            balance,
            drawdown_pct,
            losses,
        })
    }

    pub fn ops_paused(reason: &str) -> Self {
        Self::new(NotificationType::OpsPaused {
            reason: reason.to_string(),
        })
    }

    pub fn drp_recovery(archive: String, success: bool) -> Self {
        Self::new(NotificationType::DrpRecovery { archive, success })
    }

    pub fn message(text: &str) -> Self {
        Self::new(NotificationType::Message {
            text: text.to_string(),
        })
    }

    /// Create a system error notification
    pub fn system_error(message: String, severity: ErrorSeverity) -> Self {
        Self::new(NotificationType::SystemError { message, severity })
    }

    pub fn severity(&self) -> ErrorSeverity {
        match &self.notification_type {
            NotificationType::TxAborted { .. } => ErrorSeverity::Error,
            NotificationType::CapitalLocked { .. } => ErrorSeverity::Critical,
            NotificationType::OpsPaused { .. } => ErrorSeverity::Warning,
            NotificationType::DrpRecovery { success, .. } => {
                if *success {
                    ErrorSeverity::Warning
                } else {
                    ErrorSeverity::Critical
                }
            }
            NotificationType::Message { .. } => ErrorSeverity::Info,
            NotificationType::SystemError { severity, .. } => *severity,
        }
    }

    /// Plain-text rendering posted as the webhook `text` field
    pub fn render(&self) -> String {
        match &self.notification_type {
            NotificationType::TxAborted {
                tx_id,
                strategy_id,
                reason,
            } => format!(
                "[{}] transaction {} from strategy '{}' aborted: {}",
                self.severity(),
                short_id(tx_id),
                strategy_id,
                reason
            ),
            NotificationType::CapitalLocked {
                balance,
                drawdown_pct,
                losses,
            } => format!(
                "[{}] capital lock engaged: balance {:.2}, drawdown {:.2}%, losses {:.2}",
                self.severity(),
                balance,
                drawdown_pct,
                losses
            ),
            NotificationType::OpsPaused { reason } => {
                format!("[{}] trading paused: {}", self.severity(), reason)
            }
            NotificationType::DrpRecovery { archive, success } => format!(
                "[{}] DRP rollback from {} {}",
                self.severity(),
                archive,
                if *success { "succeeded" } else { "failed" }
            ),
            NotificationType::Message { text } => text.clone(),
            NotificationType::SystemError { message, severity } => {
                format!("[{}] {}", severity, message)
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
