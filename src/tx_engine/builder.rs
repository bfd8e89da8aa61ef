//! Gated transaction dispatch
//!
//! `send_transaction` is the single path from a strategy's signed payload to
//! the network. Order of checks is fixed: kill switch, shared gate flags, gas
//! estimate, nonce allocation, then bounded submission attempts. Every
//! terminal outcome and every attempt lands in the transaction journal.
//!
//! The nonce is allocated once per dispatch and reused by every attempt.
//! Attempts stop early on a send error classed [`ErrorClass::Fatal`].

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::kill_switch::KillSwitch;
use super::nonce_manager::NonceManager;
use super::types::{TxContext, TxRecord, TxStatus};
use crate::agents::GateState;
use crate::chain::{self, ChainClient};
use crate::config::TxConfig;
use crate::drp::archive::{self, ArchiveSource};
use crate::errors::{ChainError, DrpError, ErrorClass, TxError};
use crate::journal::Journal;
use crate::logger::{self, LogTag};
use crate::metrics;
use crate::notifications::{Notification, WebhookNotifier};
use crate::paths;

const ORIGIN: &str = "tx_builder";

pub struct TransactionBuilder {
    client: Arc<dyn ChainClient>,
    nonces: Arc<NonceManager>,
    kill_switch: KillSwitch,
    gates: Arc<GateState>,
    journal: Journal,
    config: TxConfig,
    notifier: Option<WebhookNotifier>,
}

impl TransactionBuilder {
    pub fn new(
        client: Arc<dyn ChainClient>,
        nonces: Arc<NonceManager>,
        kill_switch: KillSwitch,
        gates: Arc<GateState>,
        config: TxConfig,
    ) -> Self {
        let journal = Journal::new(paths::resolve(&config.tx_log_file));
        Self {
            client,
            nonces,
            kill_switch,
            gates,
            journal,
            config,
            notifier: None,
        }
    }

    pub fn with_journal(mut self, path: PathBuf) -> Self {
        self.journal = Journal::new(path);
        self
    }

    pub fn with_notifier(mut self, notifier: WebhookNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn tx_log_path(&self) -> &Path {
        self.journal.path()
    }

    pub fn nonce_manager(&self) -> &Arc<NonceManager> {
        &self.nonces
    }

    /// Dispatch a signed payload; returns the network transaction hash
    pub async fn send_transaction(
        &self,
        signed_payload: &[u8],
        from_address: &str,
        ctx: &TxContext,
    ) -> Result<String, TxError> {
        let tx_id = chain::tx_id(signed_payload);
        let result = self.dispatch(signed_payload, from_address, ctx, &tx_id).await;

        if let Err(e) = &result {
            if e.is_high_severity() {
                if let Some(notifier) = &self.notifier {
                    notifier
                        .send_best_effort(&Notification::tx_aborted(
                            &tx_id,
                            &ctx.strategy_id,
                            e.to_string(),
                        ))
                        .await;
                }
            }
        }
        result
    }

    async fn dispatch(
        &self,
        signed_payload: &[u8],
        from_address: &str,
        ctx: &TxContext,
        tx_id: &str,
    ) -> Result<String, TxError> {
        // 1. Kill switch, before anything touches the network
        if self.kill_switch.triggered() {
            self.kill_switch.record_kill_event(ORIGIN);
            let mut record = TxRecord::new(tx_id, from_address, ctx, TxStatus::Killed);
            record.kill_triggered = true;
            record.error = Some(TxError::KillSwitchActive.to_string());
            self.journal.record(LogTag::Tx, &record);
            return Err(TxError::KillSwitchActive);
        }

        // 2. Shared gate flags
        if let Some(reason) = self.gates.first_red() {
            logger::warning(
                LogTag::Gate,
                &format!(
                    "Dispatch of {} from strategy '{}' blocked: {}",
                    short(tx_id),
                    ctx.strategy_id,
                    reason
                ),
            );
            return Err(TxError::GateBlocked(reason));
        }

        // 3. Gas estimate with margin; not retried
        let estimate = self
            .client
            .estimate_gas(signed_payload, from_address)
            .await
            .and_then(|estimate| with_margin(estimate, self.config.gas_margin_pct));
        let gas_estimate = match estimate {
            Ok(gas) => gas,
            Err(e) => {
                logger::error(
                    LogTag::Tx,
                    &format!("Gas estimation failed for {}: {}", short(tx_id), e),
                );
                let mut record =
                    TxRecord::new(tx_id, from_address, ctx, TxStatus::GasEstimateFailed);
                record.error = Some(e.to_string());
                self.journal.record(LogTag::Tx, &record);
                return Err(TxError::GasEstimationFailed(e));
            }
        };

        // 4. One nonce for all attempts
        let nonce = self.nonces.get_nonce_for(from_address, tx_id).await?;

        // 5. Bounded submission attempts
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<ChainError> = None;
        let mut attempts_made = 0;
        for attempt in 1..=max_attempts {
            attempts_made = attempt;
            let mut record = TxRecord::new(tx_id, from_address, ctx, TxStatus::Sent);
            record.gas_estimate = Some(gas_estimate);
            record.nonce = Some(nonce);
            record.attempt = attempt;

            match self.client.send_raw_transaction(signed_payload).await {
                Ok(tx_hash) => {
                    logger::info(
                        LogTag::Tx,
                        &format!(
                            "Sent {} nonce={} gas={} attempt={} hash={}",
                            short(tx_id),
                            nonce,
                            gas_estimate,
                            attempt,
                            tx_hash
                        ),
                    );
                    record.tx_hash = Some(tx_hash.clone());
                    self.journal.record(LogTag::Tx, &record);
                    metrics::global().record_tx_sent();
                    return Ok(tx_hash);
                }
                Err(e) => {
                    logger::warning(
                        LogTag::Tx,
                        &format!(
                            "Send attempt {}/{} for {} failed: {}",
                            attempt,
                            max_attempts,
                            short(tx_id),
                            e
                        ),
                    );
                    record.status = TxStatus::Failed;
                    record.error = Some(e.to_string());
                    self.journal.record(LogTag::Tx, &record);
                    let fatal = e.class() == ErrorClass::Fatal;
                    last_error = Some(e);
                    // Unparseable node replies will not improve on resubmission
                    if fatal {
                        break;
                    }
                }
            }

            if attempt < max_attempts {
                let delay = self.config.retry_base_delay_ms * u64::from(attempt);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        // 6. Exhausted
        let last = last_error
            .unwrap_or_else(|| ChainError::Transport("no send attempt made".to_string()));
        logger::error(
            LogTag::Tx,
            &format!(
                "Giving up on {} after {} attempts: {}",
                short(tx_id),
                attempts_made,
                last
            ),
        );
        metrics::global().record_tx_failed();
        Err(TxError::SendFailed {
            attempts: attempts_made,
            last,
        })
    }

    pub async fn snapshot(&self, path: &Path) -> Result<(), TxError> {
        self.nonces.snapshot(path).await.map_err(TxError::from)
    }

    pub async fn restore(&self, path: &Path) -> Result<(), TxError> {
        self.nonces.restore(path).await.map_err(TxError::from)
    }

    /// Bundle the tx journal and a fresh nonce snapshot into a gzip tar
    pub async fn export_drp(&self, archive_path: &Path, snapshot_path: &Path) -> Result<(), DrpError> {
        self.nonces
            .snapshot(snapshot_path)
            .await
            .map_err(|e| DrpError::ExportFailed(e.to_string()))?;

        let sources = [self.journal.path(), snapshot_path]
            .iter()
            .map(|p| ArchiveSource::new(*p, basename(p)))
            .collect::<Vec<_>>();
        archive::write_archive(archive_path, &sources)?;

        logger::info(
            LogTag::Drp,
            &format!(
                "Transaction state exported to {} at {}",
                archive_path.display(),
                Utc::now().to_rfc3339()
            ),
        );
        Ok(())
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Estimate plus `margin_pct` percent, floored; overflow is a bad estimate
fn with_margin(estimate: u64, margin_pct: u64) -> Result<u64, ChainError> {
    estimate
        .checked_mul(100 + margin_pct)
        .map(|scaled| scaled / 100)
        .ok_or_else(|| {
            ChainError::MalformedResponse(format!(
                "gas estimate {} overflows with {}% margin",
                estimate, margin_pct
            ))
        })
}

fn short(tx_id: &str) -> &str {
    tx_id.get(..12).unwrap_or(tx_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::errors::GateReason;
    use crate::tx_engine::kill_switch::tests::test_switch;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    const FROM: &str = "0xAbC0000000000000000000000000000000000001";

    struct Harness {
        _dir: TempDir,
        chain: Arc<MockChain>,
        gates: Arc<GateState>,
        builder: TransactionBuilder,
    }

    fn harness(chain: MockChain, env_var: &str) -> Harness {
        let dir = TempDir::new().unwrap();
        let chain = Arc::new(chain);
        let nonces = Arc::new(NonceManager::new(
            chain.clone(),
            dir.path().join("state/nonce_cache.json"),
            dir.path().join("logs/nonce_log.json"),
        ));
        let gates = Arc::new(GateState::new(true));
        let config = TxConfig {
            retry_base_delay_ms: 1,
            ..TxConfig::default()
        };
        let builder = TransactionBuilder::new(
            chain.clone(),
            nonces,
            test_switch(&dir, env_var),
            gates.clone(),
            config,
        )
        .with_journal(dir.path().join("logs/tx_log.json"));
        Harness {
            _dir: dir,
            chain,
            gates,
            builder,
        }
    }

    fn records(h: &Harness) -> Vec<TxRecord> {
        crate::journal::read_entries(h.builder.tx_log_path()).unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_applies_gas_margin() {
        let h = harness(MockChain::new().with_count(FROM, 5).with_gas(Ok(21_000)), "TG_TXB_HAPPY");
        let ctx = TxContext::new("arb");
        let sent = metrics::global().snapshot().tx_sent;

        let hash = h.builder.send_transaction(b"signed", FROM, &ctx).await.unwrap();
        assert_eq!(hash, "0xhash1_6");
        assert!(metrics::global().snapshot().tx_sent > sent);

        let recs = records(&h);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, TxStatus::Sent);
        assert_eq!(recs[0].gas_estimate, Some(25_200));
        assert_eq!(recs[0].nonce, Some(5));
        assert_eq!(recs[0].attempt, 1);
        assert_eq!(recs[0].tx_id, chain::tx_id(b"signed"));
    }

    #[tokio::test]
    async fn test_kill_switch_file_makes_no_network_calls() {
        let h = harness(MockChain::new(), "TG_TXB_KILL_FILE");
        h.builder.kill_switch.engage("test").unwrap();

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::KillSwitchActive));
        assert_eq!(h.chain.network_calls(), 0);

        let recs = records(&h);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, TxStatus::Killed);
        assert!(recs[0].kill_triggered);
    }

    #[tokio::test]
    async fn test_kill_switch_env_makes_no_network_calls() {
        let h = harness(MockChain::new(), "TG_TXB_KILL_ENV");
        std::env::set_var("TG_TXB_KILL_ENV", "1");

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        std::env::remove_var("TG_TXB_KILL_ENV");

        assert!(matches!(err, TxError::KillSwitchActive));
        assert_eq!(h.chain.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_red_gate_blocks_before_network() {
        let h = harness(MockChain::new(), "TG_TXB_GATE");
        h.gates.set_paused(true);

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::GateBlocked(GateReason::OpsPaused)));
        assert_eq!(h.chain.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_gas_failure_is_not_retried_and_allocates_no_nonce() {
        let h = harness(
            MockChain::new().with_gas(Err(ChainError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
            })),
            "TG_TXB_GAS",
        );

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::GasEstimationFailed(_)));
        assert_eq!(h.chain.estimate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.chain.count_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.chain.send_calls.load(Ordering::SeqCst), 0);
        assert_eq!(records(&h)[0].status, TxStatus::GasEstimateFailed);
    }

    #[tokio::test]
    async fn test_always_failing_network_logs_three_failures() {
        let h = harness(
            MockChain::new().failing_sends(ChainError::Transport("connection refused".to_string())),
            "TG_TXB_FAIL",
        );
        let failed = metrics::global().snapshot().tx_failed;

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        match err {
            TxError::SendFailed { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, ChainError::Transport("connection refused".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(metrics::global().snapshot().tx_failed > failed);

        let recs = records(&h);
        assert_eq!(recs.iter().filter(|r| r.status == TxStatus::Failed).count(), 3);
        assert!(recs.iter().all(|r| r.status != TxStatus::Sent));
        assert_eq!(
            recs.iter().map(|r| r.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_oversized_gas_estimate_is_rejected() {
        let h = harness(MockChain::new().with_gas(Ok(u64::MAX / 50)), "TG_TXB_GAS_OVERFLOW");

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TxError::GasEstimationFailed(ChainError::MalformedResponse(_))
        ));
        assert_eq!(h.chain.count_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.chain.send_calls.load(Ordering::SeqCst), 0);
        assert_eq!(records(&h)[0].status, TxStatus::GasEstimateFailed);
    }

    #[test]
    fn test_with_margin_floors() {
        assert_eq!(with_margin(21_000, 20).unwrap(), 25_200);
        assert_eq!(with_margin(7, 20).unwrap(), 8);
        assert!(with_margin(u64::MAX, 0).is_err());
    }

    #[tokio::test]
    async fn test_malformed_send_reply_is_not_retried() {
        let h = harness(
            MockChain::new().failing_sends(ChainError::MalformedResponse("no result".to_string())),
            "TG_TXB_MALFORMED",
        );

        let err = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::SendFailed { attempts: 1, .. }));
        assert_eq!(h.chain.send_calls.load(Ordering::SeqCst), 1);

        let recs = records(&h);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].status, TxStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_reuses_single_nonce() {
        let h = harness(
            MockChain::new().with_count(FROM, 9).scripted_sends(vec![
                Err(ChainError::Timeout(10)),
                Ok("0xfinal".to_string()),
            ]),
            "TG_TXB_RETRY",
        );

        let hash = h
            .builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap();
        assert_eq!(hash, "0xfinal");

        let recs = records(&h);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.nonce == Some(9)));
        assert_eq!(h.builder.nonce_manager().peek(FROM).await, Some(10));
    }

    #[tokio::test]
    async fn test_export_drp_bundles_log_and_snapshot() {
        let h = harness(MockChain::new().with_count(FROM, 2), "TG_TXB_EXPORT");
        h.builder
            .send_transaction(b"signed", FROM, &TxContext::default())
            .await
            .unwrap();

        let out = TempDir::new().unwrap();
        let archive_path = out.path().join("drp_export_test.tar.gz");
        let snapshot = out.path().join("nonce_snapshot.json");
        h.builder.export_drp(&archive_path, &snapshot).await.unwrap();

        let members = archive::list_members(&archive_path).unwrap();
        assert_eq!(members, vec!["tx_log.json", "nonce_snapshot.json"]);

        let dest = TempDir::new().unwrap();
        archive::extract_archive(&archive_path, dest.path()).unwrap();
        let restored: std::collections::BTreeMap<String, u64> = serde_json::from_str(
            &std::fs::read_to_string(dest.path().join("nonce_snapshot.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(restored.get(&FROM.to_lowercase()), Some(&3));
    }
}
