//! Manual DNS-01
//!
//! 🙋 The solver never touches DNS itself. It tells the operator side of the
//! session how many challenges to expect, then each present call publishes
//! the records gathered so far and parks until that side acknowledges, so the
//! driver advances one record at a time.

use super::{Challenge, ChallengeKind, ChallengeSolver, DnsRecord};
use crate::error::{AcmeError, AcmeResult};
use crate::session::{DnsUpdate, ManualState, SessionId, SharedState};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct ManualDnsSolver {
    session_id: SessionId,
    records: Mutex<Vec<DnsRecord>>,
    dns_tx: mpsc::Sender<DnsUpdate>,
    control_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    cancel: CancellationToken,
    state: SharedState,
}

impl ManualDnsSolver {
    pub(crate) fn new(
        session_id: SessionId,
        dns_tx: mpsc::Sender<DnsUpdate>,
        control_rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
        state: SharedState,
    ) -> Self {
        Self {
            session_id,
            records: Mutex::new(Vec::new()),
            dns_tx,
            control_rx: tokio::sync::Mutex::new(control_rx),
            cancel,
            state,
        }
    }

    fn cancelled(&self) -> AcmeError {
        AcmeError::SessionCancelled(self.session_id.to_string())
    }

    async fn publish(&self, update: DnsUpdate) -> AcmeResult<()> {
        tokio::select! {
            sent = self.dns_tx.send(update) => sent.map_err(|_| self.cancelled()),
            _ = self.cancel.cancelled() => Err(self.cancelled()),
        }
    }
}

#[async_trait]
impl ChallengeSolver for ManualDnsSolver {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Dns01
    }

    async fn prepare(&self, pending: usize) -> AcmeResult<()> {
        self.records.lock().clear();
        self.publish(DnsUpdate::Pending(pending)).await
    }

    async fn present(&self, challenge: &Challenge) -> AcmeResult<()> {
        let snapshot = {
            let mut records = self.records.lock();
            let record = challenge.dns_record();
            if !records.contains(&record) {
                records.push(record);
            }
            records.clone()
        };

        self.state.set(ManualState::RecordPublished);
        self.publish(DnsUpdate::Records(snapshot)).await?;

        self.state.set(ManualState::AwaitingAck);
        let mut control = self.control_rx.lock().await;
        tokio::select! {
            ack = control.recv() => match ack {
                Some(()) => {
                    tracing::debug!(
                        "🙋 Session {} acknowledged record for {}",
                        self.session_id,
                        challenge.domain
                    );
                    Ok(())
                }
                None => Err(self.cancelled()),
            },
            _ = self.cancel.cancelled() => Err(self.cancelled()),
        }
    }

    async fn cleanup(&self, challenge: &Challenge) -> AcmeResult<()> {
        tracing::debug!(
            "🧹 {} may be removed by the operator now",
            challenge.dns_record().name
        );
        Ok(())
    }
}
