//! Manual DNS sessions
//!
//! A manual issuance is split across two parties: a background issuance task
//! whose [`ManualDnsSolver`] parks on every challenge, and the operator side
//! ([`ManualSession`]) that collects the records and later sends the final
//! trigger. They talk over three single-purpose channels:
//!
//! - `dns`: solver → operator, the pending challenge count once per order,
//!   then the cumulative record list once per challenge
//! - `control`: operator → solver, one acknowledgment per record
//! - `cert`: issuance task → operator, the final outcome, exactly once
//!
//! With `P` pending challenges the operator acknowledges `P - 1` records;
//! the last one is only released by the final trigger.
//!
//! Every session owns a [`CancellationToken`]. Dropping or replacing the
//! session cancels it, which releases a parked solver call and ends the
//! background task.
//!
//! [`SessionStore`] keeps sessions for a bounded time, using an injected
//! [`Clock`] so expiry is testable without waiting.

use crate::certificate::Certificate;
use crate::error::{AcmeError, AcmeResult};
use crate::solver::{DnsRecord, ManualDnsSolver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a started manual session stays usable
pub const MANUAL_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Identifier of one manual session, used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Progress of a manual session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualState {
    Idle,
    AwaitingTrigger,
    RecordPublished,
    AwaitingAck,
    AllPublished,
    ObtainInFlight,
    Completed,
    Failed,
    Cancelled,
}

/// State shared between the solver and operator sides
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<Mutex<ManualState>>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(ManualState::Idle)))
    }

    pub(crate) fn get(&self) -> ManualState {
        *self.0.lock()
    }

    pub(crate) fn set(&self, next: ManualState) {
        let mut state = self.0.lock();
        // Terminal states stick
        if matches!(*state, ManualState::Completed | ManualState::Failed | ManualState::Cancelled) {
            return;
        }
        *state = next;
    }
}

/// Solver → operator message on the `dns` channel
#[derive(Debug)]
pub(crate) enum DnsUpdate {
    /// Challenges the order will present
    Pending(usize),
    /// Every record gathered so far
    Records(Vec<DnsRecord>),
}

/// Sending half given to the background issuance task
pub(crate) type OutcomeSender = mpsc::Sender<AcmeResult<Certificate>>;

/// Open a session: the solver to install on the client, and the operator side
pub fn open() -> (ManualDnsSolver, ManualSession) {
    let id = SessionId::new();
    let cancel = CancellationToken::new();
    let state = SharedState::new();

    let (dns_tx, dns_rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::channel(1);
    let (cert_tx, cert_rx) = mpsc::channel(1);

    let solver = ManualDnsSolver::new(id, dns_tx, control_rx, cancel.clone(), state.clone());
    let session = ManualSession {
        id,
        dns_rx,
        control_tx,
        cert_rx,
        cert_tx: Some(cert_tx),
        cancel,
        state,
        early_outcome: None,
        acknowledgments: 0,
    };

    tracing::debug!("🙋 Opened manual session {}", id);
    (solver, session)
}

/// Operator side of a manual DNS session
pub struct ManualSession {
    id: SessionId,
    dns_rx: mpsc::Receiver<DnsUpdate>,
    control_tx: mpsc::Sender<()>,
    cert_rx: mpsc::Receiver<AcmeResult<Certificate>>,
    cert_tx: Option<OutcomeSender>,
    cancel: CancellationToken,
    state: SharedState,
    /// Outcome that arrived before the final trigger was sent
    early_outcome: Option<AcmeResult<Certificate>>,
    acknowledgments: usize,
}

impl ManualSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> ManualState {
        self.state.get()
    }

    /// Intermediate acknowledgments sent so far
    pub fn acknowledgments(&self) -> usize {
        self.acknowledgments
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Hand the outcome channel to the issuance task; only once per session
    pub(crate) fn start(&mut self) -> AcmeResult<OutcomeSender> {
        if self.state() != ManualState::Idle {
            return Err(AcmeError::Solver(format!(
                "manual session {} was already started",
                self.id
            )));
        }
        let sender = self.cert_tx.take().ok_or(AcmeError::SessionExpired)?;
        self.state.set(ManualState::AwaitingTrigger);
        Ok(sender)
    }

    fn cancelled(&self) -> AcmeError {
        AcmeError::SessionCancelled(self.id.to_string())
    }

    /// Receive a record for every pending challenge, acknowledging all but the last.
    ///
    /// `domain_count` is the expected number of challenges until the driver
    /// announces the real one; already valid authorizations lower it. With
    /// nothing pending the issuance finishes on its own and its outcome is
    /// kept for [`ManualSession::finish`].
    pub(crate) async fn collect_records(
        &mut self,
        domain_count: usize,
    ) -> AcmeResult<Vec<DnsRecord>> {
        let mut expected = domain_count;
        let mut received = 0;
        let mut records = Vec::new();

        loop {
            if received >= expected && received > 0 {
                break;
            }
            match self.next_update().await? {
                Some(DnsUpdate::Pending(pending)) => {
                    tracing::debug!("🙋 Session {} expects {} challenge(s)", self.id, pending);
                    expected = pending;
                    continue;
                }
                Some(DnsUpdate::Records(list)) => {
                    records = list;
                    received += 1;
                }
                None => break,
            }
            if received < expected {
                self.control_tx.send(()).await.map_err(|_| self.cancelled())?;
                self.acknowledgments += 1;
            }
        }

        self.state.set(ManualState::AllPublished);
        tracing::info!("📋 Session {} published {} DNS record(s)", self.id, records.len());
        Ok(records)
    }

    async fn next_update(&mut self) -> AcmeResult<Option<DnsUpdate>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            Some(update) = self.dns_rx.recv() => Ok(Some(update)),
            outcome = self.cert_rx.recv() => match outcome {
                Some(Ok(certificate)) => {
                    self.early_outcome = Some(Ok(certificate));
                    Ok(None)
                }
                Some(Err(e)) => {
                    self.state.set(ManualState::Failed);
                    Err(e)
                }
                None => Err(self.cancelled()),
            },
        }
    }

    /// Send the final trigger and wait for the issuance outcome
    pub(crate) async fn finish(mut self) -> AcmeResult<Certificate> {
        match self.state() {
            ManualState::Idle => return Err(AcmeError::SessionExpired),
            ManualState::Cancelled => return Err(self.cancelled()),
            _ => {}
        }

        let outcome = match self.early_outcome.take() {
            Some(outcome) => outcome,
            None => {
                self.state.set(ManualState::ObtainInFlight);
                if self.control_tx.send(()).await.is_err() {
                    tracing::debug!("🙋 Session {} solver already finished", self.id);
                }
                // The issuance task always reports, cancelled or expired
                match self.cert_rx.recv().await {
                    Some(outcome) => outcome,
                    None => Err(self.cancelled()),
                }
            }
        };

        match &outcome {
            Ok(_) => self.state.set(ManualState::Completed),
            Err(_) => self.state.set(ManualState::Failed),
        }
        outcome
    }
}

impl Drop for ManualSession {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            self.state.set(ManualState::Cancelled);
            self.cancel.cancel();
        }
    }
}

impl fmt::Debug for ManualSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("acknowledgments", &self.acknowledgments)
            .finish()
    }
}

// MARK: - Clock

/// Time source for session expiry
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

// MARK: - Session store

struct StoreEntry<V> {
    value: V,
    expires_at: Instant,
}

/// 🗄️ Expiring map of live sessions
pub struct SessionStore<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, StoreEntry<V>>>,
}

impl<K, V> SessionStore<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `value` under `key`, returning the entry it replaced
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let expires_at = self.clock.now() + self.ttl;
        let replaced = self
            .entries
            .lock()
            .insert(key.clone(), StoreEntry { value, expires_at })
            .map(|entry| entry.value);
        if replaced.is_some() {
            tracing::info!("🔁 Replaced manual session for {:?}", key);
        }
        replaced
    }

    /// Remove and return the live entry for `key`
    pub fn take(&self, key: &K) -> AcmeResult<V> {
        let now = self.clock.now();
        let entry = self.entries.lock().remove(key).ok_or(AcmeError::SessionExpired)?;
        if entry.expires_at <= now {
            tracing::info!("⌛ Manual session for {:?} expired", key);
            return Err(AcmeError::SessionExpired);
        }
        Ok(entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were evicted
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<V> = {
            let mut entries = self.entries.lock();
            let keys: Vec<K> = entries
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter()
                .filter_map(|key| entries.remove(key))
                .map(|entry| entry.value)
                .collect()
        };

        // Values are dropped outside the lock
        let count = expired.len();
        drop(expired);
        if count > 0 {
            tracing::info!("🧹 Evicted {} expired manual session(s)", count);
        }
        count
    }

    /// 🔄 Periodically evict expired entries until the store is dropped
    pub fn start_eviction_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        K: Sync,
        V: Sync,
    {
        let store = Arc::downgrade(self);
        tracing::debug!("🔄 Starting manual session eviction task (interval: {:?})", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.evict_expired();
                    }
                    None => break,
                }
            }
        })
    }
}
