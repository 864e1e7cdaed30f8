//! Session client: owns the discovered endpoint and the schedule
//! snapshot, and serialises all protocol exchanges with the feeder.
//!
//! Every command opens a fresh connection, writes the encoded bytes,
//! optionally reads the schedule the device streams back, and closes
//! the connection again. The device ends the schedule stream by closing
//! its side, so a full read runs to EOF.

use std::io;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use feeder_proto::protocol::SLOT_COUNT;
use feeder_proto::types::{deciseconds_from_seconds, FeedingTime};
use feeder_proto::wire::{decode_schedule, Command};

use crate::discovery::{self, DiscoveryState, Endpoint};
use crate::error::ClientError;

/// Invoked synchronously with the new snapshot after every successful
/// schedule update, in registration order.
pub type UpdateCallback = Box<dyn Fn(&[FeedingTime]) + Send + Sync>;

/// Handle returned by [`FeederClient::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, UpdateCallback)>,
}

struct Inner {
    state_tx: watch::Sender<DiscoveryState>,
    state_rx: watch::Receiver<DiscoveryState>,
    schedule_tx: watch::Sender<Arc<Vec<FeedingTime>>>,
    schedule_rx: watch::Receiver<Arc<Vec<FeedingTime>>>,
    /// Serialises the whole encode-connect-write-read-close-notify
    /// cycle; the device only tolerates one connection at a time.
    op_lock: Mutex<()>,
    subscribers: StdMutex<Subscribers>,
}

/// Remote-control client for one feeder.
///
/// Construction spawns a background task that discovers the device once
/// and then performs an initial schedule fetch. Operations invoked
/// before discovery completes fail with [`ClientError::NotReady`].
pub struct FeederClient {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    background: StdMutex<Option<JoinHandle<()>>>,
}

impl FeederClient {
    /// Start with beacon discovery on the well-known multicast group.
    pub fn start() -> Self {
        Self::spawn(None)
    }

    /// Start against an already-known endpoint, skipping discovery.
    pub fn start_at(endpoint: Endpoint) -> Self {
        Self::spawn(Some(endpoint))
    }

    fn spawn(endpoint: Option<Endpoint>) -> Self {
        let (state_tx, state_rx) = watch::channel(DiscoveryState::default());
        let (schedule_tx, schedule_rx) = watch::channel(Arc::new(Vec::new()));
        let inner = Arc::new(Inner {
            state_tx,
            state_rx,
            schedule_tx,
            schedule_rx,
            op_lock: Mutex::new(()),
            subscribers: StdMutex::new(Subscribers::default()),
        });
        let cancel = CancellationToken::new();

        let task_inner = inner.clone();
        let task_cancel = cancel.clone();
        let background = tokio::spawn(async move {
            task_inner.bootstrap(endpoint, task_cancel).await;
        });

        Self {
            inner,
            cancel,
            background: StdMutex::new(Some(background)),
        }
    }

    /// Fetch the device's schedule and replace the local snapshot.
    pub async fn fetch_schedule(&self) -> Result<(), ClientError> {
        self.inner.run_cycle(Command::Refresh).await
    }

    /// Run the dispenser immediately for the given number of seconds.
    /// The device does not echo state back for this command, so the
    /// schedule snapshot and subscribers are untouched.
    pub async fn manual_feed(&self, seconds: f32) -> Result<(), ClientError> {
        let deciseconds = deciseconds_from_seconds(seconds)?;
        self.inner
            .run_cycle(Command::ManualFeed { deciseconds })
            .await
    }

    /// Schedule a feeding at the time's slot, then re-fetch.
    pub async fn create_feeding_time(&self, time: FeedingTime) -> Result<(), ClientError> {
        self.inner.run_cycle(Command::Create(time)).await
    }

    /// Remove the feeding at the time's slot, then re-fetch.
    pub async fn delete_feeding_time(&self, time: FeedingTime) -> Result<(), ClientError> {
        self.inner.run_cycle(Command::Delete { slot: time.slot }).await
    }

    /// Latest published schedule snapshot, sorted by local time of day.
    /// Never blocks; momentarily empty while a fetch is in progress.
    pub fn schedule(&self) -> Arc<Vec<FeedingTime>> {
        self.inner.schedule_rx.borrow().clone()
    }

    /// First unused slot on the feeder, or `None` when all are taken.
    pub fn available_slot(&self) -> Option<u8> {
        first_free_slot(&self.schedule())
    }

    /// Current discovery progress.
    pub fn discovery_state(&self) -> DiscoveryState {
        self.inner.state_rx.borrow().clone()
    }

    /// Wait until discovery has settled. Returns the endpoint, or
    /// `NotReady` if discovery failed or the client was shut down.
    pub async fn wait_ready(&self) -> Result<Endpoint, ClientError> {
        let mut rx = self.inner.state_rx.clone();
        loop {
            match &*rx.borrow_and_update() {
                DiscoveryState::Ready(endpoint) => return Ok(*endpoint),
                DiscoveryState::Failed(_) => return Err(ClientError::NotReady),
                DiscoveryState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(ClientError::NotReady);
            }
        }
    }

    /// Register a schedule-updated callback.
    pub fn subscribe(
        &self,
        callback: impl Fn(&[FeedingTime]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut subs = self.inner.subscribers.lock().unwrap();
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.entries.push((id, Box::new(callback)));
        id
    }

    /// Remove a previously registered callback. Returns whether the
    /// subscription was still present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subscribers.lock().unwrap();
        let before = subs.entries.len();
        subs.entries.retain(|(sub_id, _)| *sub_id != id);
        subs.entries.len() != before
    }

    /// Stop the background task and refuse further operations. A
    /// pending discovery is aborted; an in-flight command cycle runs to
    /// completion first.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let background = self.background.lock().unwrap().take();
        if let Some(handle) = background {
            if let Err(e) = handle.await {
                tracing::error!("Background task failed: {}", e);
            }
        }
        self.inner
            .state_tx
            .send_replace(DiscoveryState::Failed("client shut down".into()));
        tracing::info!("Feeder client shut down");
    }
}

impl Inner {
    /// Discover the device once, then do the initial schedule fetch.
    async fn bootstrap(self: Arc<Self>, endpoint: Option<Endpoint>, cancel: CancellationToken) {
        let resolved = match endpoint {
            Some(endpoint) => Ok(endpoint),
            None => tokio::select! {
                result = discovery::listen_for_beacon() => result,
                _ = cancel.cancelled() => {
                    tracing::info!("Discovery cancelled");
                    return;
                }
            },
        };

        match resolved {
            Ok(endpoint) => {
                self.state_tx.send_replace(DiscoveryState::Ready(endpoint));
                tokio::select! {
                    result = self.run_cycle(Command::Refresh) => {
                        if let Err(e) = result {
                            tracing::error!("Initial schedule fetch failed: {}", e);
                        }
                    }
                    // Dropping the cycle closes its connection
                    _ = cancel.cancelled() => {
                        tracing::info!("Shut down before the initial fetch completed");
                    }
                }
            }
            Err(e) => {
                tracing::error!("Discovery failed: {:#}", e);
                self.state_tx
                    .send_replace(DiscoveryState::Failed(format!("{e:#}")));
            }
        }
    }

    /// One serialised protocol cycle. Transport failures are logged and
    /// swallowed here; the caller only sees pre-network failures.
    async fn run_cycle(&self, command: Command) -> Result<(), ClientError> {
        let _guard = self.op_lock.lock().await;

        let endpoint = match &*self.state_rx.borrow() {
            DiscoveryState::Ready(endpoint) => *endpoint,
            _ => return Err(ClientError::NotReady),
        };

        if command.expects_schedule() {
            // Clear first: a failed fetch leaves a visibly empty
            // schedule, never a stale one. Subscribers are only told
            // about the replacement below.
            self.schedule_tx.send_replace(Arc::new(Vec::new()));
        }

        match self.exchange(endpoint, &command).await {
            Ok(Some(bytes)) => {
                let times = decode_schedule(&bytes);
                tracing::debug!("Schedule updated, {} entries", times.len());
                let snapshot = Arc::new(times);
                self.schedule_tx.send_replace(snapshot.clone());
                self.notify(&snapshot);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Command {:?} failed: {}", command, e);
            }
        }
        Ok(())
    }

    /// Open a fresh connection, write the command, read the response if
    /// one is expected. The connection is dropped on every path.
    async fn exchange(&self, endpoint: Endpoint, command: &Command) -> io::Result<Option<Vec<u8>>> {
        let mut stream = TcpStream::connect((endpoint.host, endpoint.port)).await?;
        stream.set_nodelay(true)?;
        stream.write_all(&command.encode()).await?;
        stream.flush().await?;

        if !command.expects_schedule() {
            return Ok(None);
        }

        // The device marks end-of-schedule by closing the connection
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;
        Ok(Some(bytes))
    }

    fn notify(&self, times: &[FeedingTime]) {
        let subs = self.subscribers.lock().unwrap();
        for (_, callback) in subs.entries.iter() {
            callback(times);
        }
    }
}

/// First slot in 0..18 not occupied by any entry.
fn first_free_slot(times: &[FeedingTime]) -> Option<u8> {
    (0..SLOT_COUNT).find(|slot| !times.iter().any(|ft| ft.slot == *slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(slot: u8) -> FeedingTime {
        FeedingTime::from_utc(slot, 8, 0, 10)
    }

    #[test]
    fn empty_schedule_has_slot_zero_free() {
        assert_eq!(first_free_slot(&[]), Some(0));
    }

    #[test]
    fn first_gap_wins() {
        let times: Vec<_> = [0, 1, 3].into_iter().map(at).collect();
        assert_eq!(first_free_slot(&times), Some(2));
    }

    #[test]
    fn full_table_has_no_free_slot() {
        let times: Vec<_> = (0..SLOT_COUNT).map(at).collect();
        assert_eq!(first_free_slot(&times), None);
    }
}
