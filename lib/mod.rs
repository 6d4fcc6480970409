// lib: RCON fan-out - run one command cycle per server concurrently
// and deliver each outcome as soon as its cycle finishes.

// Re-export core protocol and types
pub use rcon_core::*;

// Re-export transport abstractions
pub use rcon_transport::{TcpTransport, Transport, TransportError};

// Re-export the client layer
pub use rcon_client::{call, call_over, call_with, CycleConfig, RconError, Session};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one (server, command) pair, delivered as soon as it completes.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Position of the pair in the dispatched sequence
    pub index: usize,
    pub server: ServerDescriptor,
    pub command: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Lets the coordinator abandon one in-flight cycle.
///
/// The cycle itself never looks at the flag. Its delivery is dropped once
/// it finishes, and its transport has already closed by its own deadline.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new() -> Self {
        CancelHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Receiving end of one dispatch.
///
/// Iterating yields deliveries in completion order and ends once every
/// cycle has either delivered or been cancelled.
pub struct Dispatch {
    receiver: Receiver<Delivery>,
    submitted: usize,
    delivered: usize,
}

impl Dispatch {
    /// Number of pairs submitted.
    pub fn len(&self) -> usize {
        self.submitted
    }

    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Wait up to `timeout` for the next delivery.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Delivery> {
        match self.receiver.recv_timeout(timeout) {
            Ok(delivery) => {
                self.delivered += 1;
                Some(delivery)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Hand every delivery to `on_delivery` as it arrives.
    pub fn for_each_delivery(self, mut on_delivery: impl FnMut(Delivery)) {
        for delivery in self {
            on_delivery(delivery);
        }
    }
}

impl Iterator for Dispatch {
    type Item = Delivery;

    fn next(&mut self) -> Option<Delivery> {
        // Disconnects once every worker has exited
        let delivery = self.receiver.recv().ok()?;
        self.delivered += 1;
        Some(delivery)
    }
}

/// Launches independent cycles and tracks them by target key.
pub struct Coordinator {
    config: CycleConfig,
    registry: Mutex<HashMap<String, Vec<CancelHandle>>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_config(CycleConfig::global())
    }

    pub fn with_config(config: CycleConfig) -> Self {
        Coordinator {
            config,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Run `command` against every server concurrently.
    pub fn dispatch(&self, servers: &[ServerDescriptor], command: &str) -> Dispatch {
        let pairs = servers
            .iter()
            .map(|server| (server.clone(), command.to_string()))
            .collect();
        self.dispatch_pairs(pairs)
    }

    /// Run each (server, command) pair on its own thread.
    pub fn dispatch_pairs(&self, pairs: Vec<(ServerDescriptor, String)>) -> Dispatch {
        let (tx, rx) = unbounded();
        let submitted = pairs.len();

        for (index, (server, command)) in pairs.into_iter().enumerate() {
            let handle = CancelHandle::new();
            self.register(&server.key(), handle.clone());
            self.spawn_cycle(index, server, command, handle, tx.clone());
        }

        Dispatch {
            receiver: rx,
            submitted,
            delivered: 0,
        }
    }

    /// Cancel whatever is in flight for `server`, then dispatch to it again.
    pub fn refresh(&self, server: &ServerDescriptor, command: &str) -> Dispatch {
        let cancelled = self.cancel(&server.key());
        if cancelled > 0 {
            debug!(server = %server.label, cancelled, "refreshing in-flight cycle");
        }
        self.dispatch(std::slice::from_ref(server), command)
    }

    /// Abandon every in-flight cycle for `key`. Returns how many were newly flagged.
    ///
    /// Cancelled cycles stay registered until their thread finishes, so
    /// [`in_flight`](Self::in_flight) keeps reporting them while their
    /// socket is still open.
    pub fn cancel(&self, key: &str) -> usize {
        let mut registry = self.lock_registry();
        Self::prune(&mut registry);
        let Some(handles) = registry.get(key) else {
            return 0;
        };
        let mut flagged = 0;
        for handle in handles.iter().filter(|h| !h.is_cancelled()) {
            handle.cancel();
            flagged += 1;
        }
        flagged
    }

    /// Whether any cycle for `key` is still running, cancelled or not.
    pub fn in_flight(&self, key: &str) -> bool {
        let mut registry = self.lock_registry();
        Self::prune(&mut registry);
        registry.contains_key(key)
    }

    fn register(&self, key: &str, handle: CancelHandle) {
        let mut registry = self.lock_registry();
        Self::prune(&mut registry);
        registry.entry(key.to_string()).or_default().push(handle);
    }

    fn spawn_cycle(
        &self,
        index: usize,
        server: ServerDescriptor,
        command: String,
        handle: CancelHandle,
        tx: Sender<Delivery>,
    ) {
        let config = self.config;
        // Kept so a spawn failure can still be reported
        let fallback = (server.clone(), command.clone(), tx.clone(), handle.clone());

        let spawned = thread::Builder::new()
            .name(format!("rcon-{}", index))
            .spawn(move || {
                let started = Instant::now();
                let outcome = call_with(&server, &command, &config);
                let delivery = Delivery {
                    index,
                    server,
                    command,
                    outcome,
                    elapsed: started.elapsed(),
                };
                deliver(&handle, &tx, delivery);
            });

        if let Err(e) = spawned {
            let (server, command, tx, handle) = fallback;
            warn!(server = %server.label, error = %e, "failed to spawn rcon worker");
            let delivery = Delivery {
                index,
                server,
                command,
                outcome: Outcome::failure(ErrorKind::UnknownError, format!("failed to spawn worker: {}", e)),
                elapsed: Duration::ZERO,
            };
            deliver(&handle, &tx, delivery);
        }
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<CancelHandle>>> {
        // Registry entries stay consistent even if a holder panicked
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(registry: &mut HashMap<String, Vec<CancelHandle>>) {
        registry.retain(|_, handles| {
            handles.retain(|h| !h.is_finished());
            !handles.is_empty()
        });
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Coordinator::new()
    }
}

fn deliver(handle: &CancelHandle, tx: &Sender<Delivery>, delivery: Delivery) {
    handle.finished.store(true, Ordering::SeqCst);
    if handle.is_cancelled() {
        debug!(server = %delivery.server.label, "discarding cancelled delivery");
        return;
    }
    // The caller may have dropped its Dispatch; nothing to do then
    let _ = tx.send(delivery);
}

/// Dispatch with a default coordinator and wait for every result.
///
/// Results come back in completion order.
pub fn dispatch_all(servers: &[ServerDescriptor], command: &str, config: CycleConfig) -> Vec<Delivery> {
    Coordinator::with_config(config).dispatch(servers, command).collect()
}
