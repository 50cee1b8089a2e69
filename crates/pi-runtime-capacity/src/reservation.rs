//! Global/per-class capacity reservation with lease lifecycle (§4.5).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use pi_runtime_core::LeaseId;
use pi_runtime_core::{EventListeners, RuntimeError, RuntimeEvent};
use tokio::sync::oneshot;

use crate::config::CapacityConfig;
use crate::events::CapacityEvent;

/// Point-in-time view of registry occupancy, handed to listeners and `subscribe`rs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub active_requests: usize,
    pub active_llm: usize,
    pub pending_requests: usize,
    pub pending_llm: usize,
    pub max_total_active_requests: usize,
    pub max_total_active_llm: usize,
}

struct LeaseRecord {
    owner_pid: u32,
    requests_charged: usize,
    llm_charged: usize,
    #[allow(dead_code)]
    provider: Option<String>,
    #[allow(dead_code)]
    model: Option<String>,
    #[allow(dead_code)]
    acquired_at: Instant,
    heartbeat_at: Instant,
}

struct PendingEntry {
    id: u64,
    enqueued_at: Instant,
    requests_needed: usize,
    llm_needed: usize,
    priority: i32,
    owner_pid: u32,
    provider: Option<String>,
    model: Option<String>,
    notify: Option<oneshot::Sender<Result<LeaseId, RuntimeError>>>,
}

struct State {
    active_requests: usize,
    active_llm: usize,
    max_total_active_requests: usize,
    max_total_active_llm: usize,
    leases: HashMap<LeaseId, LeaseRecord>,
    pending: Vec<PendingEntry>,
}

impl State {
    fn pending_requests(&self) -> usize {
        self.pending.iter().map(|p| p.requests_needed).sum()
    }

    fn pending_llm(&self) -> usize {
        self.pending.iter().map(|p| p.llm_needed).sum()
    }

    fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            active_requests: self.active_requests,
            active_llm: self.active_llm,
            pending_requests: self.pending_requests(),
            pending_llm: self.pending_llm(),
            max_total_active_requests: self.max_total_active_requests,
            max_total_active_llm: self.max_total_active_llm,
        }
    }

    fn fits(&self, requests: usize, llm: usize) -> bool {
        self.active_requests + requests <= self.max_total_active_requests
            && self.active_llm + llm <= self.max_total_active_llm
    }
}

/// A request for capacity, described ahead of time so [`CapacityRegistry::reserve`]
/// can admit it immediately or queue it.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub requests: usize,
    pub llm: usize,
    pub priority: i32,
    pub owner_pid: u32,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl ReservationRequest {
    pub fn new(requests: usize, llm: usize, owner_pid: u32) -> Self {
        Self {
            requests,
            llm,
            priority: 0,
            owner_pid,
            provider: None,
            model: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

type Subscriber = Arc<dyn Fn(&RuntimeSnapshot) + Send + Sync>;

/// Process-wide registry tracking active leases and a priority-ordered pending queue.
pub struct CapacityRegistry {
    lease_ttl: Duration,
    pending_ttl: Duration,
    state: Mutex<State>,
    next_pending_id: AtomicU64,
    next_subscriber_id: AtomicU64,
    events: EventListeners<CapacityEvent>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
}

impl CapacityRegistry {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            lease_ttl: config.lease_ttl,
            pending_ttl: config.pending_ttl,
            state: Mutex::new(State {
                active_requests: 0,
                active_llm: 0,
                max_total_active_requests: config.max_total_active_requests,
                max_total_active_llm: config.max_total_active_llm,
                leases: HashMap::new(),
                pending: Vec::new(),
            }),
            next_pending_id: AtomicU64::new(1),
            next_subscriber_id: AtomicU64::new(1),
            events: EventListeners::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_listener<L>(mut self, listener: L) -> Self
    where
        L: pi_runtime_core::EventListener<CapacityEvent> + 'static,
    {
        self.events.add(listener);
        self
    }

    /// Admits immediately if capacity allows, otherwise queues FIFO-within-priority
    /// and waits until admitted, cancelled, or the pending TTL elapses.
    pub async fn reserve(
        &self,
        req: ReservationRequest,
        cancel: impl Future<Output = ()>,
    ) -> Result<LeaseId, RuntimeError> {
        let (rx, pending_id) = {
            let mut state = self.state.lock().unwrap();
            self.evict_expired(&mut state);

            if state.pending.is_empty() && state.fits(req.requests, req.llm) {
                let id = self.admit(&mut state, &req);
                let snapshot = state.snapshot();
                drop(state);
                self.events.emit(&CapacityEvent::Admitted {
                    timestamp: Instant::now(),
                    snapshot,
                });
                return Ok(id);
            }

            let (tx, rx) = oneshot::channel();
            let pending_id = self.next_pending_id.fetch_add(1, Ordering::SeqCst);
            state.pending.push(PendingEntry {
                id: pending_id,
                enqueued_at: Instant::now(),
                requests_needed: req.requests,
                llm_needed: req.llm,
                priority: req.priority,
                owner_pid: req.owner_pid,
                provider: req.provider.clone(),
                model: req.model.clone(),
                notify: Some(tx),
            });
            let snapshot = state.snapshot();
            drop(state);
            self.events.emit(&CapacityEvent::Queued {
                timestamp: Instant::now(),
                snapshot,
            });
            (rx, pending_id)
        };

        tokio::pin!(cancel);
        let sleep = tokio::time::sleep(self.pending_ttl);
        tokio::pin!(sleep);

        tokio::select! {
            result = rx => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RuntimeError::corrupt_state("<dropped pending notifier>")),
                }
            }
            _ = &mut cancel => {
                self.remove_pending(pending_id);
                Err(RuntimeError::cancelled())
            }
            _ = &mut sleep => {
                self.remove_pending(pending_id);
                Err(RuntimeError::queue_timeout())
            }
        }
    }

    fn remove_pending(&self, pending_id: u64) {
        let mut state = self.state.lock().unwrap();
        state.pending.retain(|p| p.id != pending_id);
    }

    fn admit(&self, state: &mut State, req: &ReservationRequest) -> LeaseId {
        let id = LeaseId::new();
        state.active_requests += req.requests;
        state.active_llm += req.llm;
        state.leases.insert(
            id,
            LeaseRecord {
                owner_pid: req.owner_pid,
                requests_charged: req.requests,
                llm_charged: req.llm,
                provider: req.provider.clone(),
                model: req.model.clone(),
                acquired_at: Instant::now(),
                heartbeat_at: Instant::now(),
            },
        );
        id
    }

    /// Releases a lease, freeing its charged capacity and attempting to admit
    /// queued reservations that now fit. Releasing an already-released (or
    /// unknown) lease is a no-op, matching the idempotent release invariant.
    pub fn release(&self, lease: LeaseId) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let Some(record) = state.leases.remove(&lease) else {
            return Ok(());
        };
        state.active_requests = state.active_requests.saturating_sub(record.requests_charged);
        state.active_llm = state.active_llm.saturating_sub(record.llm_charged);

        self.process_queue(&mut state);
        let snapshot = state.snapshot();
        drop(state);

        self.notify_subscribers(&snapshot);
        self.events.emit(&CapacityEvent::CapacityChanged {
            timestamp: Instant::now(),
            snapshot,
        });
        Ok(())
    }

    /// Refreshes a lease's heartbeat, preventing TTL eviction. Fails with
    /// `not_found` if the lease has already been force-released as expired.
    pub fn heartbeat(&self, lease: LeaseId) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.evict_expired(&mut state);
        let record = state
            .leases
            .get_mut(&lease)
            .ok_or_else(|| RuntimeError::not_found("lease"))?;
        record.heartbeat_at = Instant::now();
        Ok(())
    }

    /// Dynamically adjusts the effective limits (driven by C6 fair-share or C7 penalty).
    pub fn adjust_limits(&self, max_total_active_requests: usize, max_total_active_llm: usize) {
        let mut state = self.state.lock().unwrap();
        state.max_total_active_requests = max_total_active_requests;
        state.max_total_active_llm = max_total_active_llm;
        self.process_queue(&mut state);
        let snapshot = state.snapshot();
        drop(state);

        self.notify_subscribers(&snapshot);
        self.events.emit(&CapacityEvent::CapacityChanged {
            timestamp: Instant::now(),
            snapshot,
        });
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        self.state.lock().unwrap().snapshot()
    }

    /// Registers a listener invoked whenever free capacity appears or limits
    /// change. Returns a subscription id; pass it to [`Self::unsubscribe`] to stop.
    pub fn subscribe<F>(&self, listener: F) -> u64
    where
        F: Fn(&RuntimeSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap().retain(|(sub_id, _)| *sub_id != id);
    }

    fn notify_subscribers(&self, snapshot: &RuntimeSnapshot) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for (_, listener) in subscribers {
            listener(snapshot);
        }
    }

    /// Evicts leases whose heartbeat is older than `leaseTtlMs`, force-releasing
    /// their charged capacity and re-running the admission queue.
    fn evict_expired(&self, state: &mut State) {
        let now = Instant::now();
        let ttl = self.lease_ttl;
        let expired: Vec<LeaseId> = state
            .leases
            .iter()
            .filter(|(_, record)| now.duration_since(record.heartbeat_at) > ttl)
            .map(|(id, _)| *id)
            .collect();

        if expired.is_empty() {
            return;
        }

        for id in expired {
            if let Some(record) = state.leases.remove(&id) {
                state.active_requests = state.active_requests.saturating_sub(record.requests_charged);
                state.active_llm = state.active_llm.saturating_sub(record.llm_charged);
                self.events.emit(&CapacityEvent::LeaseExpired { timestamp: now });
            }
        }

        self.process_queue(state);
    }

    /// Strict FIFO-within-priority admission: sorts pending by `(priority, enqueued_at)`
    /// and repeatedly admits the head while it fits, stopping at the first entry
    /// that doesn't (head-of-line blocking, not skip-ahead).
    fn process_queue(&self, state: &mut State) {
        loop {
            state.pending.sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.enqueued_at.cmp(&b.enqueued_at))
            });

            let Some(head) = state.pending.first() else {
                return;
            };

            if !state.fits(head.requests_needed, head.llm_needed) {
                return;
            }

            let mut entry = state.pending.remove(0);
            let req = ReservationRequest {
                requests: entry.requests_needed,
                llm: entry.llm_needed,
                priority: entry.priority,
                owner_pid: entry.owner_pid,
                provider: entry.provider.take(),
                model: entry.model.take(),
            };
            let id = self.admit(state, &req);
            if let Some(notify) = entry.notify.take() {
                let _ = notify.send(Ok(id));
            }
        }
    }
}
