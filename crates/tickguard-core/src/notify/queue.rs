use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::request::{DisplayedNotification, NotificationRequest};
use super::surface::{NotificationSurface, Permission};

/// Delivery tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum queued requests; the oldest is dropped when full.
    pub capacity: usize,
    /// Pause after each dispatch while draining.
    pub drain_delay: Duration,
    /// Visible lifetime of notifications that do not require interaction.
    pub auto_dismiss: Duration,
    /// Permission poll period when the surface has no event stream.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            drain_delay: Duration::from_millis(500),
            auto_dismiss: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// What `send` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Dispatched,
    Queued,
    Dropped,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<NotificationRequest>,
    /// dedup tag -> id of the visible notification carrying it
    active_tags: HashMap<String, String>,
    prompt_in_flight: bool,
}

struct Inner {
    surface: Arc<dyn NotificationSurface>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    draining: AtomicBool,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

/// Permission-gated FIFO notification dispatcher.
///
/// Requests sent before permission is decided wait in a bounded queue and
/// are delivered in order, one every `drain_delay`, once permission is
/// granted. Requests sent while permission is denied or unsupported are
/// dropped.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Inner>,
}

/// Resets the draining flag even if the drain future is dropped midway.
///
/// A granted send that found the flag set just before it cleared leaves its
/// request queued, so releasing the flag re-drains whatever is still pending.
struct DrainGuard<'a> {
    queue: &'a NotificationQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.inner.draining.store(false, Ordering::SeqCst);
        let stranded =
            self.queue.permission() == Permission::Granted && self.queue.pending_len() > 0;
        if stranded && tokio::runtime::Handle::try_current().is_ok() {
            debug!("requests queued while the drain was finishing; draining again");
            self.queue.spawn_drain();
        }
    }
}

impl NotificationQueue {
    pub fn new(surface: Arc<dyn NotificationSurface>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                config,
                state: Mutex::new(QueueState::default()),
                draining: AtomicBool::new(false),
                dispatched: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn permission(&self) -> Permission {
        self.inner.surface.permission()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn dispatched_count(&self) -> u64 {
        self.inner.dispatched.load(Ordering::SeqCst)
    }

    /// Requests lost to denial or to queue overflow.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::SeqCst)
    }

    /// Delivers, queues or drops `request` depending on permission.
    ///
    /// Must run inside a tokio runtime: dismissal timers, permission prompts
    /// and drains are spawned as tasks.
    pub async fn send(&self, request: NotificationRequest) -> SendOutcome {
        match self.permission() {
            Permission::Granted => {
                let dispatch_now = {
                    let state = self.inner.state.lock();
                    state.pending.is_empty() && !self.inner.draining.load(Ordering::SeqCst)
                };
                if dispatch_now {
                    self.dispatch(request);
                    SendOutcome::Dispatched
                } else {
                    // keep FIFO order behind requests already waiting
                    self.enqueue(request);
                    self.spawn_drain();
                    SendOutcome::Queued
                }
            }
            Permission::Default => {
                self.enqueue(request);
                self.request_permission();
                SendOutcome::Queued
            }
            permission @ (Permission::Denied | Permission::Unsupported) => {
                debug!(?permission, title = %request.title, "notification dropped");
                self.inner.dropped.fetch_add(1, Ordering::SeqCst);
                SendOutcome::Dropped
            }
        }
    }

    /// Delivers queued requests in order while permission stays granted.
    ///
    /// Returns how many were delivered. A drain started while another one
    /// is running returns 0 immediately.
    pub async fn drain(&self) -> usize {
        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("drain already in progress");
            return 0;
        }
        let _guard = DrainGuard { queue: self };

        let mut delivered = 0;
        while self.permission() == Permission::Granted {
            let next = self.inner.state.lock().pending.pop_front();
            let Some(request) = next else {
                break;
            };
            self.dispatch(request);
            delivered += 1;
            tokio::time::sleep(self.inner.config.drain_delay).await;
        }

        if delivered > 0 {
            info!(delivered, "drained notification queue");
        }
        delivered
    }

    /// Watches for permission changes and drains on every transition into
    /// `Granted`. Uses the surface's event stream when available, polling
    /// otherwise. Ends once permission becomes terminal.
    pub fn spawn_permission_watcher(&self) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move { queue.watch_permission().await })
    }

    async fn watch_permission(&self) {
        let mut last = self.permission();
        if last == Permission::Granted {
            self.drain().await;
        }
        if last.is_terminal() {
            return;
        }

        if let Some(mut events) = self.inner.surface.permission_events() {
            while events.changed().await.is_ok() {
                let current = *events.borrow_and_update();
                if self.observe(last, current).await {
                    return;
                }
                last = current;
            }
            debug!("permission event stream closed; falling back to polling");
        }

        let mut ticker = tokio::time::interval(self.inner.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let current = self.permission();
            if self.observe(last, current).await {
                return;
            }
            last = current;
        }
    }

    /// Reacts to one observed permission value; true when watching should stop.
    async fn observe(&self, last: Permission, current: Permission) -> bool {
        if current != last {
            info!(from = ?last, to = ?current, "notification permission changed");
        }
        if current == Permission::Granted && last != Permission::Granted {
            self.drain().await;
        }
        current.is_terminal()
    }

    fn enqueue(&self, request: NotificationRequest) {
        let mut state = self.inner.state.lock();
        if state.pending.len() >= self.inner.config.capacity {
            if let Some(evicted) = state.pending.pop_front() {
                self.inner.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(title = %evicted.title, "notification queue full; dropped oldest");
            }
        }
        if self.inner.config.capacity > 0 {
            state.pending.push_back(request);
        } else {
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request_permission(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.prompt_in_flight {
                return;
            }
            state.prompt_in_flight = true;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            let outcome = queue.inner.surface.request_permission().await;
            queue.inner.state.lock().prompt_in_flight = false;
            info!(?outcome, "notification permission prompt resolved");
            if outcome == Permission::Granted {
                queue.drain().await;
            }
        });
    }

    fn spawn_drain(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            queue.drain().await;
        });
    }

    fn dispatch(&self, request: NotificationRequest) {
        let notification = DisplayedNotification::from_request(request);
        let surface = &self.inner.surface;

        if let Some(tag) = notification.tag() {
            let replaced = self
                .inner
                .state
                .lock()
                .active_tags
                .insert(tag.to_owned(), notification.id.clone());
            if let Some(previous) = replaced {
                debug!(tag, "replacing visible notification");
                surface.close(&previous);
            }
        }

        surface.show(&notification);
        self.inner.dispatched.fetch_add(1, Ordering::SeqCst);
        debug!(id = %notification.id, title = %notification.request.title, "notification shown");

        if !notification.request.require_interaction {
            let queue = self.clone();
            let id = notification.id;
            let tag = notification.request.dedup_tag;
            tokio::spawn(async move {
                tokio::time::sleep(queue.inner.config.auto_dismiss).await;
                if let Some(tag) = tag {
                    let mut state = queue.inner.state.lock();
                    if state.active_tags.get(&tag) != Some(&id) {
                        // already replaced and closed
                        return;
                    }
                    state.active_tags.remove(&tag);
                }
                queue.inner.surface.close(&id);
            });
        }
    }
}
