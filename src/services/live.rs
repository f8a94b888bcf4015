use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domains::history::{EventType, HistoryEvent};
use crate::domains::records::field_i64;
use crate::domains::user::UserContext;
use crate::error::Result;
use crate::interfaces::storage::{ChangeKind, RowChange};
use crate::services::history::{HistoryQuery, HistoryService};
use crate::services::normalizer::normalize_row;

const REFRESH_QUEUE: usize = 8;

/// The bounds a mounted feed keeps itself within.
#[derive(Debug, Clone)]
struct FeedWindow {
    user_id: String,
    limit: usize,
    since: Option<i64>,
}

/// What a single change did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Patch {
    Unchanged,
    Changed,
    /// A full window lost an entry; only the store knows what moves up.
    Refill,
}

type RefreshReply = oneshot::Sender<Result<()>>;

impl FeedWindow {
    fn query(&self) -> HistoryQuery {
        HistoryQuery {
            limit: Some(self.limit),
            since: self.since,
        }
    }

    /// Patches `events` in place.
    fn apply(
        &self,
        service: &HistoryService,
        events: &mut Vec<HistoryEvent>,
        change: &RowChange,
    ) -> Patch {
        if change.user_id != self.user_id {
            return Patch::Unchanged;
        }
        let Some(kind) = EventType::from_table(change.table) else {
            return Patch::Unchanged;
        };

        let normalized = match change.kind {
            ChangeKind::Delete => None,
            ChangeKind::Insert | ChangeKind::Update => {
                normalize_row(kind, &change.row, service.offset())
            }
        };
        let id = match &normalized {
            Some(event) => event.id,
            None => match field_i64(&change.row, "id") {
                Some(id) => id,
                None => return Patch::Unchanged,
            },
        };

        let was_full = events.len() >= self.limit;
        let before = events.len();
        events.retain(|event| event.key() != (kind, id));
        let mut changed = events.len() != before;

        if let Some(event) = normalized {
            if self.since.map_or(true, |since| event.timestamp >= since) {
                let position = events
                    .iter()
                    .position(|existing| existing.timestamp <= event.timestamp)
                    .unwrap_or(events.len());
                if position < self.limit {
                    events.insert(position, event);
                    events.truncate(self.limit);
                    changed = true;
                }
            }
        }

        if !changed {
            Patch::Unchanged
        } else if was_full && events.len() < self.limit {
            Patch::Refill
        } else {
            Patch::Changed
        }
    }
}

struct FeedShared {
    closed: AtomicBool,
    events: watch::Sender<Vec<HistoryEvent>>,
}

impl FeedShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, events: Vec<HistoryEvent>) {
        if self.is_closed() {
            debug!("discarding history fetched after close");
            return;
        }
        self.events.send_replace(events);
    }
}

/// A history window kept fresh by patching it from the store's change
/// channel. The subscription lives exactly as long as this handle.
///
/// Refetches and patches run on the same task, so a change that lands while
/// a refetch is in flight is applied on top of the refetched window.
pub struct LiveFeed {
    window: FeedWindow,
    shared: Arc<FeedShared>,
    receiver: watch::Receiver<Vec<HistoryEvent>>,
    refreshes: mpsc::Sender<RefreshReply>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeed {
    pub async fn mount(
        service: Arc<HistoryService>,
        ctx: UserContext,
        query: HistoryQuery,
    ) -> Result<Self> {
        let user_id = ctx.require()?.to_string();
        let window = FeedWindow {
            user_id,
            limit: query.limit.unwrap_or(service.default_limit()),
            since: query.since,
        };

        // Subscribe before the initial read so nothing written in between is lost.
        let changes = service.store().subscribe();
        let initial = service.recent(&ctx, window.query()).await?;

        let (sender, receiver) = watch::channel(initial);
        let shared = Arc::new(FeedShared {
            closed: AtomicBool::new(false),
            events: sender,
        });
        let (refreshes, refresh_rx) = mpsc::channel(REFRESH_QUEUE);
        let task = tokio::spawn(run_patch_loop(
            service,
            ctx,
            window.clone(),
            Arc::clone(&shared),
            changes,
            refresh_rx,
        ));
        info!(user_id = %window.user_id, limit = window.limit, "live history feed mounted");

        Ok(Self {
            window,
            shared,
            receiver,
            refreshes,
            task: Some(task),
        })
    }

    pub fn snapshot(&self) -> Vec<HistoryEvent> {
        self.receiver.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<HistoryEvent>> {
        self.receiver.clone()
    }

    pub fn limit(&self) -> usize {
        self.window.limit
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Refetches the whole window. A result that lands after [`close`](Self::close)
    /// is dropped.
    pub async fn refresh(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.refreshes.send(reply).await.is_err() {
            debug!(user_id = %self.window.user_id, "refresh on a closed feed ignored");
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }

    pub fn close(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(user_id = %self.window.user_id, "live history feed closed");
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.close();
    }
}

async fn refetch(
    service: &HistoryService,
    ctx: &UserContext,
    window: &FeedWindow,
    shared: &FeedShared,
) -> Result<()> {
    let events = service.recent(ctx, window.query()).await?;
    shared.publish(events);
    Ok(())
}

async fn run_patch_loop(
    service: Arc<HistoryService>,
    ctx: UserContext,
    window: FeedWindow,
    shared: Arc<FeedShared>,
    mut changes: broadcast::Receiver<RowChange>,
    mut refreshes: mpsc::Receiver<RefreshReply>,
) {
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    if shared.is_closed() {
                        break;
                    }
                    let mut events = shared.events.borrow().clone();
                    match window.apply(&service, &mut events, &change) {
                        Patch::Unchanged => {}
                        Patch::Changed => shared.publish(events),
                        Patch::Refill => {
                            debug!(table = %change.table, "live history window fell short, refetching");
                            if let Err(err) = refetch(&service, &ctx, &window, &shared).await {
                                warn!(error = %err, "live history refill failed");
                                shared.publish(events);
                            }
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "live history feed lagged, refetching");
                    if let Err(err) = refetch(&service, &ctx, &window, &shared).await {
                        warn!(error = %err, "live history refetch failed");
                    }
                }
                Err(RecvError::Closed) => break,
            },
            request = refreshes.recv() => match request {
                Some(reply) => {
                    let _ = reply.send(refetch(&service, &ctx, &window, &shared).await);
                }
                None => break,
            },
        }
    }
}
