use crate::events::{publish_changes, EventSink};
use crate::health::HealthTracker;
use crate::state::{new_state, Shared};
use crate::status::{ApplyResult, FetchOutcome, StatusBoard, StatusSource};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;
use tracing::debug;

/// Everything a refresh needs, cloned into the periodic task and the HTTP state.
pub struct Refresher<S> {
    pub board: Shared<StatusBoard>,
    pub source: StatusSource,
    pub health: HealthTracker,
    pub events: Option<Arc<S>>,
    /// Held for the whole of a round, so at most one round is in flight.
    in_flight: Arc<AsyncMutex<()>>,
    last_manual: Shared<Option<Instant>>,
}

impl<S> Clone for Refresher<S> {
    fn clone(&self) -> Self {
        Self {
            board: self.board.clone(),
            source: self.source.clone(),
            health: self.health.clone(),
            events: self.events.clone(),
            in_flight: self.in_flight.clone(),
            last_manual: self.last_manual.clone(),
        }
    }
}

impl<S> Refresher<S> {
    pub fn new(board: Shared<StatusBoard>, source: StatusSource, health: HealthTracker, events: Option<Arc<S>>) -> Self {
        Self {
            board,
            source,
            health,
            events,
            in_flight: Arc::new(AsyncMutex::new(())),
            last_manual: new_state(None),
        }
    }
}

impl<S: EventSink + Send + Sync + 'static> Refresher<S> {
    /// One fetch-and-apply round, waiting for any round already in flight.
    pub async fn refresh_once(&self) -> ApplyResult {
        let _round = self.in_flight.lock().await;
        self.run_round().await
    }

    /// Refresh triggered by a caller. Joins a round already in flight instead
    /// of starting another, and starts nothing if the last manual round began
    /// less than `min_gap` ago. Returns whether a fetch was made.
    pub async fn refresh_on_demand(&self, min_gap: Duration) -> bool {
        let _round = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("manual refresh joined the round in flight");
                drop(self.in_flight.lock().await);
                return false;
            }
        };
        {
            let mut last = self.last_manual.lock();
            if last.is_some_and(|at| at.elapsed() < min_gap) {
                debug!("manual refresh throttled");
                return false;
            }
            *last = Some(Instant::now());
        }
        self.run_round().await;
        true
    }

    /// The board lock is only taken around the ticket and the apply, never
    /// while the requests are in flight.
    async fn run_round(&self) -> ApplyResult {
        let ticket = self.board.lock().begin_fetch();
        let (components, incidents, maintenances) = tokio::join!(
            self.source.fetch_components(),
            self.source.fetch_incidents(),
            self.source.fetch_maintenances(),
        );
        let outcome = FetchOutcome { components, incidents, maintenances };

        let (result, tracked, fallback) = {
            let mut board = self.board.lock();
            let result = board.apply(ticket, outcome);
            (result, board.tree().len(), board.snapshot().fallback)
        };

        if let ApplyResult::Applied { components_ok, changes } = &result {
            self.health.record_refresh(*components_ok, tracked, fallback);
            if let Some(sink) = &self.events {
                if !changes.is_empty() {
                    publish_changes(sink.as_ref(), changes).await;
                }
            }
        }
        result
    }

    pub fn spawn_periodic(self, every: Duration) {
        task::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if self.refresh_once().await == ApplyResult::Stale {
                    debug!("periodic refresh overtaken by a newer one");
                }
            }
        });
    }
}
