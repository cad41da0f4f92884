//! Client session controller.
//!
//! A [`SessionController`] binds one client to one event at a time. Selecting
//! an event tears down any previous subscription first, subscribes to change
//! notifications, then loads a full snapshot of the event's records. From then
//! on every notification triggers a re-query of the affected table; the local
//! snapshot is never mutated speculatively, only replaced with what the store
//! returned.
//!
//! Every select bumps an epoch counter. Query results carry the epoch they
//! were issued under and are discarded if a newer select has happened since,
//! so a slow query for a previous event can never overwrite the current one.

use plenum_db::DbPool;
use plenum_realtime::RealtimeHub;
use plenum_store::{
    get_event, get_question, list_participants, list_questions, list_seats,
    update_participant_status, update_question_status, Event, Participant, Question, Seat,
    StoreError,
};
use plenum_types::{ChangeNotification, ChangeOp, ParticipantStatus, QuestionStatus, StoreTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The connection pool could not hand out a connection.
    #[error("database unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("background query panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Everything a client renders for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub event: Event,
    pub seats: Vec<Seat>,
    pub participants: Vec<Participant>,
    pub questions: Vec<Question>,
}

/// Where the session currently stands.
#[derive(Debug, Clone)]
pub enum SessionPhase {
    /// No event selected.
    NoEvent,
    /// An event was selected and its snapshot is being loaded.
    Loading { event_id: String },
    /// Snapshot loaded; notifications keep it current.
    Ready(SessionSnapshot),
    /// The load or a later refresh failed. Nothing retries on its own;
    /// [`SessionController::refresh`] is the way back.
    Failed { event_id: String, error: String },
}

struct Inner {
    phase: RwLock<SessionPhase>,
    epoch: AtomicU64,
}

impl Inner {
    // The phase is only ever replaced whole, so a guard recovered from a
    // poisoned lock still holds a coherent value.
    fn write_phase(&self) -> RwLockWriteGuard<'_, SessionPhase> {
        self.phase.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a phase if no newer select has happened since `epoch`.
    fn apply(&self, epoch: u64, phase: SessionPhase) -> bool {
        let mut guard = self.write_phase();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "discarding stale session update");
            return false;
        }
        *guard = phase;
        true
    }

    /// Replaces one table's records inside a ready snapshot.
    fn apply_refresh(&self, epoch: u64, refresh: TableRefresh) {
        let mut guard = self.write_phase();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(epoch, "discarding stale table refresh");
            return;
        }
        if let SessionPhase::Ready(snapshot) = &mut *guard {
            match refresh {
                TableRefresh::Event(event) => snapshot.event = event,
                TableRefresh::Seats(seats) => snapshot.seats = seats,
                TableRefresh::Participants(participants) => {
                    snapshot.participants = participants;
                }
                TableRefresh::Questions(questions) => snapshot.questions = questions,
            }
        }
        // While still loading, the in-flight snapshot query sees the change.
    }
}

enum TableRefresh {
    Event(Event),
    Seats(Vec<Seat>),
    Participants(Vec<Participant>),
    Questions(Vec<Question>),
}

/// Binds a client to at most one event and keeps its snapshot current.
pub struct SessionController {
    pool: DbPool,
    hub: Arc<RealtimeHub>,
    inner: Arc<Inner>,
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(pool: DbPool, hub: Arc<RealtimeHub>) -> Self {
        Self {
            pool,
            hub,
            inner: Arc::new(Inner {
                phase: RwLock::new(SessionPhase::NoEvent),
                epoch: AtomicU64::new(0),
            }),
            reconcile: Mutex::new(None),
        }
    }

    /// The current phase, cloned for the caller to render.
    pub fn phase(&self) -> SessionPhase {
        self.inner
            .phase
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The event id of the current selection, if any.
    fn current_event_id(&self) -> Option<String> {
        match self.phase() {
            SessionPhase::NoEvent => None,
            SessionPhase::Loading { event_id } => Some(event_id),
            SessionPhase::Ready(snapshot) => Some(snapshot.event.id),
            SessionPhase::Failed { event_id, .. } => Some(event_id),
        }
    }

    /// Selects an event, replacing any previous selection.
    ///
    /// The old subscription is torn down before the new one is created, so
    /// the client is never subscribed to two events at once. On failure the
    /// phase moves to [`SessionPhase::Failed`] and stays there until the
    /// caller refreshes or selects again.
    pub async fn select_event(&self, event_id: &str) -> Result<(), SessionError> {
        let previous = self.current_event_id();
        let epoch = self.teardown().await;
        if let Some(previous) = previous {
            self.hub.prune(&previous);
        }
        self.inner.apply(
            epoch,
            SessionPhase::Loading {
                event_id: event_id.to_string(),
            },
        );

        // Subscribe before the snapshot query so no change can fall between
        // the query and the first notification.
        let rx = self.hub.subscribe(event_id);
        let handle = tokio::spawn(reconcile_loop(
            self.pool.clone(),
            Arc::clone(&self.inner),
            event_id.to_string(),
            epoch,
            rx,
        ));
        *self.reconcile_slot() = Some(handle);

        match load_snapshot(self.pool.clone(), event_id.to_string()).await {
            Ok(snapshot) => {
                self.inner.apply(epoch, SessionPhase::Ready(snapshot));
                Ok(())
            }
            Err(e) => {
                self.inner.apply(
                    epoch,
                    SessionPhase::Failed {
                        event_id: event_id.to_string(),
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Reloads the full snapshot for the current selection.
    ///
    /// This is the manual retry path out of [`SessionPhase::Failed`]; the
    /// subscription from the original select stays attached throughout.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let event_id = match self.phase() {
            SessionPhase::NoEvent => return Ok(()),
            SessionPhase::Loading { event_id } => event_id,
            SessionPhase::Ready(snapshot) => snapshot.event.id,
            SessionPhase::Failed { event_id, .. } => event_id,
        };
        let epoch = self.inner.epoch.load(Ordering::SeqCst);

        match load_snapshot(self.pool.clone(), event_id.clone()).await {
            Ok(snapshot) => {
                self.inner.apply(epoch, SessionPhase::Ready(snapshot));
                Ok(())
            }
            Err(e) => {
                self.inner.apply(
                    epoch,
                    SessionPhase::Failed {
                        event_id,
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Clears the selection and releases the subscription.
    pub async fn deselect(&self) {
        let previous = self.current_event_id();
        let epoch = self.teardown().await;
        self.inner.apply(epoch, SessionPhase::NoEvent);
        if let Some(event_id) = previous {
            self.hub.prune(&event_id);
        }
    }

    /// Approves a pending question.
    ///
    /// Moderator actions never touch the snapshot directly; the store write
    /// publishes a notification and the snapshot converges through the
    /// re-query path like any other change.
    pub async fn approve_question(&self, question_id: &str) -> Result<(), SessionError> {
        self.transition_question(question_id, QuestionStatus::Approved)
            .await
    }

    /// Rejects a pending question.
    pub async fn reject_question(&self, question_id: &str) -> Result<(), SessionError> {
        self.transition_question(question_id, QuestionStatus::Rejected)
            .await
    }

    /// Marks a question answered, directly from pending or after speaking.
    pub async fn mark_answered(&self, question_id: &str) -> Result<(), SessionError> {
        self.transition_question(question_id, QuestionStatus::Answered)
            .await
    }

    /// Removes a question outright.
    pub async fn delete_question(&self, question_id: &str) -> Result<(), SessionError> {
        let pool = self.pool.clone();
        let id = question_id.to_string();
        let question = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let question = get_question(&conn, &id)?;
            plenum_store::delete_question(&conn, &id)?;
            Ok::<_, SessionError>(question)
        })
        .await??;

        self.hub.publish(
            &question.event_id,
            ChangeNotification::new(StoreTable::Questions, ChangeOp::Delete, &question.id),
        );
        Ok(())
    }

    /// Moves a participant along the hand-raise graph.
    pub async fn set_participant_status(
        &self,
        participant_row_id: &str,
        status: ParticipantStatus,
    ) -> Result<(), SessionError> {
        let pool = self.pool.clone();
        let id = participant_row_id.to_string();
        let participant = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            Ok::<_, SessionError>(update_participant_status(&conn, &id, status)?)
        })
        .await??;

        self.hub.publish(
            &participant.event_id,
            ChangeNotification::new(
                StoreTable::EventParticipants,
                ChangeOp::Update,
                &participant.id,
            ),
        );
        Ok(())
    }

    async fn transition_question(
        &self,
        question_id: &str,
        next: QuestionStatus,
    ) -> Result<(), SessionError> {
        let pool = self.pool.clone();
        let id = question_id.to_string();
        let question = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            Ok::<_, SessionError>(update_question_status(&conn, &id, next)?)
        })
        .await??;

        self.hub.publish(
            &question.event_id,
            ChangeNotification::new(StoreTable::Questions, ChangeOp::Update, &question.id),
        );
        Ok(())
    }

    /// Aborts the reconcile task and bumps the epoch, invalidating every
    /// in-flight query issued before this point.
    async fn teardown(&self) -> u64 {
        let handle = self.reconcile_slot().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    // The slot holds a single optional handle; a guard recovered from a
    // poisoned lock is coherent.
    fn reconcile_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.reconcile.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.reconcile_slot().take() {
            handle.abort();
        }
        // The aborted task may hold its receiver for another moment; if this
        // prune finds the channel busy, the next publish sweeps it instead.
        if let Some(event_id) = self.current_event_id() {
            self.hub.prune(&event_id);
        }
    }
}

/// Loads every record for one event off the async runtime.
async fn load_snapshot(pool: DbPool, event_id: String) -> Result<SessionSnapshot, SessionError> {
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let event = get_event(&conn, &event_id)?;
        let seats = list_seats(&conn, &event_id)?;
        let participants = list_participants(&conn, &event_id)?;
        let questions = list_questions(&conn, &event_id, None, None)?;
        Ok(SessionSnapshot {
            event,
            seats,
            participants,
            questions,
        })
    })
    .await?
}

/// Watches the notification stream and re-queries the affected table.
async fn reconcile_loop(
    pool: DbPool,
    inner: Arc<Inner>,
    event_id: String,
    epoch: u64,
    mut rx: broadcast::Receiver<ChangeNotification>,
) {
    loop {
        match rx.recv().await {
            Ok(notification) => {
                if inner.epoch.load(Ordering::SeqCst) != epoch {
                    return;
                }
                if let Err(e) =
                    reconcile_table(&pool, &inner, &event_id, epoch, notification.table).await
                {
                    warn!(
                        event_id = %event_id,
                        table = notification.table.as_str(),
                        "re-query after notification failed: {e}"
                    );
                    inner.apply(
                        epoch,
                        SessionPhase::Failed {
                            event_id: event_id.clone(),
                            error: e.to_string(),
                        },
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Missed notifications mean the snapshot may be arbitrarily
                // stale, so reload all of it rather than guess which tables.
                warn!(event_id = %event_id, missed, "notification stream lagged, reloading");
                match load_snapshot(pool.clone(), event_id.clone()).await {
                    Ok(snapshot) => {
                        inner.apply(epoch, SessionPhase::Ready(snapshot));
                    }
                    Err(e) => {
                        inner.apply(
                            epoch,
                            SessionPhase::Failed {
                                event_id: event_id.clone(),
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn reconcile_table(
    pool: &DbPool,
    inner: &Arc<Inner>,
    event_id: &str,
    epoch: u64,
    table: StoreTable,
) -> Result<(), SessionError> {
    let pool = pool.clone();
    let event_id = event_id.to_string();
    let refresh = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let refresh = match table {
            StoreTable::Events => TableRefresh::Event(get_event(&conn, &event_id)?),
            StoreTable::EventSeats => TableRefresh::Seats(list_seats(&conn, &event_id)?),
            StoreTable::EventParticipants => {
                TableRefresh::Participants(list_participants(&conn, &event_id)?)
            }
            StoreTable::Questions => {
                TableRefresh::Questions(list_questions(&conn, &event_id, None, None)?)
            }
        };
        Ok::<_, SessionError>(refresh)
    })
    .await??;

    inner.apply_refresh(epoch, refresh);
    Ok(())
}
