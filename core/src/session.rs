//! Sessions, transactions, and the append-only operation history.
//!
//! A session may hold at most one active transaction. Beginning a
//! serializable transaction records a snapshot marker at the current
//! history offset; rollback truncates the history back to that offset.
//! Sessions expire an hour after their last `Get` (which refreshes the
//! clock); a reaper sweeps expired records once a minute, and a read that
//! observes expiry evicts eagerly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::resource_name::session_name;
use crate::util::now_timestamp;
use crate::util::timestamp_from;

use macos_use_proto::macosusesdk::v1::IsolationLevel;
use macos_use_proto::macosusesdk::v1::OperationRecord;
use macos_use_proto::macosusesdk::v1::Session;
use macos_use_proto::macosusesdk::v1::SessionState;
use macos_use_proto::macosusesdk::v1::Transaction;
use macos_use_proto::macosusesdk::v1::TransactionState;

pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Everything the snapshot endpoint needs in one read.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: Session,
    pub tracked_applications: Vec<String>,
    pub tracked_observations: Vec<String>,
    pub history: Vec<OperationRecord>,
}

#[derive(Debug, Clone)]
struct SnapshotMarker {
    revision_id: String,
    create_time: prost_types::Timestamp,
    operation_index: usize,
}

#[derive(Debug, Clone)]
struct ActiveTransaction {
    id: String,
    isolation_level: IsolationLevel,
    operation_start_index: usize,
}

struct SessionRecord {
    session: Session,
    history: Vec<OperationRecord>,
    tracked_applications: Vec<String>,
    tracked_observations: Vec<String>,
    snapshots: Vec<SnapshotMarker>,
    transaction: Option<ActiveTransaction>,
    expires_at: Instant,
}

impl SessionRecord {
    fn to_proto(&self) -> Session {
        let mut session = self.session.clone();
        session.operations_count = self.history.len() as i64;
        session
    }
}

#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, metadata: HashMap<String, String>) -> Session {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let expires_at = Instant::now() + SESSION_TTL;
        let session = Session {
            name: session_name(&id),
            state: SessionState::Active as i32,
            create_time: Some(now.clone()),
            last_access_time: Some(now),
            expire_time: Some(timestamp_from(
                std::time::SystemTime::now() + SESSION_TTL,
            )),
            metadata,
            active_transaction_id: String::new(),
            operations_count: 0,
        };
        let record = SessionRecord {
            session: session.clone(),
            history: Vec::new(),
            tracked_applications: Vec::new(),
            tracked_observations: Vec::new(),
            snapshots: Vec::new(),
            transaction: None,
            expires_at,
        };
        self.sessions.lock().await.insert(id, record);
        session
    }

    /// Fetches the session and refreshes its expiration clock.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;
        let record = live_record(&mut sessions, id)?;
        record.session.last_access_time = Some(now_timestamp());
        record.session.expire_time = Some(timestamp_from(
            std::time::SystemTime::now() + SESSION_TTL,
        ));
        record.expires_at = Instant::now() + SESSION_TTL;
        Ok(record.to_proto())
    }

    /// Keyset pagination: sessions whose names sort strictly after the
    /// token, ascending. The next token is the last returned name, empty
    /// when drained.
    pub async fn list_after(&self, after_name: &str, page_size: usize) -> (Vec<Session>, String) {
        let sessions = self.sessions.lock().await;
        let mut all: Vec<Session> = sessions.values().map(SessionRecord::to_proto).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));

        let page: Vec<Session> = all
            .into_iter()
            .filter(|session| session.name.as_str() > after_name)
            .take(page_size)
            .collect();
        let next_token = if page.len() == page_size {
            page.last().map(|s| s.name.clone()).unwrap_or_default()
        } else {
            String::new()
        };
        (page, next_token)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.sessions
            .lock()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    pub async fn begin_transaction(
        &self,
        id: &str,
        isolation_level: IsolationLevel,
    ) -> Result<Transaction> {
        let mut sessions = self.sessions.lock().await;
        let record = live_record(&mut sessions, id)?;

        if record.session.state != SessionState::Active as i32 || record.transaction.is_some() {
            return Err(AutomationError::failed_precondition(
                reason::SESSION_NOT_ACTIVE,
                format!("session {id} is not active or already has a transaction"),
            ));
        }

        let transaction_id = Uuid::new_v4().to_string();
        let operation_start_index = record.history.len();
        if isolation_level == IsolationLevel::Serializable {
            record.snapshots.push(SnapshotMarker {
                revision_id: format!("snapshot-{transaction_id}"),
                create_time: now_timestamp(),
                operation_index: operation_start_index,
            });
        }

        record.transaction = Some(ActiveTransaction {
            id: transaction_id.clone(),
            isolation_level,
            operation_start_index,
        });
        record.session.state = SessionState::InTransaction as i32;
        record.session.active_transaction_id = transaction_id.clone();

        Ok(Transaction {
            transaction_id,
            isolation_level: isolation_level as i32,
            state: TransactionState::Active as i32,
            operations_count: 0,
            session: Some(record.to_proto()),
        })
    }

    pub async fn commit_transaction(&self, id: &str, transaction_id: &str) -> Result<Transaction> {
        let mut sessions = self.sessions.lock().await;
        let record = live_record(&mut sessions, id)?;
        let transaction = take_matching_transaction(record, id, transaction_id)?;

        let operations_count = (record.history.len() - transaction.operation_start_index) as i64;
        record.session.state = SessionState::Active as i32;
        record.session.active_transaction_id = String::new();

        Ok(Transaction {
            transaction_id: transaction.id,
            isolation_level: transaction.isolation_level as i32,
            state: TransactionState::Committed as i32,
            operations_count,
            session: Some(record.to_proto()),
        })
    }

    /// Rolls back to a recorded snapshot: history is truncated to the
    /// snapshot's operation index. The reported count is the number of
    /// operations discarded relative to the snapshot.
    pub async fn rollback_transaction(
        &self,
        id: &str,
        transaction_id: &str,
        revision_id: &str,
    ) -> Result<Transaction> {
        let mut sessions = self.sessions.lock().await;
        let record = live_record(&mut sessions, id)?;

        let snapshot = record
            .snapshots
            .iter()
            .find(|snapshot| snapshot.revision_id == revision_id)
            .cloned()
            .ok_or_else(|| {
                AutomationError::failed_precondition(
                    reason::UNKNOWN_REVISION,
                    format!("unknown revision {revision_id:?} for session {id}"),
                )
            })?;
        let snapshot_index = snapshot.operation_index;
        debug!(
            "rolling back session {id} to {} (taken at {}s, operation index {snapshot_index})",
            snapshot.revision_id, snapshot.create_time.seconds
        );
        let transaction = take_matching_transaction(record, id, transaction_id)?;

        let operations_count = (record.history.len() - snapshot_index) as i64;
        record.history.truncate(snapshot_index);
        record.session.state = SessionState::Active as i32;
        record.session.active_transaction_id = String::new();

        Ok(Transaction {
            transaction_id: transaction.id,
            isolation_level: transaction.isolation_level as i32,
            state: TransactionState::RolledBack as i32,
            operations_count,
            session: Some(record.to_proto()),
        })
    }

    /// Appends one history record. Internal callers treat failures as
    /// best-effort (a missing session is simply ignored); the RPC surface
    /// propagates them.
    pub async fn record_operation(
        &self,
        id: &str,
        operation_type: &str,
        resource: &str,
        success: bool,
        error: &str,
    ) -> Result<OperationRecord> {
        let mut sessions = self.sessions.lock().await;
        let record = live_record(&mut sessions, id)?;
        let entry = OperationRecord {
            operation_type: operation_type.to_string(),
            resource: resource.to_string(),
            success,
            error: error.to_string(),
            operation_time: Some(now_timestamp()),
            transaction_id: record
                .transaction
                .as_ref()
                .map(|transaction| transaction.id.clone())
                .unwrap_or_default(),
        };
        record.history.push(entry.clone());
        Ok(entry)
    }

    pub async fn track_application(&self, id: &str, application_name: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Ok(record) = live_record(&mut sessions, id)
            && !record
                .tracked_applications
                .iter()
                .any(|name| name == application_name)
        {
            record.tracked_applications.push(application_name.to_string());
        }
    }

    pub async fn track_observation(&self, id: &str, observation_name: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Ok(record) = live_record(&mut sessions, id)
            && !record
                .tracked_observations
                .iter()
                .any(|name| name == observation_name)
        {
            record.tracked_observations.push(observation_name.to_string());
        }
    }

    pub async fn snapshot_view(&self, id: &str) -> Result<SessionView> {
        let mut sessions = self.sessions.lock().await;
        let record = live_record(&mut sessions, id)?;
        Ok(SessionView {
            session: record.to_proto(),
            tracked_applications: record.tracked_applications.clone(),
            tracked_observations: record.tracked_observations.clone(),
            history: record.history.clone(),
        })
    }

    /// Marks expired sessions and removes them, once a minute.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(REAPER_INTERVAL) => {}
                }
                let removed = manager.reap_expired().await;
                if removed > 0 {
                    debug!("session reaper removed {removed} expired sessions");
                }
            }
        })
    }

    async fn reap_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let before = sessions.len();
        for record in sessions.values_mut() {
            if now >= record.expires_at {
                record.session.state = SessionState::Expired as i32;
            }
        }
        sessions.retain(|_, record| record.session.state != SessionState::Expired as i32);
        before - sessions.len()
    }
}

/// Looks up a live session, evicting it when its clock has run out.
fn live_record<'a>(
    sessions: &'a mut HashMap<String, SessionRecord>,
    id: &str,
) -> Result<&'a mut SessionRecord> {
    let expired = sessions
        .get(id)
        .is_some_and(|record| Instant::now() >= record.expires_at);
    if expired {
        sessions.remove(id);
    }
    sessions.get_mut(id).ok_or_else(|| not_found(id))
}

fn take_matching_transaction(
    record: &mut SessionRecord,
    id: &str,
    transaction_id: &str,
) -> Result<ActiveTransaction> {
    if record.session.state != SessionState::InTransaction as i32 {
        return Err(AutomationError::failed_precondition(
            reason::NO_ACTIVE_TRANSACTION,
            format!("session {id} has no active transaction"),
        ));
    }
    match record.transaction.take() {
        Some(transaction) if transaction.id == transaction_id => Ok(transaction),
        Some(transaction) => {
            record.transaction = Some(transaction);
            Err(AutomationError::failed_precondition(
                reason::TRANSACTION_MISMATCH,
                format!("transaction id mismatch for session {id}"),
            ))
        }
        None => Err(AutomationError::failed_precondition(
            reason::NO_ACTIVE_TRANSACTION,
            format!("session {id} has no active transaction"),
        )),
    }
}

fn not_found(id: &str) -> AutomationError {
    AutomationError::not_found(reason::SESSION_NOT_FOUND, "session", session_name(id))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn id_of(session: &Session) -> String {
        crate::resource_name::parse_session_name(&session.name)
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn serializable_rollback_truncates_history() {
        let manager = SessionManager::new();
        let session = manager.create(HashMap::new()).await;
        let id = id_of(&session);

        let transaction = manager
            .begin_transaction(&id, IsolationLevel::Serializable)
            .await
            .unwrap();

        for n in 0..3 {
            manager
                .record_operation(&id, "input", &format!("desktopInputs/{n}"), true, "")
                .await
                .unwrap();
        }

        let revision = format!("snapshot-{}", transaction.transaction_id);
        let rolled_back = manager
            .rollback_transaction(&id, &transaction.transaction_id, &revision)
            .await
            .unwrap();

        assert_eq!(rolled_back.state, TransactionState::RolledBack as i32);
        assert_eq!(rolled_back.operations_count, 3);

        let view = manager.snapshot_view(&id).await.unwrap();
        assert!(view.history.is_empty());
        assert_eq!(view.session.state, SessionState::Active as i32);
        assert_eq!(view.session.active_transaction_id, "");
    }

    #[tokio::test]
    async fn commit_counts_operations_since_begin() {
        let manager = SessionManager::new();
        let session = manager.create(HashMap::new()).await;
        let id = id_of(&session);

        manager
            .record_operation(&id, "setup", "clipboard", true, "")
            .await
            .unwrap();
        let transaction = manager
            .begin_transaction(&id, IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        manager
            .record_operation(&id, "input", "desktopInputs/1", true, "")
            .await
            .unwrap();
        manager
            .record_operation(&id, "input", "desktopInputs/2", false, "boom")
            .await
            .unwrap();

        let committed = manager
            .commit_transaction(&id, &transaction.transaction_id)
            .await
            .unwrap();
        assert_eq!(committed.operations_count, 2);
        assert_eq!(committed.state, TransactionState::Committed as i32);

        // History survives a commit.
        let view = manager.snapshot_view(&id).await.unwrap();
        assert_eq!(view.history.len(), 3);
        assert_eq!(view.history[1].transaction_id, transaction.transaction_id);
        assert_eq!(view.history[0].transaction_id, "");
    }

    #[tokio::test]
    async fn begin_requires_an_active_session_without_transaction() {
        let manager = SessionManager::new();
        let session = manager.create(HashMap::new()).await;
        let id = id_of(&session);

        manager
            .begin_transaction(&id, IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        let err = manager
            .begin_transaction(&id, IsolationLevel::ReadCommitted)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::SESSION_NOT_ACTIVE);
    }

    #[tokio::test]
    async fn commit_rejects_mismatched_or_missing_transactions() {
        let manager = SessionManager::new();
        let session = manager.create(HashMap::new()).await;
        let id = id_of(&session);

        let err = manager.commit_transaction(&id, "whatever").await.unwrap_err();
        assert_eq!(err.reason(), reason::NO_ACTIVE_TRANSACTION);

        manager
            .begin_transaction(&id, IsolationLevel::ReadCommitted)
            .await
            .unwrap();
        let err = manager.commit_transaction(&id, "wrong-id").await.unwrap_err();
        assert_eq!(err.reason(), reason::TRANSACTION_MISMATCH);
    }

    #[tokio::test]
    async fn rollback_requires_a_known_revision() {
        let manager = SessionManager::new();
        let session = manager.create(HashMap::new()).await;
        let id = id_of(&session);
        let transaction = manager
            .begin_transaction(&id, IsolationLevel::Serializable)
            .await
            .unwrap();

        let err = manager
            .rollback_transaction(&id, &transaction.transaction_id, "snapshot-nope")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::UNKNOWN_REVISION);

        // The failed rollback left the transaction in place.
        let err = manager
            .begin_transaction(&id, IsolationLevel::ReadCommitted)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::SESSION_NOT_ACTIVE);
    }

    #[tokio::test]
    async fn keyset_list_pages_by_name() {
        let manager = SessionManager::new();
        for _ in 0..5 {
            manager.create(HashMap::new()).await;
        }

        let mut seen = Vec::new();
        let mut token = String::new();
        loop {
            let (page, next) = manager.list_after(&token, 2).await;
            seen.extend(page.iter().map(|s| s.name.clone()));
            if next.is_empty() {
                break;
            }
            token = next;
        }
        assert_eq!(seen.len(), 5);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }
}
