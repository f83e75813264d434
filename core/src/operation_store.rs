//! Long-running operation store.
//!
//! Operations transition monotonically: `done=false → done=true`, and once
//! done the result is immutable. Every transition happens under the store's
//! mutex; a repeated completion attempt is logged and ignored rather than
//! overwriting the recorded result.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;

use macos_use_proto::google::longrunning::Operation;
use macos_use_proto::google::longrunning::operation;
use macos_use_proto::google::rpc::Status as RpcStatus;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LIST_PAGE_SIZE: usize = 100;

#[derive(Default)]
pub struct OperationStore {
    operations: Mutex<HashMap<String, Operation>>,
}

impl OperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending operation and returns the handle the client
    /// polls.
    pub async fn create(
        &self,
        name: String,
        metadata: Option<prost_types::Any>,
    ) -> Operation {
        let operation = Operation {
            name: name.clone(),
            metadata,
            done: false,
            result: None,
        };
        self.operations
            .lock()
            .await
            .insert(name, operation.clone());
        operation
    }

    pub async fn put(&self, operation: Operation) {
        self.operations
            .lock()
            .await
            .insert(operation.name.clone(), operation);
    }

    pub async fn get(&self, name: &str) -> Result<Operation> {
        self.operations
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.operations
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    /// Marks the operation done with the successful response. Completing an
    /// already-done operation is a no-op (logged); the first result wins.
    pub async fn finish(&self, name: &str, response: prost_types::Any) -> Result<Operation> {
        self.transition(name, operation::Result::Response(response))
            .await
    }

    /// Marks the operation done with the failure status.
    pub async fn fail(&self, name: &str, status: RpcStatus) -> Result<Operation> {
        self.transition(name, operation::Result::Error(status)).await
    }

    /// Cancels a pending operation: `done=true` with a CANCELLED error. A
    /// done operation is left untouched and returned as-is.
    pub async fn cancel(&self, name: &str) -> Result<Operation> {
        let mut operations = self.operations.lock().await;
        let operation = operations.get_mut(name).ok_or_else(|| not_found(name))?;
        if !operation.done {
            operation.done = true;
            operation.result = Some(operation::Result::Error(RpcStatus {
                code: tonic::Code::Cancelled as i32,
                message: "operation cancelled".to_string(),
                details: Vec::new(),
            }));
        }
        Ok(operation.clone())
    }

    /// Polls until the operation is done or the timeout elapses, returning
    /// the current snapshot either way. An absent timeout uses a 30 s
    /// default rather than waiting forever.
    pub async fn wait(&self, name: &str, timeout: Option<Duration>) -> Result<Operation> {
        let deadline = tokio::time::Instant::now() + timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        loop {
            let snapshot = self.get(name).await?;
            if snapshot.done || tokio::time::Instant::now() >= deadline {
                return Ok(snapshot);
            }
            tokio::time::sleep_until(
                (tokio::time::Instant::now() + WAIT_POLL_INTERVAL).min(deadline),
            )
            .await;
        }
    }

    /// Deterministic name-sorted listing with this store's own opaque
    /// offset tokens (kept separate from the request-plane codec so the two
    /// can evolve independently).
    pub async fn list(
        &self,
        name_prefix: &str,
        only_done: bool,
        page_size: i32,
        page_token: &str,
    ) -> Result<(Vec<Operation>, String)> {
        let mut matching: Vec<Operation> = {
            let operations = self.operations.lock().await;
            operations
                .values()
                .filter(|op| name_prefix.is_empty() || op.name.starts_with(name_prefix))
                .filter(|op| !only_done || op.done)
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| a.name.cmp(&b.name));

        let start = decode_list_token(page_token)?;
        let size = if page_size <= 0 {
            DEFAULT_LIST_PAGE_SIZE
        } else {
            page_size as usize
        };
        if start >= matching.len() {
            return Ok((Vec::new(), String::new()));
        }
        let end = start.saturating_add(size).min(matching.len());
        let next = if end < matching.len() {
            encode_list_token(end)
        } else {
            String::new()
        };
        Ok((matching[start..end].to_vec(), next))
    }

    async fn transition(&self, name: &str, result: operation::Result) -> Result<Operation> {
        let mut operations = self.operations.lock().await;
        let operation = operations.get_mut(name).ok_or_else(|| not_found(name))?;
        if operation.done {
            warn!("operation {name} already done; ignoring repeated completion");
            return Ok(operation.clone());
        }
        operation.done = true;
        operation.result = Some(result);
        Ok(operation.clone())
    }
}

fn not_found(name: &str) -> AutomationError {
    AutomationError::not_found(reason::OPERATION_NOT_FOUND, "operation", name)
}

fn encode_list_token(offset: usize) -> String {
    BASE64.encode(format!("offset:{offset}"))
}

fn decode_list_token(token: &str) -> Result<usize> {
    if token.is_empty() {
        return Ok(0);
    }
    let fail = || AutomationError::invalid_page_token(token);
    let raw = BASE64.decode(token).map_err(|_| fail())?;
    let text = String::from_utf8(raw).map_err(|_| fail())?;
    text.strip_prefix("offset:")
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(fail)?
        .parse::<usize>()
        .map_err(|_| fail())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn any(type_url: &str) -> prost_types::Any {
        prost_types::Any {
            type_url: type_url.to_string(),
            value: Vec::new(),
        }
    }

    #[tokio::test]
    async fn finish_is_monotonic_and_first_result_wins() {
        let store = OperationStore::new();
        store.create("operations/open/a".to_string(), None).await;

        let finished = store
            .finish("operations/open/a", any("type/first"))
            .await
            .unwrap();
        assert!(finished.done);

        // A second completion (different payload) must not overwrite.
        let repeated = store
            .finish("operations/open/a", any("type/second"))
            .await
            .unwrap();
        match &repeated.result {
            Some(operation::Result::Response(response)) => {
                assert_eq!(response.type_url, "type/first");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let got = store.get("operations/open/a").await.unwrap();
        assert!(got.done);
        assert_eq!(got.result, repeated.result);
    }

    #[tokio::test]
    async fn cancel_sets_cancelled_error_once() {
        let store = OperationStore::new();
        store.create("operations/x".to_string(), None).await;
        let cancelled = store.cancel("operations/x").await.unwrap();
        match cancelled.result {
            Some(operation::Result::Error(status)) => {
                assert_eq!(status.code, tonic::Code::Cancelled as i32);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // Cancelling a done operation leaves the result alone.
        store
            .fail(
                "operations/x",
                RpcStatus {
                    code: tonic::Code::Internal as i32,
                    message: "late failure".to_string(),
                    details: Vec::new(),
                },
            )
            .await
            .unwrap();
        let again = store.cancel("operations/x").await.unwrap();
        match again.result {
            Some(operation::Result::Error(status)) => {
                assert_eq!(status.code, tonic::Code::Cancelled as i32);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_returns_pending_snapshot_on_timeout() {
        let store = OperationStore::new();
        store.create("operations/slow".to_string(), None).await;
        let snapshot = store
            .wait("operations/slow", Some(Duration::from_millis(350)))
            .await
            .unwrap();
        assert!(!snapshot.done);
    }

    #[tokio::test]
    async fn wait_observes_completion() {
        let store = std::sync::Arc::new(OperationStore::new());
        store.create("operations/done-soon".to_string(), None).await;

        let completer = store.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            completer
                .finish("operations/done-soon", any("type/ok"))
                .await
                .unwrap();
        });

        let snapshot = store
            .wait("operations/done-soon", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(snapshot.done);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let store = OperationStore::new();
        for i in 0..5 {
            store.create(format!("operations/open/{i}"), None).await;
        }
        store.create("operations/macro/z".to_string(), None).await;
        store
            .finish("operations/open/3", any("type/ok"))
            .await
            .unwrap();

        let (page, next) = store.list("operations/open/", false, 3, "").await.unwrap();
        assert_eq!(
            page.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            vec!["operations/open/0", "operations/open/1", "operations/open/2"]
        );
        assert!(!next.is_empty());

        let (rest, done_token) = store
            .list("operations/open/", false, 3, &next)
            .await
            .unwrap();
        assert_eq!(
            rest.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            vec!["operations/open/3", "operations/open/4"]
        );
        assert_eq!(done_token, "");

        let (done_only, _) = store.list("", true, 10, "").await.unwrap();
        assert_eq!(done_only.len(), 1);
        assert_eq!(done_only[0].name, "operations/open/3");

        assert!(store.list("", false, 10, "garbage").await.is_err());
    }
}
