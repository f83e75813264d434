//! In-memory registry of tracked applications and recorded inputs.
//!
//! Entries have no TTL; they are removed only by explicit delete (or, for
//! applications, when the host process is observed to have terminated).

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;

use macos_use_proto::macosusesdk::v1::Application;
use macos_use_proto::macosusesdk::v1::Input;

#[derive(Default)]
pub struct ApplicationStore {
    applications: RwLock<HashMap<i32, Application>>,
    inputs: RwLock<HashMap<String, Input>>,
}

impl ApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_application(&self, application: Application) {
        self.applications
            .write()
            .await
            .insert(application.pid, application);
    }

    pub async fn get_application(&self, pid: i32) -> Result<Application> {
        self.applications
            .read()
            .await
            .get(&pid)
            .cloned()
            .ok_or_else(|| {
                AutomationError::not_found(
                    reason::APPLICATION_NOT_FOUND,
                    "application",
                    format!("applications/{pid}"),
                )
            })
    }

    /// All tracked applications, sorted by resource name ascending.
    pub async fn list_applications(&self) -> Vec<Application> {
        let mut applications: Vec<Application> =
            self.applications.read().await.values().cloned().collect();
        applications.sort_by(|a, b| a.name.cmp(&b.name));
        applications
    }

    pub async fn remove_application(&self, pid: i32) -> Result<Application> {
        self.applications.write().await.remove(&pid).ok_or_else(|| {
            AutomationError::not_found(
                reason::APPLICATION_NOT_FOUND,
                "application",
                format!("applications/{pid}"),
            )
        })
    }

    pub async fn put_input(&self, input: Input) {
        self.inputs.write().await.insert(input.name.clone(), input);
    }

    pub async fn get_input(&self, name: &str) -> Result<Input> {
        self.inputs.read().await.get(name).cloned().ok_or_else(|| {
            AutomationError::not_found(reason::INPUT_NOT_FOUND, "input", name)
        })
    }

    /// Inputs under `parent` (prefix match on the resource name), or every
    /// input when `parent` is empty. Sorted by resource name ascending.
    pub async fn list_inputs(&self, parent: &str) -> Vec<Input> {
        let inputs = self.inputs.read().await;
        let mut matching: Vec<Input> = inputs
            .values()
            .filter(|input| parent.is_empty() || input.name.starts_with(parent))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        matching
    }

    /// Drops every input recorded under an application being deleted.
    pub async fn remove_inputs_under(&self, parent: &str) {
        self.inputs
            .write()
            .await
            .retain(|name, _| !name.starts_with(parent));
    }
}
