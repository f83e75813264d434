//! The primary `macosusesdk.v1.Automation` service.
//!
//! One struct holds the registries and managers; the generated trait impl
//! in [`grpc`] is a thin dispatch layer over the per-resource handler
//! modules next to it.

mod applications;
mod clipboard;
mod displays;
mod elements;
mod file_dialogs;
mod grpc;
mod inputs;
mod macros;
mod observations;
mod screenshot;
mod scripts;
mod sessions;
mod windows;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use macos_use_core::app_state::ApplicationStore;
use macos_use_core::clipboard::ClipboardManager;
use macos_use_core::element_registry::ElementRegistry;
use macos_use_core::file_dialog::FileDialogService;
use macos_use_core::macro_executor::MacroExecutor;
use macos_use_core::macro_registry::MacroRegistry;
use macos_use_core::observation::ObservationManager;
use macos_use_core::operation_store::OperationStore;
use macos_use_core::platform::SystemOperations;
use macos_use_core::resource_name::parse_session_name;
use macos_use_core::screenshot::ScreenshotService;
use macos_use_core::script::ScriptExecutor;
use macos_use_core::session::SessionManager;
use macos_use_core::window_registry::WindowRegistry;
use macos_use_core::window_service::WindowService;

/// Default page sizes per AIP-158; sessions and macros use the smaller
/// one.
pub(crate) const DEFAULT_PAGE_SIZE: usize = 100;
pub(crate) const SMALL_PAGE_SIZE: usize = 50;

pub struct AutomationService {
    pub(crate) system: Arc<dyn SystemOperations>,
    pub(crate) applications: Arc<ApplicationStore>,
    pub(crate) operations: Arc<OperationStore>,
    pub(crate) windows: Arc<WindowService>,
    pub(crate) elements: Arc<ElementRegistry>,
    pub(crate) observations: Arc<ObservationManager>,
    pub(crate) macros: Arc<MacroRegistry>,
    pub(crate) macro_executor: Arc<MacroExecutor>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) clipboard: Arc<ClipboardManager>,
    pub(crate) screenshots: Arc<ScreenshotService>,
    pub(crate) scripts: Arc<ScriptExecutor>,
    pub(crate) file_dialogs: Arc<FileDialogService>,
    pub(crate) shutdown: CancellationToken,
}

impl AutomationService {
    /// Builds the full registry stack over one platform adapter. The
    /// shutdown token bounds every background task spawned from handlers.
    pub fn new(system: Arc<dyn SystemOperations>, shutdown: CancellationToken) -> Self {
        let elements = Arc::new(ElementRegistry::new());
        let window_registry = Arc::new(WindowRegistry::new(Arc::clone(&system)));
        Self {
            applications: Arc::new(ApplicationStore::new()),
            operations: Arc::new(OperationStore::new()),
            windows: Arc::new(WindowService::new(
                Arc::clone(&system),
                window_registry,
            )),
            observations: Arc::new(ObservationManager::new(Arc::clone(&system))),
            macros: Arc::new(MacroRegistry::new()),
            macro_executor: Arc::new(MacroExecutor::new(
                Arc::clone(&system),
                Arc::clone(&elements),
            )),
            sessions: Arc::new(SessionManager::new()),
            clipboard: Arc::new(ClipboardManager::new(Arc::clone(&system))),
            screenshots: Arc::new(ScreenshotService::new(
                Arc::clone(&system),
                Arc::clone(&elements),
            )),
            scripts: Arc::new(ScriptExecutor::new(Arc::clone(&system))),
            file_dialogs: Arc::new(FileDialogService::new(
                Arc::clone(&system),
                Arc::clone(&elements),
            )),
            elements,
            system,
            shutdown,
        }
    }

    /// Starts the element and session reapers, bound to the shutdown
    /// token.
    pub fn spawn_reapers(&self) {
        self.elements.spawn_reaper(self.shutdown.clone());
        self.sessions.spawn_reaper(self.shutdown.clone());
    }

    /// The LRO store, shared with the `Operations` service.
    pub fn operation_store(&self) -> Arc<OperationStore> {
        Arc::clone(&self.operations)
    }

    /// The application/input store, exposed for embedders that pre-seed
    /// tracked applications.
    pub fn application_store(&self) -> Arc<ApplicationStore> {
        Arc::clone(&self.applications)
    }

    /// Best-effort session history recording for mutation endpoints that
    /// carry a `session` field. A missing or malformed session never fails
    /// the request.
    pub(crate) async fn record_session_op(
        &self,
        session: &str,
        operation_type: &str,
        resource: &str,
        success: bool,
        error: &str,
    ) {
        record_session(
            &self.sessions,
            session,
            operation_type,
            resource,
            success,
            error,
        )
        .await;
    }
}

/// Free-function form of session recording, usable from spawned operation
/// tasks that only hold the manager.
pub(crate) async fn record_session(
    sessions: &SessionManager,
    session: &str,
    operation_type: &str,
    resource: &str,
    success: bool,
    error: &str,
) {
    if session.is_empty() {
        return;
    }
    let Ok(parsed) = parse_session_name(session) else {
        return;
    };
    let _ = sessions
        .record_operation(&parsed.id, operation_type, resource, success, error)
        .await;
}

/// Remembers an application on the session's tracked list, best-effort.
pub(crate) async fn track_application(
    sessions: &SessionManager,
    session: &str,
    application_name: &str,
) {
    if session.is_empty() {
        return;
    }
    if let Ok(parsed) = parse_session_name(session) {
        sessions.track_application(&parsed.id, application_name).await;
    }
}

/// Packs a message into `google.protobuf.Any` under the canonical
/// `type.googleapis.com/` prefix.
pub(crate) fn pack_any(type_name: &str, message: &impl prost::Message) -> prost_types::Any {
    prost_types::Any {
        type_url: format!("type.googleapis.com/{type_name}"),
        value: message.encode_to_vec(),
    }
}
