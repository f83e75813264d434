//! Scripted [`SystemOperations`] fake shared by the integration suites.
//!
//! Tests stage host state (windows, elements, clipboard, dialog answers)
//! up front, then assert on the calls the core made. Everything is plain
//! in-memory state behind a std mutex; async methods never block.

// Poisoned mutex should fail the test run.
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use macos_use_core::platform::AxElement;
use macos_use_core::platform::AxNotification;
use macos_use_core::platform::CaptureRequest;
use macos_use_core::platform::CaptureResult;
use macos_use_core::platform::ClipboardData;
use macos_use_core::platform::ClipboardSnapshot;
use macos_use_core::platform::DisplayInfo;
use macos_use_core::platform::ElementQuery;
use macos_use_core::platform::FoundElement;
use macos_use_core::platform::LaunchedApplication;
use macos_use_core::platform::MouseButtonKind;
use macos_use_core::platform::OpenDialogOptions;
use macos_use_core::platform::PlatformError;
use macos_use_core::platform::PlatformResult;
use macos_use_core::platform::Point;
use macos_use_core::platform::Rect;
use macos_use_core::platform::SaveDialogOptions;
use macos_use_core::platform::ScriptHostLanguage;
use macos_use_core::platform::ScriptHostOutput;
use macos_use_core::platform::SystemOperations;
use macos_use_core::platform::WindowAttributes;
use macos_use_core::platform::WindowInfo;
use macos_use_core::platform::WindowStateAttributes;

/// One scripted window: the list entry plus the attribute state behind its
/// accessibility element.
#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub info: WindowInfo,
    pub token: u64,
    pub minimized: bool,
    pub hidden: bool,
    /// Number of attribute reads that still see the old minimized value,
    /// simulating the host applying the change asynchronously.
    pub minimize_read_lag: u32,
    /// Pending minimized value while `minimize_read_lag` drains.
    pub pending_minimized: Option<bool>,
}

impl FakeWindow {
    pub fn new(window_id: u32, pid: i32, bounds: Rect, title: &str, layer: i32) -> Self {
        Self {
            info: WindowInfo {
                window_id,
                pid,
                bounds,
                title: title.to_string(),
                layer,
                is_on_screen: true,
                bundle_id: Some("com.example.fake".to_string()),
            },
            token: window_id as u64,
            minimized: false,
            hidden: false,
            minimize_read_lag: 0,
            pending_minimized: None,
        }
    }
}

/// Everything the fake records about calls made through the trait.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Click { point: Point, button: MouseButtonKind, click_count: u32 },
    TypeText(String),
    PressKey { modifiers: Vec<String>, key: String },
    Scroll { point: Point, delta_x: f64, delta_y: f64 },
    MouseDown(Point),
    MouseMove(Point),
    MouseUp(Point),
    Activate(i32),
    Terminate(i32),
    WriteClipboard(ClipboardData),
    ClearClipboard,
    Reveal(PathBuf),
    StopObserving(i32),
}

#[derive(Default)]
pub struct FakeState {
    pub windows: Vec<FakeWindow>,
    /// When set, the next geometry mutation reassigns the window id.
    pub regenerate_window_id: Option<u32>,
    /// When set, the next geometry/minimize mutation fails with this
    /// message.
    pub fail_next_mutation: Option<String>,
    /// Total `window_attributes` reads, for asserting list endpoints never
    /// touch per-window attributes.
    pub attribute_reads: u32,
    pub displays: Vec<DisplayInfo>,
    pub elements: Vec<FoundElement>,
    pub launchable: HashMap<String, LaunchedApplication>,
    pub running: HashMap<String, i32>,
    pub frontmost: Option<String>,
    pub clipboard: ClipboardSnapshot,
    pub capture_result: Option<CaptureResult>,
    pub open_dialog_answer: Vec<PathBuf>,
    pub save_dialog_answer: Option<PathBuf>,
    /// Sources containing this fragment fail compilation.
    pub compile_error_fragment: Option<String>,
    pub script_output: String,
    pub calls: Vec<RecordedCall>,
    pub capture_requests: Vec<CaptureRequest>,
}

#[derive(Default)]
pub struct FakeSystem {
    pub state: Mutex<FakeState>,
    observers: Mutex<HashMap<i32, mpsc::Sender<AxNotification>>>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_windows(windows: Vec<FakeWindow>) -> Self {
        let fake = Self::new();
        fake.state.lock().unwrap().windows = windows;
        fake
    }

    pub fn push_window(&self, window: FakeWindow) {
        self.state.lock().unwrap().windows.push(window);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Feeds a notification into the pid's observer channel, if attached.
    pub async fn emit(&self, notification: AxNotification) {
        let sender = {
            let observers = self.observers.lock().unwrap();
            observers.get(&notification.pid).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(notification).await;
        }
    }

    pub fn has_observer(&self, pid: i32) -> bool {
        self.observers.lock().unwrap().contains_key(&pid)
    }

    fn record(&self, call: RecordedCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn score(window: &FakeWindow, expected: Rect, title: Option<&str>) -> f64 {
        let bounds = window.info.bounds;
        let distance = ((bounds.x - expected.x).powi(2)
            + (bounds.y - expected.y).powi(2)
            + (bounds.width - expected.width).powi(2)
            + (bounds.height - expected.height).powi(2))
        .sqrt();
        if title.is_some_and(|title| title == window.info.title) {
            distance * 0.5
        } else {
            distance
        }
    }
}

#[async_trait]
impl SystemOperations for FakeSystem {
    async fn open_application(&self, id: &str) -> PlatformResult<LaunchedApplication> {
        let state = self.state.lock().unwrap();
        state
            .launchable
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("application {id}")))
    }

    async fn activate_application(&self, pid: i32) -> PlatformResult<()> {
        self.record(RecordedCall::Activate(pid));
        Ok(())
    }

    async fn terminate_application(&self, pid: i32) -> PlatformResult<()> {
        self.record(RecordedCall::Terminate(pid));
        Ok(())
    }

    async fn running_application(&self, name_or_bundle: &str) -> PlatformResult<Option<i32>> {
        Ok(self.state.lock().unwrap().running.get(name_or_bundle).copied())
    }

    async fn frontmost_application_name(&self) -> PlatformResult<Option<String>> {
        Ok(self.state.lock().unwrap().frontmost.clone())
    }

    async fn list_windows(&self, pid: Option<i32>) -> PlatformResult<Vec<WindowInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .windows
            .iter()
            .filter(|window| pid.is_none_or(|pid| window.info.pid == pid))
            .map(|window| {
                let mut info = window.info.clone();
                info.is_on_screen = info.is_on_screen && !window.minimized;
                info
            })
            .collect())
    }

    async fn find_window_element(
        &self,
        pid: i32,
        expected_bounds: Rect,
        title: Option<&str>,
    ) -> PlatformResult<Option<AxElement>> {
        let state = self.state.lock().unwrap();
        let best = state
            .windows
            .iter()
            .filter(|window| window.info.pid == pid)
            .min_by(|a, b| {
                let score_a = Self::score(a, expected_bounds, title);
                let score_b = Self::score(b, expected_bounds, title);
                score_a.total_cmp(&score_b)
            });
        Ok(best.map(|window| AxElement(window.token)))
    }

    async fn window_attributes(&self, element: AxElement) -> PlatformResult<WindowAttributes> {
        let mut state = self.state.lock().unwrap();
        state.attribute_reads += 1;
        let window = state
            .windows
            .iter_mut()
            .find(|window| window.token == element.0)
            .ok_or_else(|| PlatformError::NotFound(format!("element {}", element.0)))?;

        if let Some(pending) = window.pending_minimized {
            if window.minimize_read_lag > 0 {
                window.minimize_read_lag -= 1;
            } else {
                window.minimized = pending;
                window.pending_minimized = None;
            }
        }

        Ok(WindowAttributes {
            bounds: window.info.bounds,
            title: window.info.title.clone(),
            minimized: window.minimized,
            hidden: window.hidden,
        })
    }

    async fn window_state(&self, element: AxElement) -> PlatformResult<WindowStateAttributes> {
        let state = self.state.lock().unwrap();
        let window = state
            .windows
            .iter()
            .find(|window| window.token == element.0)
            .ok_or_else(|| PlatformError::NotFound(format!("element {}", element.0)))?;
        Ok(WindowStateAttributes {
            resizable: true,
            minimizable: true,
            closable: true,
            minimized: window.minimized,
            ax_hidden: window.hidden,
            ..Default::default()
        })
    }

    async fn set_window_position(&self, element: AxElement, origin: Point) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next_mutation.take() {
            return Err(PlatformError::Failure { code: -25200, message });
        }
        let regen = state.regenerate_window_id.take();
        let window = state
            .windows
            .iter_mut()
            .find(|window| window.token == element.0)
            .ok_or_else(|| PlatformError::NotFound(format!("element {}", element.0)))?;
        window.info.bounds.x = origin.x;
        window.info.bounds.y = origin.y;
        if let Some(new_id) = regen {
            window.info.window_id = new_id;
            window.token = new_id as u64;
        }
        Ok(())
    }

    async fn set_window_size(
        &self,
        element: AxElement,
        width: f64,
        height: f64,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next_mutation.take() {
            return Err(PlatformError::Failure { code: -25200, message });
        }
        let regen = state.regenerate_window_id.take();
        let window = state
            .windows
            .iter_mut()
            .find(|window| window.token == element.0)
            .ok_or_else(|| PlatformError::NotFound(format!("element {}", element.0)))?;
        window.info.bounds.width = width;
        window.info.bounds.height = height;
        if let Some(new_id) = regen {
            window.info.window_id = new_id;
            window.token = new_id as u64;
        }
        Ok(())
    }

    async fn set_window_minimized(
        &self,
        element: AxElement,
        minimized: bool,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next_mutation.take() {
            return Err(PlatformError::Failure { code: -25200, message });
        }
        let window = state
            .windows
            .iter_mut()
            .find(|window| window.token == element.0)
            .ok_or_else(|| PlatformError::NotFound(format!("element {}", element.0)))?;
        if window.minimize_read_lag > 0 {
            window.pending_minimized = Some(minimized);
        } else {
            window.minimized = minimized;
        }
        Ok(())
    }

    async fn press_close_button(&self, element: AxElement) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .windows
            .iter()
            .position(|window| window.token == element.0)
            .ok_or_else(|| PlatformError::NotFound("close button".to_string()))?;
        state.windows.remove(index);
        Ok(())
    }

    async fn displays(&self) -> PlatformResult<Vec<DisplayInfo>> {
        Ok(self.state.lock().unwrap().displays.clone())
    }

    async fn query_elements(
        &self,
        _pid: Option<i32>,
        query: &ElementQuery,
        max_results: usize,
    ) -> PlatformResult<Vec<FoundElement>> {
        let state = self.state.lock().unwrap();
        let matches = |element: &FoundElement| match query {
            ElementQuery::Role(role) => element.role == *role,
            ElementQuery::Text(text) => element.title == *text,
            ElementQuery::TextContains(text) => element.title.contains(text),
            ElementQuery::TextRegex(_) => true,
        };
        Ok(state
            .elements
            .iter()
            .filter(|element| matches(element))
            .take(max_results)
            .cloned()
            .collect())
    }

    async fn post_click(
        &self,
        point: Point,
        button: MouseButtonKind,
        click_count: u32,
    ) -> PlatformResult<()> {
        self.record(RecordedCall::Click {
            point,
            button,
            click_count,
        });
        Ok(())
    }

    async fn type_text(&self, text: &str) -> PlatformResult<()> {
        self.record(RecordedCall::TypeText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, modifiers: &[String], key: &str) -> PlatformResult<()> {
        self.record(RecordedCall::PressKey {
            modifiers: modifiers.to_vec(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn scroll(&self, point: Point, delta_x: f64, delta_y: f64) -> PlatformResult<()> {
        self.record(RecordedCall::Scroll {
            point,
            delta_x,
            delta_y,
        });
        Ok(())
    }

    async fn mouse_down(&self, point: Point) -> PlatformResult<()> {
        self.record(RecordedCall::MouseDown(point));
        Ok(())
    }

    async fn mouse_move(&self, point: Point) -> PlatformResult<()> {
        self.record(RecordedCall::MouseMove(point));
        Ok(())
    }

    async fn mouse_up(&self, point: Point) -> PlatformResult<()> {
        self.record(RecordedCall::MouseUp(point));
        Ok(())
    }

    async fn capture(&self, request: CaptureRequest) -> PlatformResult<CaptureResult> {
        let mut state = self.state.lock().unwrap();
        state.capture_requests.push(request);
        state
            .capture_result
            .clone()
            .ok_or_else(|| PlatformError::Unsupported("capture"))
    }

    async fn read_clipboard(&self) -> PlatformResult<ClipboardSnapshot> {
        Ok(self.state.lock().unwrap().clipboard.clone())
    }

    async fn write_clipboard(&self, data: ClipboardData) -> PlatformResult<()> {
        self.record(RecordedCall::WriteClipboard(data));
        Ok(())
    }

    async fn clear_clipboard(&self) -> PlatformResult<()> {
        self.record(RecordedCall::ClearClipboard);
        Ok(())
    }

    async fn compile_script(
        &self,
        _language: ScriptHostLanguage,
        source: &str,
    ) -> PlatformResult<()> {
        let state = self.state.lock().unwrap();
        match &state.compile_error_fragment {
            Some(fragment) if source.contains(fragment.as_str()) => Err(PlatformError::Failure {
                code: 1,
                message: format!("compile error near {fragment:?}"),
            }),
            _ => Ok(()),
        }
    }

    async fn run_script(
        &self,
        _language: ScriptHostLanguage,
        _source: &str,
    ) -> PlatformResult<ScriptHostOutput> {
        Ok(ScriptHostOutput {
            output: self.state.lock().unwrap().script_output.clone(),
        })
    }

    async fn open_file_dialog(
        &self,
        _options: OpenDialogOptions,
    ) -> PlatformResult<Vec<PathBuf>> {
        Ok(self.state.lock().unwrap().open_dialog_answer.clone())
    }

    async fn save_file_dialog(
        &self,
        _options: SaveDialogOptions,
    ) -> PlatformResult<Option<PathBuf>> {
        Ok(self.state.lock().unwrap().save_dialog_answer.clone())
    }

    async fn reveal_in_file_viewer(&self, path: &Path) -> PlatformResult<()> {
        self.record(RecordedCall::Reveal(path.to_path_buf()));
        Ok(())
    }

    async fn observe_application(
        &self,
        pid: i32,
        _filter: Option<String>,
    ) -> PlatformResult<mpsc::Receiver<AxNotification>> {
        let (sender, receiver) = mpsc::channel(64);
        self.observers.lock().unwrap().insert(pid, sender);
        Ok(receiver)
    }

    async fn stop_observing(&self, pid: i32) -> PlatformResult<()> {
        self.observers.lock().unwrap().remove(&pid);
        self.record(RecordedCall::StopObserving(pid));
        Ok(())
    }
}
