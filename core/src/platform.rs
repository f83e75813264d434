//! The narrow interface to the host: accessibility, window lists, input
//! synthesis, capture, clipboard, scripting hosts, dialogs, and observers.
//!
//! Everything behind [`SystemOperations`] is expected to marshal its own
//! work onto the host's UI-capable worker where required (attribute writes,
//! button presses, window-list queries); callers simply await. Attribute
//! *reads* on a cached handle must not block that worker.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum PlatformError {
    /// The host denied access, typically missing accessibility trust.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A host object the call needed does not exist (window gone, no close
    /// button, unknown display).
    #[error("{0} not found")]
    NotFound(String),

    /// The host API returned a non-success status code.
    #[error("platform call failed (status {code}): {message}")]
    Failure { code: i32, message: String },

    /// Host I/O did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// No host integration provides this capability.
    #[error("unsupported on this host: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ───────────────────────── geometry ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// The zero rect is a legal "no hint" value for element lookup.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.width == 0.0 && self.height == 0.0
    }
}

// ───────────────────────── windows ─────────────────────────

/// One entry of the host window list (on-screen and off-screen alike).
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub window_id: u32,
    pub pid: i32,
    pub bounds: Rect,
    pub title: String,
    /// Host stacking layer; lower is closer to the desktop.
    pub layer: i32,
    pub is_on_screen: bool,
    pub bundle_id: Option<String>,
}

/// An opaque accessibility element handle minted by the adapter. Handles
/// stay valid as long as the adapter keeps the underlying host reference
/// alive; the element registry bounds that with its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxElement(pub u64);

/// The freshly-read per-window attributes (geometry and basic state). These
/// are authoritative for bounds/title/minimized/hidden; z-order and bundle
/// come from the window list instead.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAttributes {
    pub bounds: Rect,
    pub title: String,
    pub minimized: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStateAttributes {
    pub resizable: bool,
    pub minimizable: bool,
    pub closable: bool,
    pub modal: bool,
    pub floating: bool,
    pub ax_hidden: bool,
    pub minimized: bool,
    pub focused: bool,
    pub fullscreen: Option<bool>,
}

// ───────────────────────── displays / apps ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub display_id: u32,
    pub frame: Rect,
    /// Frame excluding menu bar and dock, with a top-left origin.
    pub visible_frame: Rect,
    pub scale: f64,
    pub is_main: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchedApplication {
    pub pid: i32,
    pub display_name: String,
    pub bundle_id: String,
}

// ───────────────────────── elements ─────────────────────────

/// Parsed element selector; matching is performed by the adapter during
/// traversal. `TextRegex` patterns are validated by the core first.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementQuery {
    Role(String),
    Text(String),
    TextContains(String),
    TextRegex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundElement {
    pub token: AxElement,
    pub role: String,
    pub title: String,
    pub bounds: Option<Rect>,
    pub attributes: HashMap<String, String>,
}

// ───────────────────────── input ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButtonKind {
    Left,
    Right,
    Middle,
}

// ───────────────────────── capture ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureTarget {
    Display(u32),
    AllDisplays,
    Window(u32),
    Region(Rect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Png,
    /// Quality clamped to 0..=100 by the caller.
    Jpeg { quality: u8 },
    Tiff,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub target: CaptureTarget,
    pub format: CaptureFormat,
    pub include_ocr_text: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub ocr_text: Option<String>,
}

// ───────────────────────── clipboard ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    Text,
    Rtf,
    Html,
    Image,
    Files,
    Url,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClipboardData {
    Text(String),
    Rtf(String),
    Html(String),
    ImagePng(Vec<u8>),
    Files(Vec<PathBuf>),
    Url(String),
}

impl ClipboardData {
    pub fn kind(&self) -> ClipboardKind {
        match self {
            Self::Text(_) => ClipboardKind::Text,
            Self::Rtf(_) => ClipboardKind::Rtf,
            Self::Html(_) => ClipboardKind::Html,
            Self::ImagePng(_) => ClipboardKind::Image,
            Self::Files(_) => ClipboardKind::Files,
            Self::Url(_) => ClipboardKind::Url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipboardSnapshot {
    /// Types present on the pasteboard, probed in the order text, rtf,
    /// html, image, files, url.
    pub available: Vec<ClipboardKind>,
    /// The first present type's payload.
    pub content: Option<ClipboardData>,
}

// ───────────────────────── scripting hosts ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptHostLanguage {
    AppleScript,
    Jxa,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptHostOutput {
    pub output: String,
}

// ───────────────────────── dialogs ─────────────────────────

#[derive(Debug, Clone, Default)]
pub struct OpenDialogOptions {
    pub allow_multiple: bool,
    pub allowed_extensions: Vec<String>,
    pub default_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SaveDialogOptions {
    pub default_directory: Option<PathBuf>,
    pub default_filename: Option<String>,
    /// When false the host dialog suppresses its overwrite prompt.
    pub confirm_overwrite: bool,
}

// ───────────────────────── observers ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxNotificationKind {
    ApplicationActivated,
    ApplicationDeactivated,
    WindowCreated,
    WindowMoved,
    WindowResized,
    WindowMiniaturized,
    WindowDeminiaturized,
    FocusedUiElementChanged,
    ValueChanged,
    UiElementDestroyed,
}

impl AxNotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationActivated => "applicationActivated",
            Self::ApplicationDeactivated => "applicationDeactivated",
            Self::WindowCreated => "windowCreated",
            Self::WindowMoved => "windowMoved",
            Self::WindowResized => "windowResized",
            Self::WindowMiniaturized => "windowMiniaturized",
            Self::WindowDeminiaturized => "windowDeminiaturized",
            Self::FocusedUiElementChanged => "focusedUIElementChanged",
            Self::ValueChanged => "valueChanged",
            Self::UiElementDestroyed => "uiElementDestroyed",
        }
    }
}

/// One accessibility notification, already re-dispatched off the raw
/// callback thread by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct AxNotification {
    pub pid: i32,
    pub kind: AxNotificationKind,
    pub element_description: String,
}

// ───────────────────────── the trait ─────────────────────────

/// Host operations consumed by the core. One implementation exists per
/// supported host; tests use a scripted fake.
#[async_trait]
pub trait SystemOperations: Send + Sync {
    // Applications.
    async fn open_application(&self, id: &str) -> PlatformResult<LaunchedApplication>;
    async fn activate_application(&self, pid: i32) -> PlatformResult<()>;
    async fn terminate_application(&self, pid: i32) -> PlatformResult<()>;
    /// Resolves a display name or bundle id to a running pid, if any.
    async fn running_application(&self, name_or_bundle: &str) -> PlatformResult<Option<i32>>;
    async fn frontmost_application_name(&self) -> PlatformResult<Option<String>>;

    // Window list and per-window accessibility.
    /// The current window list, including off-screen and minimized windows,
    /// optionally restricted to one pid.
    async fn list_windows(&self, pid: Option<i32>) -> PlatformResult<Vec<WindowInfo>>;
    /// Fetch-by-expected-bounds: returns the element whose bounds score
    /// closest to the hint (origin+size distance, halved on title match),
    /// falling back to the children set for minimized windows. A zero-rect
    /// hint scores across the pid's windows alone.
    async fn find_window_element(
        &self,
        pid: i32,
        expected_bounds: Rect,
        title: Option<&str>,
    ) -> PlatformResult<Option<AxElement>>;
    async fn window_attributes(&self, element: AxElement) -> PlatformResult<WindowAttributes>;
    async fn window_state(&self, element: AxElement) -> PlatformResult<WindowStateAttributes>;
    async fn set_window_position(&self, element: AxElement, origin: Point) -> PlatformResult<()>;
    async fn set_window_size(
        &self,
        element: AxElement,
        width: f64,
        height: f64,
    ) -> PlatformResult<()>;
    async fn set_window_minimized(
        &self,
        element: AxElement,
        minimized: bool,
    ) -> PlatformResult<()>;
    /// Locates and presses the close button. `NotFound` means the window
    /// has no close button.
    async fn press_close_button(&self, element: AxElement) -> PlatformResult<()>;

    // Displays.
    async fn displays(&self) -> PlatformResult<Vec<DisplayInfo>>;

    // Element traversal.
    async fn query_elements(
        &self,
        pid: Option<i32>,
        query: &ElementQuery,
        max_results: usize,
    ) -> PlatformResult<Vec<FoundElement>>;

    // Input synthesis.
    async fn post_click(
        &self,
        point: Point,
        button: MouseButtonKind,
        click_count: u32,
    ) -> PlatformResult<()>;
    async fn type_text(&self, text: &str) -> PlatformResult<()>;
    async fn press_key(&self, modifiers: &[String], key: &str) -> PlatformResult<()>;
    async fn scroll(&self, point: Point, delta_x: f64, delta_y: f64) -> PlatformResult<()>;
    async fn mouse_down(&self, point: Point) -> PlatformResult<()>;
    async fn mouse_move(&self, point: Point) -> PlatformResult<()>;
    async fn mouse_up(&self, point: Point) -> PlatformResult<()>;

    // Capture (the adapter also performs OCR when asked).
    async fn capture(&self, request: CaptureRequest) -> PlatformResult<CaptureResult>;

    // Clipboard.
    async fn read_clipboard(&self) -> PlatformResult<ClipboardSnapshot>;
    async fn write_clipboard(&self, data: ClipboardData) -> PlatformResult<()>;
    async fn clear_clipboard(&self) -> PlatformResult<()>;

    // Scripting hosts (AppleScript / JXA). Shell runs in the core.
    async fn compile_script(
        &self,
        language: ScriptHostLanguage,
        source: &str,
    ) -> PlatformResult<()>;
    async fn run_script(
        &self,
        language: ScriptHostLanguage,
        source: &str,
    ) -> PlatformResult<ScriptHostOutput>;

    // File dialogs. An empty result means the user cancelled.
    async fn open_file_dialog(&self, options: OpenDialogOptions)
    -> PlatformResult<Vec<PathBuf>>;
    async fn save_file_dialog(
        &self,
        options: SaveDialogOptions,
    ) -> PlatformResult<Option<PathBuf>>;
    async fn reveal_in_file_viewer(&self, path: &std::path::Path) -> PlatformResult<()>;

    // Observers. The adapter installs at most one native observer per pid;
    // notifications arrive on the returned channel already serialized in
    // their host arrival order. Dropping the receiver or calling
    // `stop_observing` detaches the native observer.
    async fn observe_application(
        &self,
        pid: i32,
        filter: Option<String>,
    ) -> PlatformResult<mpsc::Receiver<AxNotification>>;
    async fn stop_observing(&self, pid: i32) -> PlatformResult<()>;
}

/// Placeholder adapter for hosts without an integration: every capability
/// reports [`PlatformError::Unsupported`]. The server boots with this when
/// nothing host-specific is wired in, which keeps the control plane
/// (sessions, macros CRUD, operations) usable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSystem;

macro_rules! unsupported {
    ($what:literal) => {
        Err(PlatformError::Unsupported($what))
    };
}

#[async_trait]
impl SystemOperations for UnsupportedSystem {
    async fn open_application(&self, _id: &str) -> PlatformResult<LaunchedApplication> {
        unsupported!("open_application")
    }
    async fn activate_application(&self, _pid: i32) -> PlatformResult<()> {
        unsupported!("activate_application")
    }
    async fn terminate_application(&self, _pid: i32) -> PlatformResult<()> {
        unsupported!("terminate_application")
    }
    async fn running_application(&self, _name_or_bundle: &str) -> PlatformResult<Option<i32>> {
        unsupported!("running_application")
    }
    async fn frontmost_application_name(&self) -> PlatformResult<Option<String>> {
        unsupported!("frontmost_application_name")
    }
    async fn list_windows(&self, _pid: Option<i32>) -> PlatformResult<Vec<WindowInfo>> {
        unsupported!("list_windows")
    }
    async fn find_window_element(
        &self,
        _pid: i32,
        _expected_bounds: Rect,
        _title: Option<&str>,
    ) -> PlatformResult<Option<AxElement>> {
        unsupported!("find_window_element")
    }
    async fn window_attributes(&self, _element: AxElement) -> PlatformResult<WindowAttributes> {
        unsupported!("window_attributes")
    }
    async fn window_state(&self, _element: AxElement) -> PlatformResult<WindowStateAttributes> {
        unsupported!("window_state")
    }
    async fn set_window_position(
        &self,
        _element: AxElement,
        _origin: Point,
    ) -> PlatformResult<()> {
        unsupported!("set_window_position")
    }
    async fn set_window_size(
        &self,
        _element: AxElement,
        _width: f64,
        _height: f64,
    ) -> PlatformResult<()> {
        unsupported!("set_window_size")
    }
    async fn set_window_minimized(
        &self,
        _element: AxElement,
        _minimized: bool,
    ) -> PlatformResult<()> {
        unsupported!("set_window_minimized")
    }
    async fn press_close_button(&self, _element: AxElement) -> PlatformResult<()> {
        unsupported!("press_close_button")
    }
    async fn displays(&self) -> PlatformResult<Vec<DisplayInfo>> {
        unsupported!("displays")
    }
    async fn query_elements(
        &self,
        _pid: Option<i32>,
        _query: &ElementQuery,
        _max_results: usize,
    ) -> PlatformResult<Vec<FoundElement>> {
        unsupported!("query_elements")
    }
    async fn post_click(
        &self,
        _point: Point,
        _button: MouseButtonKind,
        _click_count: u32,
    ) -> PlatformResult<()> {
        unsupported!("post_click")
    }
    async fn type_text(&self, _text: &str) -> PlatformResult<()> {
        unsupported!("type_text")
    }
    async fn press_key(&self, _modifiers: &[String], _key: &str) -> PlatformResult<()> {
        unsupported!("press_key")
    }
    async fn scroll(&self, _point: Point, _delta_x: f64, _delta_y: f64) -> PlatformResult<()> {
        unsupported!("scroll")
    }
    async fn mouse_down(&self, _point: Point) -> PlatformResult<()> {
        unsupported!("mouse_down")
    }
    async fn mouse_move(&self, _point: Point) -> PlatformResult<()> {
        unsupported!("mouse_move")
    }
    async fn mouse_up(&self, _point: Point) -> PlatformResult<()> {
        unsupported!("mouse_up")
    }
    async fn capture(&self, _request: CaptureRequest) -> PlatformResult<CaptureResult> {
        unsupported!("capture")
    }
    async fn read_clipboard(&self) -> PlatformResult<ClipboardSnapshot> {
        unsupported!("read_clipboard")
    }
    async fn write_clipboard(&self, _data: ClipboardData) -> PlatformResult<()> {
        unsupported!("write_clipboard")
    }
    async fn clear_clipboard(&self) -> PlatformResult<()> {
        unsupported!("clear_clipboard")
    }
    async fn compile_script(
        &self,
        _language: ScriptHostLanguage,
        _source: &str,
    ) -> PlatformResult<()> {
        unsupported!("compile_script")
    }
    async fn run_script(
        &self,
        _language: ScriptHostLanguage,
        _source: &str,
    ) -> PlatformResult<ScriptHostOutput> {
        unsupported!("run_script")
    }
    async fn open_file_dialog(
        &self,
        _options: OpenDialogOptions,
    ) -> PlatformResult<Vec<PathBuf>> {
        unsupported!("open_file_dialog")
    }
    async fn save_file_dialog(
        &self,
        _options: SaveDialogOptions,
    ) -> PlatformResult<Option<PathBuf>> {
        unsupported!("save_file_dialog")
    }
    async fn reveal_in_file_viewer(&self, _path: &std::path::Path) -> PlatformResult<()> {
        unsupported!("reveal_in_file_viewer")
    }
    async fn observe_application(
        &self,
        _pid: i32,
        _filter: Option<String>,
    ) -> PlatformResult<mpsc::Receiver<AxNotification>> {
        unsupported!("observe_application")
    }
    async fn stop_observing(&self, _pid: i32) -> PlatformResult<()> {
        unsupported!("stop_observing")
    }
}
