//! Clipboard access plus a bounded in-memory history.
//!
//! Reads probe the pasteboard types in a fixed order (text, rtf, html,
//! image, files, url) and surface the first present type as the primary
//! content. Successful writes append a history entry stamped with the
//! frontmost application; history keeps the newest 100 entries.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::AutomationError;
use crate::error::Result;
use crate::platform::ClipboardData;
use crate::platform::ClipboardKind;
use crate::platform::SystemOperations;
use crate::util::now_timestamp;

use macos_use_proto::macosusesdk::v1::Clipboard;
use macos_use_proto::macosusesdk::v1::ClipboardContent;
use macos_use_proto::macosusesdk::v1::ClipboardHistory;
use macos_use_proto::macosusesdk::v1::ClipboardHistoryEntry;
use macos_use_proto::macosusesdk::v1::ClipboardType;
use macos_use_proto::macosusesdk::v1::FileList;
use macos_use_proto::macosusesdk::v1::clipboard_content::Content;

pub const CLIPBOARD_RESOURCE: &str = "clipboard";
pub const CLIPBOARD_HISTORY_RESOURCE: &str = "clipboard/history";

const HISTORY_CAPACITY: usize = 100;

pub struct ClipboardManager {
    system: Arc<dyn SystemOperations>,
    history: Mutex<VecDeque<ClipboardHistoryEntry>>,
}

impl ClipboardManager {
    pub fn new(system: Arc<dyn SystemOperations>) -> Self {
        Self {
            system,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn read(&self) -> Result<Clipboard> {
        let snapshot = self.system.read_clipboard().await?;
        Ok(Clipboard {
            name: CLIPBOARD_RESOURCE.to_string(),
            content: snapshot.content.map(content_to_proto),
            available_types: snapshot
                .available
                .into_iter()
                .map(|kind| kind_to_proto(kind) as i32)
                .collect(),
        })
    }

    /// Clears the pasteboard, writes the new content, and records the write
    /// in history with the active application's name.
    pub async fn write(&self, content: ClipboardContent) -> Result<Clipboard> {
        let data = content_from_proto(&content)?;
        let kind = data.kind();

        self.system.clear_clipboard().await?;
        self.system.write_clipboard(data).await?;

        let source_application = self
            .system
            .frontmost_application_name()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let entry = ClipboardHistoryEntry {
            content: Some(content.clone()),
            copy_time: Some(now_timestamp()),
            source_application,
        };
        {
            let mut history = self.history.lock().await;
            history.push_front(entry);
            history.truncate(HISTORY_CAPACITY);
        }

        Ok(Clipboard {
            name: CLIPBOARD_RESOURCE.to_string(),
            content: Some(content),
            available_types: vec![kind_to_proto(kind) as i32],
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.system.clear_clipboard().await?;
        Ok(())
    }

    /// Newest-first history, capped at 100 entries.
    pub async fn history(&self) -> ClipboardHistory {
        let history = self.history.lock().await;
        ClipboardHistory {
            name: CLIPBOARD_HISTORY_RESOURCE.to_string(),
            entries: history.iter().cloned().collect(),
        }
    }
}

fn kind_to_proto(kind: ClipboardKind) -> ClipboardType {
    match kind {
        ClipboardKind::Text => ClipboardType::Text,
        ClipboardKind::Rtf => ClipboardType::Rtf,
        ClipboardKind::Html => ClipboardType::Html,
        ClipboardKind::Image => ClipboardType::Image,
        ClipboardKind::Files => ClipboardType::Files,
        ClipboardKind::Url => ClipboardType::Url,
    }
}

fn content_to_proto(data: ClipboardData) -> ClipboardContent {
    let content = match data {
        ClipboardData::Text(text) => Content::Text(text),
        ClipboardData::Rtf(rtf) => Content::Rtf(rtf),
        ClipboardData::Html(html) => Content::Html(html),
        ClipboardData::ImagePng(bytes) => Content::ImagePng(bytes),
        ClipboardData::Files(paths) => Content::Files(FileList {
            paths: paths
                .into_iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
        }),
        ClipboardData::Url(url) => Content::Url(url),
    };
    ClipboardContent {
        content: Some(content),
    }
}

fn content_from_proto(content: &ClipboardContent) -> Result<ClipboardData> {
    let content = content
        .content
        .as_ref()
        .ok_or_else(|| AutomationError::required_field("content"))?;
    Ok(match content {
        Content::Text(text) => ClipboardData::Text(text.clone()),
        Content::Rtf(rtf) => ClipboardData::Rtf(rtf.clone()),
        Content::Html(html) => ClipboardData::Html(html.clone()),
        Content::ImagePng(bytes) => ClipboardData::ImagePng(bytes.clone()),
        Content::Files(files) => {
            ClipboardData::Files(files.paths.iter().map(PathBuf::from).collect())
        }
        Content::Url(url) => ClipboardData::Url(url.clone()),
    })
}
