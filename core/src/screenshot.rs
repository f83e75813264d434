//! Screenshot orchestration: validate the target, resolve it to a capture
//! primitive, and route to the platform adapter (which also performs OCR
//! when asked). No pixels are touched here.

use std::sync::Arc;

use crate::convert::rect_from_proto;
use crate::element_registry::ElementRegistry;
use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::CaptureFormat;
use crate::platform::CaptureRequest;
use crate::platform::CaptureTarget;
use crate::platform::Rect;
use crate::platform::SystemOperations;
use crate::resource_name::parse_element_name;
use crate::resource_name::parse_window_name;
use crate::validation::require_dimension;
use crate::validation::require_non_negative;

use macos_use_proto::macosusesdk::v1::ImageFormat;
use macos_use_proto::macosusesdk::v1::Screenshot;
use macos_use_proto::macosusesdk::v1::TakeScreenshotRequest;
use macos_use_proto::macosusesdk::v1::take_screenshot_request::Target;

pub struct ScreenshotService {
    system: Arc<dyn SystemOperations>,
    elements: Arc<ElementRegistry>,
}

impl ScreenshotService {
    pub fn new(system: Arc<dyn SystemOperations>, elements: Arc<ElementRegistry>) -> Self {
        Self { system, elements }
    }

    pub async fn take(&self, request: TakeScreenshotRequest) -> Result<Screenshot> {
        require_non_negative("padding", request.padding)?;

        let target = match &request.target {
            // No target: capture every display composited.
            None => CaptureTarget::AllDisplays,
            Some(Target::DisplayId(display_id)) => CaptureTarget::Display(*display_id),
            Some(Target::Window(window)) => {
                let parsed = parse_window_name(window)?;
                CaptureTarget::Window(parsed.window_id)
            }
            Some(Target::Element(element)) => {
                let parsed = parse_element_name(element)?;
                let element = self.elements.get(&parsed.id).await?;
                let bounds = element.bounds.as_ref().ok_or_else(|| {
                    AutomationError::failed_precondition(
                        reason::ELEMENT_WITHOUT_BOUNDS,
                        format!("element {} has no bounds to capture", parsed.id),
                    )
                })?;
                CaptureTarget::Region(pad_rect(rect_from_proto(bounds), request.padding))
            }
            Some(Target::Region(region)) => {
                require_dimension("region.width", region.width)?;
                require_dimension("region.height", region.height)?;
                crate::validation::require_coordinate("region.x", region.x)?;
                crate::validation::require_coordinate("region.y", region.y)?;
                CaptureTarget::Region(rect_from_proto(region))
            }
        };

        let format = resolve_format(request.format(), request.quality);
        let capture = self
            .system
            .capture(CaptureRequest {
                target,
                format,
                include_ocr_text: request.include_ocr_text,
            })
            .await?;

        Ok(Screenshot {
            data: capture.data,
            width: capture.width as i32,
            height: capture.height as i32,
            format: proto_format(format) as i32,
            ocr_text: capture.ocr_text.unwrap_or_default(),
        })
    }
}

fn pad_rect(rect: Rect, padding: f64) -> Rect {
    Rect::new(
        rect.x - padding,
        rect.y - padding,
        rect.width + padding * 2.0,
        rect.height + padding * 2.0,
    )
}

/// PNG unless asked otherwise; jpeg quality is clamped into [0, 100].
fn resolve_format(format: ImageFormat, quality: i32) -> CaptureFormat {
    match format {
        ImageFormat::Jpeg => CaptureFormat::Jpeg {
            quality: quality.clamp(0, 100) as u8,
        },
        ImageFormat::Tiff => CaptureFormat::Tiff,
        ImageFormat::Png | ImageFormat::Unspecified => CaptureFormat::Png,
    }
}

fn proto_format(format: CaptureFormat) -> ImageFormat {
    match format {
        CaptureFormat::Png => ImageFormat::Png,
        CaptureFormat::Jpeg { .. } => ImageFormat::Jpeg,
        CaptureFormat::Tiff => ImageFormat::Tiff,
    }
}
