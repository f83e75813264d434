//! Display handlers: read-only views over the host display list.

use macos_use_core::convert::rect_to_proto;
use macos_use_core::error::AutomationError;
use macos_use_core::error::Result;
use macos_use_core::error::reason;
use macos_use_core::platform::DisplayInfo;
use macos_use_core::resource_name::display_name;
use macos_use_core::resource_name::parse_display_name;

use macos_use_proto::macosusesdk::v1::Display;
use macos_use_proto::macosusesdk::v1::GetDisplayRequest;
use macos_use_proto::macosusesdk::v1::ListDisplaysRequest;
use macos_use_proto::macosusesdk::v1::ListDisplaysResponse;

use super::AutomationService;

fn display_to_proto(info: DisplayInfo) -> Display {
    Display {
        name: display_name(info.display_id),
        display_id: info.display_id,
        frame: Some(rect_to_proto(info.frame)),
        visible_frame: Some(rect_to_proto(info.visible_frame)),
        scale: info.scale,
        is_main: info.is_main,
    }
}

impl AutomationService {
    pub(crate) async fn handle_list_displays(
        &self,
        _request: ListDisplaysRequest,
    ) -> Result<ListDisplaysResponse> {
        let mut displays: Vec<Display> = self
            .system
            .displays()
            .await?
            .into_iter()
            .map(display_to_proto)
            .collect();
        displays.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ListDisplaysResponse { displays })
    }

    pub(crate) async fn handle_get_display(&self, request: GetDisplayRequest) -> Result<Display> {
        let parsed = parse_display_name(&request.name)?;
        self.system
            .displays()
            .await?
            .into_iter()
            .find(|display| display.display_id == parsed.display_id)
            .map(display_to_proto)
            .ok_or_else(|| {
                AutomationError::not_found(reason::DISPLAY_NOT_FOUND, "display", request.name)
            })
    }
}
