//! Conversions between internal platform types and wire messages.

use crate::platform;
use macos_use_proto::macosusesdk::v1 as pb;

pub fn rect_to_proto(rect: platform::Rect) -> pb::Rect {
    pb::Rect {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

pub fn rect_from_proto(rect: &pb::Rect) -> platform::Rect {
    platform::Rect::new(rect.x, rect.y, rect.width, rect.height)
}

pub fn point_from_proto(point: &pb::Point) -> platform::Point {
    platform::Point::new(point.x, point.y)
}
