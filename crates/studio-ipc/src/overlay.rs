//! Overlay and downstream-key records.

use serde::{Deserialize, Serialize};

/// Whether an overlay is composited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayStatus {
    #[default]
    Up,
    Down,
}

/// A graphic overlay, keyed by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Overlay {
    /// Character generator: a set of image and text items.
    Cg(CgOverlay),
}

impl Overlay {
    /// Overlay id.
    pub fn id(&self) -> &str {
        match self {
            Self::Cg(cg) => &cg.id,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            Self::Cg(cg) => &cg.name,
        }
    }

    /// Requested initial status, if any.
    pub fn requested_status(&self) -> Option<OverlayStatus> {
        match self {
            Self::Cg(cg) => cg.status,
        }
    }

    /// Kind name as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cg(_) => "cg",
        }
    }
}

/// Character generator overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgOverlay {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OverlayStatus>,

    /// Coordinate space the items are laid out in.
    pub base_width: u32,
    pub base_height: u32,

    /// Items, drawn in order.
    #[serde(default)]
    pub items: Vec<CgItem>,
}

/// Position and size of a CG item in the overlay's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A CG item, keyed by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CgItem {
    Image(CgImage),
    Text(CgText),
}

impl CgItem {
    /// Placement of the item.
    pub fn rect(&self) -> ItemRect {
        match self {
            Self::Image(image) => image.rect,
            Self::Text(text) => text.rect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgImage {
    #[serde(flatten)]
    pub rect: ItemRect,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgText {
    #[serde(flatten)]
    pub rect: ItemRect,
    pub content: String,
    pub font_size: u32,
    pub font_family: String,
    /// Eight hex digits, alpha first.
    #[serde(rename = "colorABGR")]
    pub color_abgr: String,
}

/// Overlay as reported by `get_overlays`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayView {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: OverlayStatus,
    pub overlay: Overlay,
}

/// Anchor point of a downstream key on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
    TopLeft,
    Center,
}

/// Horizontal or vertical alignment of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Start,
    Middle,
    End,
}

impl Position {
    /// Horizontal and vertical alignment of the anchor.
    pub fn alignment(self) -> (Align, Align) {
        match self {
            Self::TopLeft => (Align::Start, Align::Start),
            Self::Top => (Align::Middle, Align::Start),
            Self::TopRight => (Align::End, Align::Start),
            Self::Left => (Align::Start, Align::Middle),
            Self::Center => (Align::Middle, Align::Middle),
            Self::Right => (Align::End, Align::Middle),
            Self::BottomLeft => (Align::Start, Align::End),
            Self::Bottom => (Align::Middle, Align::End),
            Self::BottomRight => (Align::End, Align::End),
        }
    }

    /// Wire name of the anchor.
    pub fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::TopRight => "top-right",
            Self::Right => "right",
            Self::BottomRight => "bottom-right",
            Self::Bottom => "bottom",
            Self::BottomLeft => "bottom-left",
            Self::Left => "left",
            Self::TopLeft => "top-left",
            Self::Center => "center",
        }
    }
}

/// Downstream key: an always-on-top image layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dsk {
    pub id: String,
    pub position: Position,
    pub url: String,
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}
