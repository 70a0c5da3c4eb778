use manos_plate_core::Editor;
use serde::{Deserialize, Serialize};

/// Gap between the anchor's bottom edge and the floating control.
const ANCHOR_GAP: f32 = 10.0;
/// Minimum distance kept from either side of the viewport.
const EDGE_MARGIN: f32 = 5.0;
/// Width assumed for a control that has not been measured yet.
pub const DEFAULT_POPUP_WIDTH: f32 = 200.0;

/// Rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub scroll_x: f32,
    pub scroll_y: f32,
}

/// Where the host asks us to anchor floating controls. Rendering is not ours,
/// so geometry comes from outside.
pub trait AnchorProvider {
    /// Bounding box of the current selection, if it is on screen.
    fn selection_rect(&self, editor: &Editor) -> Option<Rect>;
    fn viewport(&self) -> Viewport;
}

/// An anchor provider for hosts without layout (and for tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAnchor {
    pub rect: Option<Rect>,
    pub viewport: Viewport,
}

impl AnchorProvider for FixedAnchor {
    fn selection_rect(&self, _editor: &Editor) -> Option<Rect> {
        self.rect
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }
}

/// Document-space position of a floating control's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatingPosition {
    pub top: f32,
    pub left: f32,
}

impl FloatingPosition {
    /// Just under `anchor`, with the left edge clamped so a control of
    /// `popup_width` (or the default width when unmeasured) stays inside the
    /// viewport.
    pub fn below(anchor: Rect, viewport: Viewport, popup_width: Option<f32>) -> Self {
        let width = popup_width
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_POPUP_WIDTH);
        let top = anchor.bottom() + viewport.scroll_y + ANCHOR_GAP;
        let max_left = viewport.width - width - EDGE_MARGIN;
        let left = (anchor.x + viewport.scroll_x).min(max_left).max(EDGE_MARGIN);
        Self { top, left }
    }
}
