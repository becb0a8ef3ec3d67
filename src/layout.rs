//! Layout engine: default placement, drag clamping, resizing and grid snapping.
//! Pure geometry, no I/O.

use crate::element::{Dimension, Element, ElementType};
use crate::ElementId;
use serde::{Deserialize, Serialize};

/// Grid step all drags and resizes snap to
pub const GRID_SIZE: f32 = 10.0;

/// Vertical gap between a new element and the sibling above it
pub const PLACEMENT_GAP: f32 = 10.0;

pub const FALLBACK_WIDTH: f32 = 200.0;
pub const FALLBACK_HEIGHT: f32 = 150.0;
pub const CONTAINER_FALLBACK_WIDTH: f32 = 400.0;
pub const CONTAINER_FALLBACK_HEIGHT: f32 = 300.0;

/// Origin of the first top-level element
pub const TOP_LEVEL_BASE: f32 = 100.0;
/// Origin of the first element inside a container
pub const NESTED_BASE: f32 = 10.0;

pub const MIN_WIDTH: f32 = 50.0;
pub const MIN_HEIGHT: f32 = 30.0;
pub const DIVIDER_MIN_HEIGHT: f32 = 2.0;

pub const DEFAULT_CANVAS: Size = Size {
    width: 1000.0,
    height: 1000.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for Size {
    fn default() -> Self {
        DEFAULT_CANVAS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Rectangle representing resolved position and size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Shift by an offset (used to turn parent-relative into canvas coordinates)
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }
}

/// Resize handle, named by compass point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::N,
        ResizeHandle::S,
        ResizeHandle::E,
        ResizeHandle::W,
        ResizeHandle::NE,
        ResizeHandle::NW,
        ResizeHandle::SE,
        ResizeHandle::SW,
    ];

    pub fn moves_left_edge(&self) -> bool {
        matches!(self, ResizeHandle::W | ResizeHandle::NW | ResizeHandle::SW)
    }

    pub fn moves_right_edge(&self) -> bool {
        matches!(self, ResizeHandle::E | ResizeHandle::NE | ResizeHandle::SE)
    }

    pub fn moves_top_edge(&self) -> bool {
        matches!(self, ResizeHandle::N | ResizeHandle::NE | ResizeHandle::NW)
    }

    pub fn moves_bottom_edge(&self) -> bool {
        matches!(self, ResizeHandle::S | ResizeHandle::SE | ResizeHandle::SW)
    }

    /// Handle position as fractions of the element's width and height
    pub fn anchor(&self) -> (f32, f32) {
        match self {
            ResizeHandle::N => (0.5, 0.0),
            ResizeHandle::S => (0.5, 1.0),
            ResizeHandle::E => (1.0, 0.5),
            ResizeHandle::W => (0.0, 0.5),
            ResizeHandle::NE => (1.0, 0.0),
            ResizeHandle::NW => (0.0, 0.0),
            ResizeHandle::SE => (1.0, 1.0),
            ResizeHandle::SW => (0.0, 1.0),
        }
    }
}

/// Position and declared size of an element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub x: f32,
    pub y: f32,
    pub width: Dimension,
    pub height: Dimension,
}

impl Geometry {
    pub fn of(element: &Element) -> Self {
        Self {
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
        }
    }

    pub fn apply_to(&self, element: &mut Element) {
        element.x = self.x;
        element.y = self.y;
        element.width = self.width;
        element.height = self.height;
    }
}

/// Round to the nearest grid multiple (halves round up)
pub fn snap(value: f32) -> f32 {
    (value / GRID_SIZE + 0.5).floor() * GRID_SIZE
}

/// Extent used for a symbolic dimension when no container extent applies
pub fn fallback_extent(element_type: ElementType, axis: Axis) -> f32 {
    match (element_type, axis) {
        (ElementType::Container, Axis::Horizontal) => CONTAINER_FALLBACK_WIDTH,
        (ElementType::Container, Axis::Vertical) => CONTAINER_FALLBACK_HEIGHT,
        (_, Axis::Horizontal) => FALLBACK_WIDTH,
        (_, Axis::Vertical) => FALLBACK_HEIGHT,
    }
}

pub fn min_size(element_type: ElementType) -> Size {
    let min_height = match element_type {
        ElementType::Divider => DIVIDER_MIN_HEIGHT,
        _ => MIN_HEIGHT,
    };
    Size::new(MIN_WIDTH, min_height)
}

fn dimension(element: &Element, axis: Axis) -> Dimension {
    match axis {
        Axis::Horizontal => element.width,
        Axis::Vertical => element.height,
    }
}

fn canvas_extent(canvas: Size, axis: Axis) -> f32 {
    match axis {
        Axis::Horizontal => canvas.width,
        Axis::Vertical => canvas.height,
    }
}

/// Resolve an element's pixel extent on one axis.
///
/// `100%` takes the extent of the element's container, walking up the
/// parent chain until a pixel value, `auto`, or the canvas is reached.
pub fn resolve_extent<'a, F>(element: &'a Element, axis: Axis, canvas: Size, lookup: F) -> f32
where
    F: Fn(&ElementId) -> Option<&'a Element>,
{
    let mut current = element;
    // A malformed parent chain must not loop forever.
    for _ in 0..=1024 {
        match dimension(current, axis) {
            Dimension::Px(v) => return v,
            Dimension::Auto => return fallback_extent(current.element_type(), axis),
            Dimension::Full => match current.parent_id.as_ref().and_then(&lookup) {
                Some(parent) => current = parent,
                None => return canvas_extent(canvas, axis),
            },
        }
    }
    canvas_extent(canvas, axis)
}

/// Default origin for a new element placed among `siblings`.
///
/// The new element goes `PLACEMENT_GAP` below the sibling whose bottom edge
/// is lowest, aligned with its `x`.
pub fn default_placement<'a, I>(siblings: I, nested: bool) -> (f32, f32)
where
    I: IntoIterator<Item = &'a Element>,
{
    let bottom = |el: &Element| el.y + el.height.as_px().unwrap_or(FALLBACK_HEIGHT);

    let mut lowest: Option<&Element> = None;
    for sibling in siblings {
        // First of equal candidates wins
        if lowest.map_or(true, |current| bottom(sibling) > bottom(current)) {
            lowest = Some(sibling);
        }
    }

    match lowest {
        Some(sibling) => (sibling.x, bottom(sibling) + PLACEMENT_GAP),
        None if nested => (NESTED_BASE, NESTED_BASE),
        None => (TOP_LEVEL_BASE, TOP_LEVEL_BASE),
    }
}

fn clamp_axis(proposed: f32, element_extent: f32, container_extent: f32) -> f32 {
    let upper = (container_extent - element_extent).max(0.0);
    let clamped = proposed.clamp(0.0, upper);
    let mut snapped = snap(clamped);
    if snapped > upper {
        snapped -= GRID_SIZE;
    }
    snapped.max(0.0)
}

/// Clamp a proposed position into `[0, container - element]` and snap it to the grid
pub fn clamp_move(x: f32, y: f32, element_extent: Size, container_extent: Size) -> (f32, f32) {
    (
        clamp_axis(x, element_extent.width, container_extent.width),
        clamp_axis(y, element_extent.height, container_extent.height),
    )
}

/// Apply a resize drag.
///
/// Deltas are snapped to the grid first. Handles on the left or top edge
/// move the origin so the opposite edge stays put. `100%` axes are not
/// resizable; `auto` axes start from `fallback`.
pub fn resize(
    geometry: Geometry,
    handle: ResizeHandle,
    dx: f32,
    dy: f32,
    min: Size,
    fallback: Size,
) -> Geometry {
    let mut next = geometry;
    let snapped_dx = snap(dx);
    let snapped_dy = snap(dy);

    if geometry.width != Dimension::Full {
        let width = geometry.width.as_px().unwrap_or(fallback.width);
        if handle.moves_right_edge() {
            next.width = Dimension::Px((width + snapped_dx).max(min.width));
        } else if handle.moves_left_edge() {
            // Growth stops at the left bound so the right edge stays put
            let right = geometry.x + width;
            let new_width = (width - snapped_dx).max(min.width).min(right.max(min.width));
            next.width = Dimension::Px(new_width);
            next.x = (right - new_width).max(0.0);
        }
    }

    if geometry.height != Dimension::Full {
        let height = geometry.height.as_px().unwrap_or(fallback.height);
        if handle.moves_bottom_edge() {
            next.height = Dimension::Px((height + snapped_dy).max(min.height));
        } else if handle.moves_top_edge() {
            let bottom = geometry.y + height;
            let new_height = (height - snapped_dy).max(min.height).min(bottom.max(min.height));
            next.height = Dimension::Px(new_height);
            next.y = (bottom - new_height).max(0.0);
        }
    }

    next
}
