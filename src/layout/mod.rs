//! Layout engine: floating snap regions, viewport clamping, BSP tiling,
//! and window animations.
//!
//! Floating windows move freely inside the usable viewport — everything
//! below the top margin and above (or below) the dockbar. Clamping
//! guarantees a grabbable remnant: at least [`MIN_VISIBLE_COLS`] columns
//! and [`MIN_VISIBLE_ROWS`] rows stay on screen, and the top edge never
//! rises above the margin. The clamp is idempotent.

pub mod animation;
pub mod bsp;

pub use animation::{Animation, AnimationSet};
pub use bsp::{AutoScheme, BspNode, BspTree, Orientation, SerializedBsp};

use serde::{Deserialize, Serialize};

use crate::geom::Rect;
use crate::window::{MIN_WINDOW_HEIGHT, MIN_WINDOW_WIDTH};

/// Columns of a window that must stay visible after any action.
pub const MIN_VISIBLE_COLS: i32 = 20;
/// Rows of a window that must stay visible after any action.
pub const MIN_VISIBLE_ROWS: i32 = 3;

/// Where the dockbar sits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockbarPosition {
    /// Top of the screen (pushes the top margin down).
    Top,
    /// Bottom of the screen.
    #[default]
    Bottom,
    /// Not shown.
    Hidden,
}

/// The host viewport and its reserved chrome rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Host width in columns.
    pub width: u16,
    /// Host height in rows.
    pub height: u16,
    /// Dockbar placement.
    pub dockbar: DockbarPosition,
}

impl Viewport {
    /// Rows the dockbar occupies.
    pub fn dockbar_height(&self) -> u16 {
        match self.dockbar {
            DockbarPosition::Hidden => 0,
            _ => 1,
        }
    }

    /// First row windows may occupy.
    pub fn top_margin(&self) -> u16 {
        match self.dockbar {
            DockbarPosition::Top => 1,
            _ => 0,
        }
    }

    /// The rectangle windows may occupy.
    pub fn usable(&self) -> Rect {
        let top = self.top_margin();
        Rect::new(
            0,
            top as i32,
            self.width,
            self.height.saturating_sub(self.dockbar_height()),
        )
    }
}

/// Predefined snap targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapRegion {
    /// Left half of the usable area.
    Left,
    /// Right half.
    Right,
    /// Top-left quarter.
    TopLeft,
    /// Top-right quarter.
    TopRight,
    /// Bottom-left quarter.
    BottomLeft,
    /// Bottom-right quarter.
    BottomRight,
    /// The whole usable area.
    Fullscreen,
}

impl SnapRegion {
    /// Parse a user-facing direction token.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "top-left" | "topleft" => Some(Self::TopLeft),
            "top-right" | "topright" => Some(Self::TopRight),
            "bottom-left" | "bottomleft" => Some(Self::BottomLeft),
            "bottom-right" | "bottomright" => Some(Self::BottomRight),
            "fullscreen" | "full" => Some(Self::Fullscreen),
            _ => None,
        }
    }
}

/// Target bounds for a snap region within the viewport.
pub fn snap_bounds(region: SnapRegion, viewport: &Viewport) -> Rect {
    let area = viewport.usable();
    let half_w = area.w / 2;
    let half_h = area.h / 2;
    let right_w = area.w - half_w;
    let bottom_h = area.h - half_h;
    match region {
        SnapRegion::Left => Rect::new(area.x, area.y, half_w, area.h),
        SnapRegion::Right => Rect::new(area.x + half_w as i32, area.y, right_w, area.h),
        SnapRegion::TopLeft => Rect::new(area.x, area.y, half_w, half_h),
        SnapRegion::TopRight => Rect::new(area.x + half_w as i32, area.y, right_w, half_h),
        SnapRegion::BottomLeft => {
            Rect::new(area.x, area.y + half_h as i32, half_w, bottom_h)
        }
        SnapRegion::BottomRight => Rect::new(
            area.x + half_w as i32,
            area.y + half_h as i32,
            right_w,
            bottom_h,
        ),
        SnapRegion::Fullscreen => area,
    }
}

/// Clamp floating bounds so the window stays usable.
///
/// Enforces the minimum window size, keeps at least [`MIN_VISIBLE_COLS`] ×
/// [`MIN_VISIBLE_ROWS`] on screen, and never lets the top edge rise above
/// the margin. Running it twice gives the same result as once.
pub fn clamp_to_view(bounds: Rect, viewport: &Viewport) -> Rect {
    let area = viewport.usable();
    let w = bounds.w.max(MIN_WINDOW_WIDTH);
    let h = bounds.h.max(MIN_WINDOW_HEIGHT);

    let min_visible_w = MIN_VISIBLE_COLS.min(w as i32);
    let min_visible_h = MIN_VISIBLE_ROWS.min(h as i32);

    // Horizontal: allow hanging off either edge, keeping the remnant.
    let min_x = min_visible_w - w as i32;
    let max_x = area.right() - min_visible_w;
    let x = bounds.x.clamp(min_x, max_x.max(min_x));

    // Vertical: the top edge never goes above the margin.
    let min_y = area.y;
    let max_y = area.bottom() - min_visible_h;
    let y = bounds.y.clamp(min_y, max_y.max(min_y));

    Rect::new(x, y, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport {
            width: 120,
            height: 40,
            dockbar: DockbarPosition::Bottom,
        }
    }

    #[test]
    fn usable_excludes_dockbar() {
        let v = viewport();
        assert_eq!(v.usable(), Rect::new(0, 0, 120, 39));

        let top = Viewport {
            dockbar: DockbarPosition::Top,
            ..v
        };
        assert_eq!(top.usable(), Rect::new(0, 1, 120, 39));

        let hidden = Viewport {
            dockbar: DockbarPosition::Hidden,
            ..v
        };
        assert_eq!(hidden.usable(), Rect::new(0, 0, 120, 40));
    }

    #[test]
    fn snap_halves_cover_the_viewport() {
        let v = viewport();
        let left = snap_bounds(SnapRegion::Left, &v);
        let right = snap_bounds(SnapRegion::Right, &v);
        assert_eq!(left, Rect::new(0, 0, 60, 39));
        assert_eq!(right, Rect::new(60, 0, 60, 39));
        assert_eq!(left.w + right.w, 120);
    }

    #[test]
    fn snap_quarters_tile_without_gaps() {
        let v = Viewport {
            width: 121,
            height: 41,
            dockbar: DockbarPosition::Bottom,
        };
        let tl = snap_bounds(SnapRegion::TopLeft, &v);
        let br = snap_bounds(SnapRegion::BottomRight, &v);
        assert_eq!(tl.w + br.w, 121);
        assert_eq!(tl.h + br.h, 40);
        assert_eq!(br.right(), 121);
        assert_eq!(br.bottom(), 40);
    }

    #[test]
    fn fullscreen_is_the_usable_area() {
        let v = viewport();
        assert_eq!(snap_bounds(SnapRegion::Fullscreen, &v), v.usable());
    }

    #[test]
    fn clamp_keeps_minimum_remnant() {
        let v = viewport();
        // Dragged far off the right edge.
        let clamped = clamp_to_view(Rect::new(500, 10, 40, 10), &v);
        assert_eq!(clamped.x, 120 - MIN_VISIBLE_COLS);
        // Far off the left edge.
        let clamped = clamp_to_view(Rect::new(-500, 10, 40, 10), &v);
        assert_eq!(clamped.x, MIN_VISIBLE_COLS - 40);
    }

    #[test]
    fn clamp_top_edge_never_above_margin() {
        let v = Viewport {
            dockbar: DockbarPosition::Top,
            ..viewport()
        };
        let clamped = clamp_to_view(Rect::new(10, -5, 40, 10), &v);
        assert_eq!(clamped.y, 1);
    }

    #[test]
    fn clamp_enforces_minimum_size() {
        let v = viewport();
        let clamped = clamp_to_view(Rect::new(0, 0, 2, 1), &v);
        assert_eq!(clamped.w, MIN_WINDOW_WIDTH);
        assert_eq!(clamped.h, MIN_WINDOW_HEIGHT);
    }

    #[test]
    fn clamp_is_idempotent() {
        let v = viewport();
        for bounds in [
            Rect::new(-300, -20, 50, 12),
            Rect::new(300, 200, 30, 8),
            Rect::new(10, 10, 5, 2),
        ] {
            let once = clamp_to_view(bounds, &v);
            let twice = clamp_to_view(once, &v);
            assert_eq!(once, twice, "clamp not idempotent for {bounds:?}");
        }
    }

    #[test]
    fn snap_region_parse_tokens() {
        assert_eq!(SnapRegion::parse("left"), Some(SnapRegion::Left));
        assert_eq!(SnapRegion::parse("top-right"), Some(SnapRegion::TopRight));
        assert_eq!(SnapRegion::parse("full"), Some(SnapRegion::Fullscreen));
        assert_eq!(SnapRegion::parse("diagonal"), None);
    }
}
