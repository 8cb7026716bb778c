//! Scroll-anchored virtual list state.
//!
//! Tracks measured row heights and whether the viewport is pinned to the
//! newest row. On growth it either follows the tail or raises the "new
//! message" indicator; it never moves the user's scroll position unless
//! they were already at the bottom or explicitly jump to the latest row.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::ChatConfig;

/// Geometry reported by the last scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub scroll_height: f64,
}

impl ScrollMetrics {
    pub fn is_at_bottom(&self, threshold: f64) -> bool {
        self.scroll_top + self.viewport_height >= self.scroll_height - threshold
    }
}

/// What the view should do after the row count changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDecision {
    /// Scroll to this row; the indicator and unread counter are cleared.
    ScrollTo(usize),
    /// Keep the position and show the "new message" indicator.
    ShowIndicator,
    /// Rows were removed; every height must be measured again.
    Remeasure,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct TimelineViewport {
    heights: Vec<Option<f64>>,
    is_at_bottom: bool,
    pending_new_message: bool,
    scroll_target: Option<usize>,
    threshold: f64,
    estimated_row_height: f64,
}

impl TimelineViewport {
    pub fn new(threshold: f64, estimated_row_height: f64) -> Self {
        Self {
            heights: Vec::new(),
            is_at_bottom: true,
            pending_new_message: false,
            scroll_target: None,
            threshold,
            estimated_row_height,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.bottom_threshold_px, config.estimated_row_height_px)
    }

    pub fn row_count(&self) -> usize {
        self.heights.len()
    }

    pub fn is_at_bottom(&self) -> bool {
        self.is_at_bottom
    }

    pub fn has_pending_new_message(&self) -> bool {
        self.pending_new_message
    }

    /// Record a scroll event. Returns `true` if the viewport is now at the
    /// bottom, in which case the indicator has been cleared.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        let at_bottom = metrics.is_at_bottom(self.threshold);
        if at_bottom != self.is_at_bottom {
            trace!(at_bottom, ?metrics, "Bottom anchoring changed");
        }
        self.is_at_bottom = at_bottom;
        if at_bottom {
            self.pending_new_message = false;
        }
        at_bottom
    }

    /// React to the timeline changing from `row_count()` rows to `new_len`.
    pub fn on_rows_changed(&mut self, new_len: usize) -> ScrollDecision {
        let old_len = self.heights.len();
        if new_len == old_len {
            return ScrollDecision::Unchanged;
        }

        if new_len < old_len {
            debug!(old_len, new_len, "Timeline shrank, dropping height cache");
            self.heights.clear();
            self.heights.resize(new_len, None);
            self.pending_new_message = false;
            self.scroll_target = None;
            if new_len == 0 {
                self.is_at_bottom = true;
            }
            return ScrollDecision::Remeasure;
        }

        // Rows [old_len, new_len) start unmeasured.
        self.heights.resize(new_len, None);

        if self.is_at_bottom {
            let last = new_len - 1;
            self.pending_new_message = false;
            self.scroll_target = Some(last);
            ScrollDecision::ScrollTo(last)
        } else {
            self.pending_new_message = true;
            ScrollDecision::ShowIndicator
        }
    }

    /// Hide the indicator without moving. Returns whether it was shown.
    pub fn dismiss_indicator(&mut self) -> bool {
        std::mem::take(&mut self.pending_new_message)
    }

    /// Scroll to the newest row regardless of the current position.
    pub fn jump_to_latest(&mut self) -> Option<usize> {
        self.pending_new_message = false;
        self.is_at_bottom = true;
        let last = self.heights.len().checked_sub(1)?;
        self.scroll_target = Some(last);
        Some(last)
    }

    /// The row the view was last asked to scroll to, consumed once read.
    pub fn take_scroll_target(&mut self) -> Option<usize> {
        self.scroll_target.take()
    }

    /// Forget measured heights from `index` on, for non-append mutations.
    pub fn invalidate_from(&mut self, index: usize) {
        if let Some(tail) = self.heights.get_mut(index..) {
            tail.iter_mut().for_each(|h| *h = None);
        }
    }

    /// Store a measured height. Ignored for rows that do not exist.
    pub fn record_height(&mut self, index: usize, height: f64) -> bool {
        match self.heights.get_mut(index) {
            Some(slot) if height.is_finite() && height >= 0.0 => {
                *slot = Some(height);
                true
            }
            _ => false,
        }
    }

    pub fn measured_height(&self, index: usize) -> Option<f64> {
        self.heights.get(index).copied().flatten()
    }

    /// Measured height, or the estimate for unmeasured rows.
    pub fn row_height(&self, index: usize) -> f64 {
        self.measured_height(index)
            .unwrap_or(self.estimated_row_height)
    }

    pub fn unmeasured_count(&self) -> usize {
        self.heights.iter().filter(|h| h.is_none()).count()
    }

    /// Top offset of `index` within the full list.
    pub fn row_offset(&self, index: usize) -> f64 {
        (0..index.min(self.heights.len()))
            .map(|i| self.row_height(i))
            .sum()
    }

    pub fn content_height(&self) -> f64 {
        self.row_offset(self.heights.len())
    }

    /// Rows intersecting `[scroll_top, scroll_top + viewport_height)`,
    /// widened by `overscan` rows on each side.
    pub fn visible_range(&self, scroll_top: f64, viewport_height: f64, overscan: usize) -> Range<usize> {
        let len = self.heights.len();
        if len == 0 {
            return 0..0;
        }
        let top = scroll_top.max(0.0);
        let bottom = top + viewport_height.max(0.0);

        let mut start = len;
        let mut end = len;
        let mut offset = 0.0;
        for i in 0..len {
            let next = offset + self.row_height(i);
            if start == len && next > top {
                start = i;
            }
            if offset >= bottom {
                end = i;
                break;
            }
            offset = next;
        }
        if start == len {
            // Scrolled past the end; show the last row.
            start = len - 1;
        }
        start.saturating_sub(overscan)..(end + overscan).min(len).max(start + 1)
    }
}

impl Default for TimelineViewport {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(scroll_top: f64, viewport_height: f64, scroll_height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            viewport_height,
            scroll_height,
        }
    }

    #[test]
    fn test_bottom_threshold() {
        assert!(metrics(480.0, 500.0, 1000.0).is_at_bottom(20.0));
        assert!(!metrics(479.0, 500.0, 1000.0).is_at_bottom(20.0));
        assert!(metrics(0.0, 500.0, 100.0).is_at_bottom(20.0));
    }

    #[test]
    fn test_follows_tail_when_at_bottom() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        assert_eq!(view.on_rows_changed(1), ScrollDecision::ScrollTo(0));
        assert_eq!(view.on_rows_changed(4), ScrollDecision::ScrollTo(3));
        assert!(view.is_at_bottom());
        assert!(!view.has_pending_new_message());
        assert_eq!(view.take_scroll_target(), Some(3));
        assert_eq!(view.take_scroll_target(), None);
    }

    #[test]
    fn test_indicator_when_scrolled_up() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(20);
        assert_eq!(view.take_scroll_target(), Some(19));
        assert!(!view.on_scroll(metrics(0.0, 300.0, 1000.0)));

        assert_eq!(view.on_rows_changed(21), ScrollDecision::ShowIndicator);
        assert!(view.has_pending_new_message());
        assert_eq!(view.take_scroll_target(), None);

        assert!(view.on_scroll(metrics(760.0, 300.0, 1050.0)));
        assert!(!view.has_pending_new_message());
    }

    #[test]
    fn test_dismiss_indicator_keeps_position() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(5);
        view.on_scroll(metrics(0.0, 100.0, 250.0));
        view.on_rows_changed(6);
        assert!(view.dismiss_indicator());
        assert!(!view.dismiss_indicator());
        assert!(!view.is_at_bottom());
    }

    #[test]
    fn test_bursts_keep_bottom_anchor() {
        let mut view = TimelineViewport::default();
        for n in 1..=100 {
            view.on_rows_changed(n);
        }
        assert!(view.is_at_bottom());
        assert!(!view.has_pending_new_message());
    }

    #[test]
    fn test_appends_keep_measured_heights() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(2);
        view.record_height(0, 30.0);
        view.record_height(1, 70.0);
        view.on_rows_changed(3);
        assert_eq!(view.measured_height(0), Some(30.0));
        assert_eq!(view.measured_height(1), Some(70.0));
        assert_eq!(view.measured_height(2), None);
        assert_eq!(view.content_height(), 150.0);
        assert_eq!(view.unmeasured_count(), 1);
    }

    #[test]
    fn test_shrink_drops_cache() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(3);
        view.record_height(0, 10.0);
        assert_eq!(view.on_rows_changed(2), ScrollDecision::Remeasure);
        assert_eq!(view.unmeasured_count(), 2);
        assert_eq!(view.on_rows_changed(0), ScrollDecision::Remeasure);
        assert!(view.is_at_bottom());
    }

    #[test]
    fn test_invalidate_from() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(3);
        for i in 0..3 {
            view.record_height(i, 10.0);
        }
        view.invalidate_from(1);
        assert_eq!(view.measured_height(0), Some(10.0));
        assert_eq!(view.measured_height(1), None);
        assert_eq!(view.measured_height(2), None);
        view.invalidate_from(10);
        assert_eq!(view.measured_height(0), Some(10.0));
    }

    #[test]
    fn test_record_height_out_of_range() {
        let mut view = TimelineViewport::default();
        assert!(!view.record_height(0, 10.0));
        view.on_rows_changed(1);
        assert!(!view.record_height(0, f64::NAN));
        assert!(view.record_height(0, 10.0));
    }

    #[test]
    fn test_jump_to_latest_overrides_position() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(10);
        view.on_scroll(metrics(0.0, 100.0, 500.0));
        view.on_rows_changed(11);
        assert!(view.has_pending_new_message());

        assert_eq!(view.jump_to_latest(), Some(10));
        assert!(!view.has_pending_new_message());
        assert!(view.is_at_bottom());

        let mut empty = TimelineViewport::default();
        assert_eq!(empty.jump_to_latest(), None);
    }

    #[test]
    fn test_visible_range() {
        let mut view = TimelineViewport::new(20.0, 50.0);
        view.on_rows_changed(10);
        // Rows are 50px: viewport [120, 220) covers rows 2..=4.
        assert_eq!(view.visible_range(120.0, 100.0, 0), 2..5);
        assert_eq!(view.visible_range(120.0, 100.0, 1), 1..6);
        assert_eq!(view.visible_range(0.0, 10_000.0, 0), 0..10);
        assert_eq!(view.visible_range(9_999.0, 100.0, 0), 9..10);

        view.record_height(0, 200.0);
        assert_eq!(view.visible_range(0.0, 100.0, 0), 0..1);
        assert_eq!(view.row_offset(2), 250.0);
    }
}
