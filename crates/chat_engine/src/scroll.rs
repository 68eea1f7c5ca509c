use tracing::debug;

use crate::reconciler::MergeOutcome;

/// Geometry reported by the rendering layer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> f64 {
        (self.content_height - self.scroll_top - self.viewport_height).max(0.0)
    }

    pub fn bottom_offset(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollAction {
    None,
    ToBottom,
    SetOffset(f64),
}

impl ScrollAction {
    /// Resolves the action to a concrete scroll offset for a given content height.
    pub fn resolve(self, current: Viewport, new_content_height: f64) -> f64 {
        match self {
            ScrollAction::None => current.scroll_top,
            ScrollAction::ToBottom => Viewport {
                content_height: new_content_height,
                ..current
            }
            .bottom_offset(),
            ScrollAction::SetOffset(offset) => offset,
        }
    }
}

#[derive(Debug)]
pub struct ScrollCoordinator {
    follow_threshold_px: f64,
    sentinel_threshold_px: f64,
    initial_scroll_armed: bool,
}

impl ScrollCoordinator {
    pub fn new(follow_threshold_px: f64, sentinel_threshold_px: f64) -> Self {
        Self {
            follow_threshold_px,
            sentinel_threshold_px,
            initial_scroll_armed: true,
        }
    }

    /// While armed, backward pagination must not trigger.
    pub fn in_initial_phase(&self) -> bool {
        self.initial_scroll_armed
    }

    pub fn sentinel_visible(&self, viewport: Viewport) -> bool {
        viewport.scroll_top <= self.sentinel_threshold_px
    }

    pub fn rearm(&mut self) {
        self.initial_scroll_armed = true;
    }

    /// Decides how the view reacts to one store mutation. `before` is the
    /// viewport as it was rendered prior to the merge and `new_content_height`
    /// the height once the merged sequence is laid out.
    pub fn on_store_changed(
        &mut self,
        outcome: &MergeOutcome,
        store_len: usize,
        loading_complete: bool,
        before: Viewport,
        new_content_height: f64,
    ) -> ScrollAction {
        if self.initial_scroll_armed {
            if loading_complete && store_len > 0 {
                self.initial_scroll_armed = false;
                debug!(store_len, "scroll: initial population, jumping to newest");
                return ScrollAction::ToBottom;
            }
            return ScrollAction::None;
        }

        if outcome.appended > 0 && before.distance_from_bottom() <= self.follow_threshold_px {
            return ScrollAction::ToBottom;
        }

        if outcome.prepended > 0 {
            let grown = new_content_height - before.content_height;
            return ScrollAction::SetOffset(before.scroll_top + grown.max(0.0));
        }

        ScrollAction::None
    }
}

#[cfg(test)]
#[path = "tests/scroll_tests.rs"]
mod tests;
