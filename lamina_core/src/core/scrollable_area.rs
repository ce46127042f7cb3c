// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use hashbrown::HashMap;
use kurbo::{Point, Rect, Size, Vec2};

use crate::app::CompositorProxy;
use crate::core::{BoxOffsets, LayerHandle, LayerId};
use crate::scrolling::{AnimatorCtx, ScrollAnimator};

/// Pixels scrolled by one line step.
const PIXELS_PER_LINE_STEP: f64 = 40.0;
/// Fraction of the visible size scrolled by one page step.
const MIN_FRACTION_TO_STEP_WHEN_PAGING: f64 = 0.875;
/// Size of the resize handle at the bottom right corner of a resizable box.
const RESIZER_CORNER_SIZE: f64 = 15.0;
/// Touch input gets a larger resize handle.
const RESIZER_TOUCH_EXPAND_RATIO: f64 = 2.0;

/// The unit of a user scroll delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScrollGranularity {
    /// Lines, e.g. from arrow keys.
    Line,
    /// Pages, e.g. from the page down key.
    Page,
    /// The whole document, e.g. from the end key.
    Document,
    /// Pixels from a device with coarse steps, like a mouse wheel.
    #[default]
    Pixel,
    /// Pixels from a precise device, like a trackpad. These are never animated.
    PrecisePixel,
}

/// Who asked for a scroll offset change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScrollType {
    /// User input.
    User,
    /// Script or another API.
    Programmatic,
    /// The compositor scrolled, and the main thread catches up.
    Compositor,
    /// Scroll anchoring compensating a layout shift.
    Anchoring,
}

/// The outcome of a user scroll.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollResult {
    /// Whether the horizontal offset changed or will change.
    pub did_scroll_x: bool,
    /// Whether the vertical offset changed or will change.
    pub did_scroll_y: bool,
    /// The part of the delta that wasn't consumed, so it can bubble to an ancestor scroller.
    pub unused_scroll_delta: Vec2,
}

impl ScrollResult {
    /// Whether either axis scrolled.
    pub fn did_scroll(&self) -> bool {
        self.did_scroll_x || self.did_scroll_y
    }
}

/// The interface a scroll animator drives.
pub trait ScrollableArea {
    /// The current scroll offset.
    fn scroll_offset(&self) -> Vec2;

    /// The smallest valid scroll offset.
    fn minimum_scroll_offset(&self) -> Vec2 {
        Vec2::ZERO
    }

    /// The largest valid scroll offset.
    fn maximum_scroll_offset(&self) -> Vec2;

    /// Clamps an offset to the valid range.
    fn clamp_scroll_offset(&self, offset: Vec2) -> Vec2 {
        let min = self.minimum_scroll_offset();
        let max = self.maximum_scroll_offset();
        Vec2::new(offset.x.clamp(min.x, max.x), offset.y.clamp(min.y, max.y))
    }

    /// Whether user input may scroll horizontally.
    fn user_input_scrollable_x(&self) -> bool;

    /// Whether user input may scroll vertically.
    fn user_input_scrollable_y(&self) -> bool;

    /// Moves to a new offset, which is clamped.
    fn set_scroll_offset(&mut self, offset: Vec2, scroll_type: ScrollType);

    /// Whether user scrolls are animated.
    fn scroll_animator_enabled(&self) -> bool;

    /// Asks for the animator to be serviced on the next animation frame and lifecycle update.
    fn register_for_animation(&mut self);

    /// Asks the host for another animation frame.
    ///
    /// Returns `false` if there is no host able to drive animations.
    fn schedule_animation(&mut self) -> bool;

    /// The compositor layer that moves when this area scrolls, if it's composited.
    fn layer_for_scrolling(&self) -> Option<LayerHandle>;
}

/// Scroll offset and extent of a scrollable area.
#[derive(Clone, Debug)]
pub struct ScrollState {
    offset: Vec2,
    pub(crate) visible_size: Size,
    pub(crate) contents_size: Size,
    pub(crate) user_scrollable_x: bool,
    pub(crate) user_scrollable_y: bool,
    pub(crate) scroll_animator_enabled: bool,
    pub(crate) can_schedule_animation: bool,
    pub(crate) registered_for_animation: bool,
    pub(crate) animation_scheduled: bool,
    /// Set when the offset changed, until the page has propagated the change.
    pub(crate) pending_scroll: Option<ScrollType>,
    pub(crate) scroll_layer: Option<LayerHandle>,
}

impl ScrollState {
    pub(crate) fn new(visible_size: Size, contents_size: Size) -> Self {
        Self {
            offset: Vec2::ZERO,
            visible_size,
            contents_size,
            user_scrollable_x: true,
            user_scrollable_y: true,
            scroll_animator_enabled: true,
            can_schedule_animation: true,
            registered_for_animation: false,
            animation_scheduled: false,
            pending_scroll: None,
            scroll_layer: None,
        }
    }

    /// The distance one step of `granularity` scrolls, per axis.
    pub fn scroll_step(&self, granularity: ScrollGranularity) -> Vec2 {
        match granularity {
            ScrollGranularity::Line => Vec2::new(PIXELS_PER_LINE_STEP, PIXELS_PER_LINE_STEP),
            ScrollGranularity::Page => Vec2::new(
                (self.visible_size.width * MIN_FRACTION_TO_STEP_WHEN_PAGING).max(1.0),
                (self.visible_size.height * MIN_FRACTION_TO_STEP_WHEN_PAGING).max(1.0),
            ),
            ScrollGranularity::Document => self.contents_size.to_vec2(),
            ScrollGranularity::Pixel | ScrollGranularity::PrecisePixel => Vec2::new(1.0, 1.0),
        }
    }
}

impl ScrollableArea for ScrollState {
    fn scroll_offset(&self) -> Vec2 {
        self.offset
    }

    fn maximum_scroll_offset(&self) -> Vec2 {
        Vec2::new(
            (self.contents_size.width - self.visible_size.width).max(0.0),
            (self.contents_size.height - self.visible_size.height).max(0.0),
        )
    }

    fn user_input_scrollable_x(&self) -> bool {
        self.user_scrollable_x
    }

    fn user_input_scrollable_y(&self) -> bool {
        self.user_scrollable_y
    }

    fn set_scroll_offset(&mut self, offset: Vec2, scroll_type: ScrollType) {
        let offset = self.clamp_scroll_offset(offset);
        if offset == self.offset {
            return;
        }
        self.offset = offset;
        // A compositor scroll only needs to reach the main thread, anything else
        // must also reach the compositor.
        self.pending_scroll = match self.pending_scroll {
            None | Some(ScrollType::Compositor) => Some(scroll_type),
            pending => pending,
        };
    }

    fn scroll_animator_enabled(&self) -> bool {
        self.scroll_animator_enabled
    }

    fn register_for_animation(&mut self) {
        self.registered_for_animation = true;
    }

    fn schedule_animation(&mut self) -> bool {
        if !self.can_schedule_animation {
            return false;
        }
        self.animation_scheduled = true;
        true
    }

    fn layer_for_scrolling(&self) -> Option<LayerHandle> {
        self.scroll_layer
    }
}

/// Which resize handle is being hit tested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizerHitTest {
    /// Mouse and pen input.
    Pointer,
    /// Touch input, which gets a larger target.
    Touch,
}

/// What the sticky position of a box is computed from.
///
/// Rects are relative to the content of the scroll container, i.e. they don't
/// move when the container scrolls.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StickyPositionConstraints {
    /// The sticky insets. An edge without an inset isn't sticky.
    pub offsets: BoxOffsets,
    /// The border box of the sticky box, before applying the sticky offset.
    pub scroll_container_relative_sticky_box_rect: Rect,
    /// The containing block of the sticky box, which the box never leaves.
    pub scroll_container_relative_containing_block_rect: Rect,
}

impl StickyPositionConstraints {
    /// The offset of the sticky box when the visible part of the scroll container is
    /// `viewport_rect`.
    pub fn compute_sticky_offset(&self, viewport_rect: Rect) -> Vec2 {
        let sticky = self.scroll_container_relative_sticky_box_rect;
        let containing = self.scroll_container_relative_containing_block_rect;
        let mut box_rect = sticky;

        if let Some(right) = self.offsets.right {
            let right_limit = viewport_rect.x1 - right;
            let available_space = (containing.x0 - sticky.x0).min(0.0);
            let right_delta = (right_limit - sticky.x1).min(0.0).max(available_space);
            box_rect = box_rect + Vec2::new(right_delta, 0.0);
        }
        if let Some(left) = self.offsets.left {
            let left_limit = viewport_rect.x0 + left;
            let available_space = (containing.x1 - sticky.x1).max(0.0);
            let left_delta = (left_limit - sticky.x0).max(0.0).min(available_space);
            box_rect = box_rect + Vec2::new(left_delta, 0.0);
        }
        if let Some(bottom) = self.offsets.bottom {
            let bottom_limit = viewport_rect.y1 - bottom;
            let available_space = (containing.y0 - sticky.y0).min(0.0);
            let bottom_delta = (bottom_limit - sticky.y1).min(0.0).max(available_space);
            box_rect = box_rect + Vec2::new(0.0, bottom_delta);
        }
        if let Some(top) = self.offsets.top {
            let top_limit = viewport_rect.y0 + top;
            let available_space = (containing.y1 - sticky.y1).max(0.0);
            let top_delta = (top_limit - sticky.y0).max(0.0).min(available_space);
            box_rect = box_rect + Vec2::new(0.0, top_delta);
        }
        box_rect.origin() - sticky.origin()
    }
}

/// The scrolling state of a layer that clips its overflow, or of a frame's root layer.
#[derive(Debug)]
pub struct LayerScrollableArea {
    layer: LayerId,
    pub(crate) state: ScrollState,
    pub(crate) animator: Option<ScrollAnimator>,
    /// Constraints of the sticky layers this area is the ancestor overflow layer of.
    pub(crate) sticky_constraints: HashMap<LayerId, StickyPositionConstraints>,
    pub(crate) needs_composited_scrolling: bool,
    pub(crate) uses_composited_scrolling: bool,
}

// --- MARK: GETTERS
impl LayerScrollableArea {
    pub(crate) fn new(layer: LayerId, visible_size: Size, contents_size: Size) -> Self {
        Self {
            layer,
            state: ScrollState::new(visible_size, contents_size),
            animator: None,
            sticky_constraints: HashMap::new(),
            needs_composited_scrolling: false,
            uses_composited_scrolling: false,
        }
    }

    /// The layer owning this area.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// The current scroll offset.
    pub fn scroll_offset(&self) -> Vec2 {
        self.state.scroll_offset()
    }

    /// The largest valid scroll offset.
    pub fn maximum_scroll_offset(&self) -> Vec2 {
        self.state.maximum_scroll_offset()
    }

    /// The size of the scrolling viewport.
    pub fn visible_size(&self) -> Size {
        self.state.visible_size
    }

    /// The size of the scrolled content.
    pub fn contents_size(&self) -> Size {
        self.state.contents_size
    }

    /// The user-scrollable axes, horizontal then vertical.
    pub fn user_input_scrollable(&self) -> (bool, bool) {
        (self.state.user_scrollable_x, self.state.user_scrollable_y)
    }

    /// Whether there is overflow to scroll in an axis the user may scroll.
    pub fn scrolls_overflow(&self) -> bool {
        let max = self.state.maximum_scroll_offset();
        (self.state.user_scrollable_x && max.x > 0.0)
            || (self.state.user_scrollable_y && max.y > 0.0)
    }

    /// Whether this area would like to scroll on the compositor.
    pub fn needs_composited_scrolling(&self) -> bool {
        self.needs_composited_scrolling
    }

    /// Whether this area scrolls on the compositor.
    ///
    /// This is only true once the area's layer has been given its own backing.
    pub fn uses_composited_scrolling(&self) -> bool {
        self.uses_composited_scrolling
    }

    /// The compositor layer that moves when this area scrolls.
    pub fn layer_for_scrolling(&self) -> Option<LayerHandle> {
        self.state.scroll_layer
    }

    /// The scroll animator, if a smooth scroll ever started.
    pub fn scroll_animator(&self) -> Option<&ScrollAnimator> {
        self.animator.as_ref()
    }

    /// The constraints of the sticky layers positioned against this area.
    pub fn sticky_constraints(&self) -> &HashMap<LayerId, StickyPositionConstraints> {
        &self.sticky_constraints
    }

    /// The scrolled content, in the coordinates of the content.
    pub fn overflow_rect(&self) -> Rect {
        Rect::from_origin_size(Point::ORIGIN, self.state.contents_size)
    }

    /// The visible part of the content, in the coordinates of the content.
    pub fn visible_content_rect(&self) -> Rect {
        Rect::from_origin_size(self.scroll_offset().to_point(), self.state.visible_size)
    }

    /// The resize handle at the bottom right corner of `bounds`.
    pub fn resizer_corner_rect(&self, bounds: Rect, hit_test: ResizerHitTest) -> Rect {
        let corner = Rect::new(
            bounds.x1 - RESIZER_CORNER_SIZE,
            bounds.y1 - RESIZER_CORNER_SIZE,
            bounds.x1,
            bounds.y1,
        );
        match hit_test {
            ResizerHitTest::Pointer => corner,
            ResizerHitTest::Touch => {
                // Grow up and to the left, keeping the bottom right corner in place.
                let expand = RESIZER_CORNER_SIZE * (RESIZER_TOUCH_EXPAND_RATIO - 1.0);
                Rect::new(corner.x0 - expand, corner.y0 - expand, corner.x1, corner.y1)
            }
        }
    }

    /// Whether an animation is in flight, on either thread.
    pub fn has_running_animation(&self) -> bool {
        self.animator
            .as_ref()
            .is_some_and(ScrollAnimator::has_running_animation)
    }
}

// --- MARK: SCROLLING
impl LayerScrollableArea {
    /// Scrolls by `delta` steps of `granularity`, animated if enabled.
    pub(crate) fn user_scroll(
        &mut self,
        compositor: &mut CompositorProxy,
        now: Duration,
        granularity: ScrollGranularity,
        delta: Vec2,
    ) -> ScrollResult {
        let step = self.state.scroll_step(granularity);
        let pixel_delta = Vec2::new(delta.x * step.x, delta.y * step.y);
        let scrollable_axis_delta = Vec2::new(
            if self.state.user_scrollable_x { pixel_delta.x } else { 0.0 },
            if self.state.user_scrollable_y { pixel_delta.y } else { 0.0 },
        );
        if scrollable_axis_delta == Vec2::ZERO {
            return ScrollResult {
                unused_scroll_delta: pixel_delta,
                ..ScrollResult::default()
            };
        }

        let Self { state, animator, .. } = self;
        let animator = animator.get_or_insert_with(ScrollAnimator::new);
        let mut result = animator.user_scroll(
            &mut AnimatorCtx::new(state, compositor, now),
            granularity,
            scrollable_axis_delta,
        );
        // Delta along axes the user can't scroll counts as unused.
        result.unused_scroll_delta += pixel_delta - scrollable_axis_delta;
        result
    }

    /// Jumps to `offset`, cancelling any running animation.
    pub(crate) fn set_scroll_offset(
        &mut self,
        compositor: &mut CompositorProxy,
        now: Duration,
        offset: Vec2,
        scroll_type: ScrollType,
    ) {
        let Self { state, animator, .. } = self;
        if let Some(animator) = animator {
            animator.cancel_animation(&mut AnimatorCtx::new(state, compositor, now));
        }
        state.set_scroll_offset(offset, scroll_type);
    }

    /// Applies a scroll the compositor already performed.
    ///
    /// Running animations keep their target, but move along with the adjustment.
    pub(crate) fn apply_compositor_scroll(&mut self, offset: Vec2) {
        self.state.set_scroll_offset(offset, ScrollType::Compositor);
    }

    /// Shifts the offset (and any animation along with it), e.g. for scroll anchoring.
    pub(crate) fn adjust_scroll_offset(
        &mut self,
        compositor: &mut CompositorProxy,
        now: Duration,
        offset: Vec2,
    ) {
        let Self { state, animator, .. } = self;
        match animator {
            Some(animator) => animator.adjust_animation_and_set_scroll_offset(
                &mut AnimatorCtx::new(state, compositor, now),
                offset,
                ScrollType::Anchoring,
            ),
            None => state.set_scroll_offset(offset, ScrollType::Anchoring),
        }
    }

    /// Runs `f` on the animator, if there is one.
    pub(crate) fn with_animator<R>(
        &mut self,
        compositor: &mut CompositorProxy,
        now: Duration,
        f: impl FnOnce(&mut ScrollAnimator, &mut AnimatorCtx<'_>) -> R,
    ) -> Option<R> {
        let Self { state, animator, .. } = self;
        let animator = animator.as_mut()?;
        Some(f(animator, &mut AnimatorCtx::new(state, compositor, now)))
    }

    /// Takes and clears the pending offset change, if any.
    pub(crate) fn take_pending_scroll(&mut self) -> Option<ScrollType> {
        self.state.pending_scroll.take()
    }
}
