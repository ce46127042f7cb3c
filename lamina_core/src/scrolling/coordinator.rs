// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use hashbrown::HashMap;
use kurbo::{Rect, Size, Vec2};
use tracing::{debug, info_span, trace};

use crate::app::{CompositorProxy, Frame, FrameTree, PageOptions, PositionConstraint};
use crate::core::{
    BoxId, FrameId, LayerHandle, LayerId, LayerScrollableArea, LayerTree, Position, Region,
    ResizerHitTest, ScrollType,
};
use crate::scrolling::touch_rects::{GraphicsLayerHitTestRects, content_offset};
use crate::scrolling::{
    EventHandlerRegistry, LayerHitTestRects, MainThreadScrollingReasons,
    compute_touch_event_target_rects, project_rects_to_graphics_layers,
};

/// What was last pushed for a scroll layer.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ScrollLayerProperties {
    clip: Option<LayerHandle>,
    contents_size: Size,
    visible_size: Size,
    user_scrollable: (bool, bool),
}

/// Keeps the compositor's scrolling state in sync with the frames of a page.
///
/// Changes are collected as dirty flags by the `notify_*` methods, and pushed once per
/// lifecycle update by [`update_after_compositing_change_if_needed`], after compositing
/// assignment. Only what changed since the last push is sent to the compositor.
///
/// [`update_after_compositing_change_if_needed`]: Self::update_after_compositing_change_if_needed
#[derive(Debug)]
pub struct ScrollingCoordinator {
    scroll_gesture_region_is_dirty: bool,
    touch_event_target_rects_are_dirty: bool,
    should_scroll_on_main_thread_dirty: bool,
    was_frame_scrollable: bool,

    visual_viewport_layer: Option<LayerHandle>,

    scroll_layers: HashMap<LayerHandle, ScrollLayerProperties>,
    position_constraints: HashMap<LayerHandle, Option<PositionConstraint>>,
    non_fast_scrollable_region: Region,
    non_fast_scrollable_region_layer: Option<LayerHandle>,
    touch_event_target_rects: LayerHitTestRects,
    touch_event_handler_regions: GraphicsLayerHitTestRects,
}

impl ScrollingCoordinator {
    /// A coordinator with everything dirty.
    ///
    /// The visual viewport layer is created here if the options ask for one.
    pub(crate) fn new(compositor: &mut CompositorProxy, options: &PageOptions) -> Self {
        Self {
            scroll_gesture_region_is_dirty: true,
            touch_event_target_rects_are_dirty: true,
            should_scroll_on_main_thread_dirty: true,
            was_frame_scrollable: false,
            visual_viewport_layer: options
                .visual_viewport_layer
                .then(|| compositor.create_layer()),
            scroll_layers: HashMap::new(),
            position_constraints: HashMap::new(),
            non_fast_scrollable_region: Region::new(),
            non_fast_scrollable_region_layer: None,
            touch_event_target_rects: LayerHitTestRects::default(),
            touch_event_handler_regions: GraphicsLayerHitTestRects::new(),
        }
    }

    /// The scroll layer of the visual viewport, if the page has a separate one.
    pub fn visual_viewport_layer(&self) -> Option<LayerHandle> {
        self.visual_viewport_layer
    }

    /// The region last pushed as non-fast-scrollable, in main frame document coordinates.
    pub fn non_fast_scrollable_region(&self) -> &Region {
        &self.non_fast_scrollable_region
    }

    /// The touch event target rects computed by the last update.
    pub fn touch_event_target_rects(&self) -> &LayerHitTestRects {
        &self.touch_event_target_rects
    }

    /// The touch event handler region last pushed for a compositor layer.
    pub fn touch_event_handler_region(&self, layer: LayerHandle) -> Option<&[Rect]> {
        self.touch_event_handler_regions
            .get(&layer)
            .map(Vec::as_slice)
    }

    /// Whether the next update has anything to recompute.
    pub fn needs_update(&self) -> bool {
        self.scroll_gesture_region_is_dirty
            || self.touch_event_target_rects_are_dirty
            || self.should_scroll_on_main_thread_dirty
    }
}

// --- MARK: NOTIFICATIONS
impl ScrollingCoordinator {
    /// Layout moved or resized something.
    pub(crate) fn notify_geometry_changed(&mut self) {
        self.scroll_gesture_region_is_dirty = true;
        self.touch_event_target_rects_are_dirty = true;
        self.should_scroll_on_main_thread_dirty = true;
    }

    /// A transform changed, which moves touch rects but nothing else.
    pub(crate) fn notify_transform_changed(&mut self) {
        self.touch_event_target_rects_are_dirty = true;
    }

    /// Overflow changed, so scrollers may have appeared or disappeared.
    pub(crate) fn notify_overflow_updated(&mut self) {
        self.scroll_gesture_region_is_dirty = true;
    }

    /// Fixed-position or fixed-background content of a frame changed.
    pub(crate) fn frame_view_fixed_objects_did_change(&mut self) {
        self.should_scroll_on_main_thread_dirty = true;
    }

    /// Touch listeners were added or removed.
    pub(crate) fn touch_event_target_rects_did_change(&mut self) {
        self.touch_event_target_rects_are_dirty = true;
    }

    /// Scrollable areas were created or destroyed.
    pub(crate) fn scrollable_areas_did_change(&mut self) {
        self.scroll_gesture_region_is_dirty = true;
        self.should_scroll_on_main_thread_dirty = true;
    }

    /// A frame started or stopped being throttled.
    pub(crate) fn frame_view_throttling_did_change(&mut self) {
        self.scroll_gesture_region_is_dirty = true;
        self.touch_event_target_rects_are_dirty = true;
    }

    /// Forgets what was pushed for compositor layers that are about to be destroyed.
    pub(crate) fn will_destroy_layers(&mut self, layers: impl IntoIterator<Item = LayerHandle>) {
        for layer in layers {
            self.scroll_layers.remove(&layer);
            self.position_constraints.remove(&layer);
            self.touch_event_handler_regions.remove(&layer);
            if self.non_fast_scrollable_region_layer == Some(layer) {
                self.non_fast_scrollable_region_layer = None;
            }
        }
    }
}

// --- MARK: UPDATE
impl ScrollingCoordinator {
    /// Pushes everything that changed to the compositor.
    ///
    /// Must run after compositing assignment, since scroll layers and composited
    /// scrolling are decided there.
    pub(crate) fn update_after_compositing_change_if_needed(
        &mut self,
        frames: &mut FrameTree,
        compositor: &mut CompositorProxy,
        registry: &EventHandlerRegistry,
        options: &PageOptions,
        now: Duration,
        trace: bool,
    ) {
        let _span = info_span!("scrolling_coordinator").entered();
        if self.update_scroll_layers(frames, compositor, trace) {
            self.should_scroll_on_main_thread_dirty = true;
        }
        self.update_position_constraints(frames, compositor);

        let main = frames.main_frame();
        let frame_is_scrollable = frames
            .frame(main)
            .root_scrollable_area()
            .is_some_and(LayerScrollableArea::scrolls_overflow);
        if frame_is_scrollable != self.was_frame_scrollable {
            self.was_frame_scrollable = frame_is_scrollable;
            self.should_scroll_on_main_thread_dirty = true;
        }

        if self.scroll_gesture_region_is_dirty {
            let region = self.compute_should_handle_scroll_gesture_on_main_thread_region(
                frames,
                main,
                Vec2::ZERO,
            );
            let layer = frames
                .frame(main)
                .root_scrollable_area()
                .and_then(LayerScrollableArea::layer_for_scrolling);
            if let Some(layer) = layer {
                if self.non_fast_scrollable_region_layer != Some(layer)
                    || self.non_fast_scrollable_region != region
                {
                    compositor.set_non_fast_scrollable_region(layer, region.rects().to_vec());
                }
            }
            self.non_fast_scrollable_region = region;
            self.non_fast_scrollable_region_layer = layer;
            self.scroll_gesture_region_is_dirty = false;
        }

        if self.touch_event_target_rects_are_dirty {
            let rects = compute_touch_event_target_rects(frames, registry, trace);
            let projected =
                project_rects_to_graphics_layers(frames, &rects, options.touch_rects_cross_frames);
            self.set_touch_event_handler_regions(compositor, projected);
            self.touch_event_target_rects = rects;
            self.touch_event_target_rects_are_dirty = false;
        }

        if self.should_scroll_on_main_thread_dirty {
            self.update_main_thread_scrolling_reasons(frames, compositor, options, now);
            self.should_scroll_on_main_thread_dirty = false;
        }

        self.scroll_layers.retain(|layer, _| compositor.is_live(*layer));
        self.position_constraints
            .retain(|layer, _| compositor.is_live(*layer));
        self.touch_event_handler_regions
            .retain(|layer, _| compositor.is_live(*layer));
    }

    /// Pushes bounds, clip layers and offsets of every scroll layer.
    ///
    /// Returns `true` if a scroll layer appeared.
    fn update_scroll_layers(
        &mut self,
        frames: &mut FrameTree,
        compositor: &mut CompositorProxy,
        trace: bool,
    ) -> bool {
        let mut new_scroll_layers = false;
        for frame_id in frames.ids() {
            let frame = frames.frame_mut(frame_id);
            for id in frame.layers.ids() {
                let layer = frame.layers.layer_mut(id);
                let clip = layer.mapping.and_then(|mapping| mapping.scroll_clip);
                let Some(area) = layer.scrollable_area_mut() else {
                    continue;
                };
                let pending_scroll = area.take_pending_scroll();
                let Some(scroll_layer) = area.layer_for_scrolling() else {
                    continue;
                };
                let properties = ScrollLayerProperties {
                    clip,
                    contents_size: area.contents_size(),
                    visible_size: area.visible_size(),
                    user_scrollable: area.user_input_scrollable(),
                };
                let previous = self.scroll_layers.insert(scroll_layer, properties);
                if previous != Some(properties) {
                    scroll_layer_did_change(compositor, scroll_layer, properties, previous);
                }
                let is_new = previous.is_none();
                new_scroll_layers |= is_new;

                // Compositor scrolls are already known on the other side.
                let needs_offset = match pending_scroll {
                    Some(scroll_type) => scroll_type != ScrollType::Compositor,
                    None => is_new && area.scroll_offset() != Vec2::ZERO,
                };
                if needs_offset {
                    if trace {
                        trace!(
                            layer = %scroll_layer,
                            offset = ?area.scroll_offset(),
                            "Pushing scroll offset"
                        );
                    }
                    compositor.update_scroll_offset(scroll_layer, area.scroll_offset());
                }
            }
        }
        new_scroll_layers
    }

    fn update_position_constraints(
        &mut self,
        frames: &FrameTree,
        compositor: &mut CompositorProxy,
    ) {
        for frame_id in frames.ids() {
            let layers = &frames.frame(frame_id).layers;
            for layer in layers.iter() {
                let Some(mapping) = layer.mapping else {
                    continue;
                };
                let constraint = compute_position_constraint(layers, layer.id());
                let previous = self
                    .position_constraints
                    .insert(mapping.main, constraint)
                    .flatten();
                if previous != constraint {
                    compositor.set_position_constraint(mapping.main, constraint);
                }
            }
        }
    }

    fn set_touch_event_handler_regions(
        &mut self,
        compositor: &mut CompositorProxy,
        mut regions: GraphicsLayerHitTestRects,
    ) {
        regions.retain(|layer, _| compositor.is_live(*layer));
        // Layers that had a region but no longer do are cleared.
        for layer in self.touch_event_handler_regions.keys() {
            if !regions.contains_key(layer) && compositor.is_live(*layer) {
                regions.insert(*layer, Vec::new());
            }
        }
        let mut layers: Vec<LayerHandle> = regions.keys().copied().collect();
        layers.sort();
        for layer in layers {
            let rects = &regions[&layer];
            let previous = self
                .touch_event_handler_regions
                .get(&layer)
                .map_or(&[][..], Vec::as_slice);
            if previous != rects.as_slice() {
                compositor.set_touch_event_handler_region(layer, rects.clone());
            }
        }
        regions.retain(|_, rects| !rects.is_empty());
        self.touch_event_handler_regions = regions;
    }

    fn update_main_thread_scrolling_reasons(
        &mut self,
        frames: &mut FrameTree,
        compositor: &mut CompositorProxy,
        options: &PageOptions,
        now: Duration,
    ) {
        let main = frames.main_frame();
        let mut updates: Vec<(FrameId, LayerId, MainThreadScrollingReasons)> = Vec::new();
        for frame_id in frames.ids() {
            let frame = frames.frame(frame_id);
            let frame_reasons = Self::main_thread_scrolling_reasons(frames, frame_id, options);
            for layer in frame.layers.iter() {
                let Some(area) = layer.scrollable_area() else {
                    continue;
                };
                if area.layer_for_scrolling().is_none() {
                    continue;
                }
                let reasons = if layer.is_root() {
                    frame_reasons
                } else if layer.style().custom_scrollbar {
                    MainThreadScrollingReasons::CUSTOM_SCROLLBAR_SCROLLING
                } else {
                    MainThreadScrollingReasons::empty()
                };
                updates.push((frame_id, layer.id(), reasons));
            }
        }

        for (frame_id, layer_id, reasons) in updates {
            let visual_viewport = (frame_id == main)
                .then_some(self.visual_viewport_layer)
                .flatten()
                .filter(|_| frames.frame(frame_id).layers.root() == layer_id);
            let Some(area) = frames
                .frame_mut(frame_id)
                .layers
                .layer_mut(layer_id)
                .scrollable_area_mut()
            else {
                continue;
            };
            self.set_should_update_scroll_layer_position_on_main_thread(
                compositor,
                area,
                visual_viewport,
                reasons,
                now,
            );
        }
    }

    /// Sets the reasons for a scroll layer, and the visual viewport layer if given, to
    /// scroll on the main thread.
    ///
    /// Reasons that no longer apply are cleared, except the one owned by main-thread
    /// animations. Compositor animations of the area continue on the main thread once
    /// any reason is set.
    pub(crate) fn set_should_update_scroll_layer_position_on_main_thread(
        &self,
        compositor: &mut CompositorProxy,
        area: &mut LayerScrollableArea,
        visual_viewport: Option<LayerHandle>,
        reasons: MainThreadScrollingReasons,
        now: Duration,
    ) {
        let reasons = reasons.non_transient();
        if !reasons.is_empty() {
            area.with_animator(compositor, now, |animator, ctx| {
                animator.take_over_compositor_animation(ctx);
            });
        }
        let layers = area.layer_for_scrolling().into_iter().chain(visual_viewport);
        for layer in layers {
            let current = compositor.main_thread_scrolling_reasons(layer).non_transient();
            if current == reasons {
                continue;
            }
            debug!(
                %layer,
                reasons = reasons.as_text(),
                "Main-thread scrolling reasons changed"
            );
            apply_main_thread_scrolling_reasons(compositor, layer, reasons);
        }
    }

    /// Why the root scroller of `frame` must scroll on the main thread.
    pub fn main_thread_scrolling_reasons(
        frames: &FrameTree,
        frame: FrameId,
        options: &PageOptions,
    ) -> MainThreadScrollingReasons {
        let mut reasons = MainThreadScrollingReasons::empty();
        if !options.threaded_scrolling_enabled {
            reasons |= MainThreadScrollingReasons::THREADED_SCROLLING_DISABLED;
        }
        let Some(frame) = frames.get(frame) else {
            return reasons;
        };
        if frame.has_background_attachment_fixed_objects() {
            reasons |= MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS;
        }
        if has_visible_slow_repaint_viewport_constrained_objects(frame) {
            reasons |= MainThreadScrollingReasons::HAS_NON_LAYER_VIEWPORT_CONSTRAINED_OBJECTS;
        }
        let root = frame.layers.layer(frame.layers.root());
        if root.style().custom_scrollbar {
            reasons |= MainThreadScrollingReasons::CUSTOM_SCROLLBAR_SCROLLING;
        }
        reasons
    }
}

// --- MARK: GESTURE REGION
impl ScrollingCoordinator {
    /// The region where scroll gestures must be handled on the main thread, in the
    /// document coordinates of `frame` shifted by `origin_offset`.
    ///
    /// Covers scrollers that don't scroll on the compositor, resizers, plugins that
    /// consume wheel events, and child frames that scroll without being composited.
    /// Throttled frames contribute nothing.
    pub fn compute_should_handle_scroll_gesture_on_main_thread_region(
        &self,
        frames: &FrameTree,
        frame: FrameId,
        origin_offset: Vec2,
    ) -> Region {
        let mut region = Region::new();
        accumulate_scroll_gesture_region(frames, frame, origin_offset, &mut region);
        region
    }
}

fn accumulate_scroll_gesture_region(
    frames: &FrameTree,
    frame_id: FrameId,
    origin_offset: Vec2,
    region: &mut Region,
) {
    let Some(frame) = frames.get(frame_id) else {
        return;
    };
    if frame.view().is_throttled() {
        return;
    }
    let layers = &frame.layers;
    for layer in layers.iter() {
        let Some(area) = layer.scrollable_area() else {
            continue;
        };
        if !layer.is_root() && area.scrolls_overflow() && !area.uses_composited_scrolling() {
            region.unite(layers.absolute_bounding_box(layer.id()) + origin_offset);
        }
        if layer.style().has_resizer {
            let corner =
                area.resizer_corner_rect(layer.physical_bounding_box(), ResizerHitTest::Touch);
            let absolute = layers.absolute_transform(layer.id()).transform_rect_bbox(corner);
            region.unite(absolute + origin_offset);
        }
    }
    for plugin in frame.wheel_event_plugins() {
        if let Some(rect) = absolute_box_rect(frame, plugin.id()) {
            region.unite(rect + origin_offset);
        }
    }

    for child_id in frame.children() {
        let Some(child) = frames.get(*child_id) else {
            continue;
        };
        let Some(owner_rect) = child
            .owner_box()
            .and_then(|owner| absolute_box_rect(frame, owner))
        else {
            continue;
        };
        let child_scrolls = child
            .root_scrollable_area()
            .is_some_and(LayerScrollableArea::scrolls_overflow);
        if child_scrolls && !child.is_composited() {
            region.unite(owner_rect + origin_offset);
        }
        let child_offset =
            origin_offset + owner_rect.origin().to_vec2() - child.layers.root_scroll_offset();
        accumulate_scroll_gesture_region(frames, *child_id, child_offset, region);
    }
}

/// The border box of a box, in document coordinates.
fn absolute_box_rect(frame: &Frame, box_id: BoxId) -> Option<Rect> {
    let (layer, offset) = frame.layout.offset_from_enclosing_layer(box_id)?;
    let size = frame.layout.get(box_id)?.size;
    let local = Rect::from_origin_size((offset - content_offset(frame, layer)).to_point(), size);
    Some(frame.layers.absolute_transform(layer).transform_rect_bbox(local))
}

// --- MARK: HELPERS
fn scroll_layer_did_change(
    compositor: &mut CompositorProxy,
    layer: LayerHandle,
    properties: ScrollLayerProperties,
    previous: Option<ScrollLayerProperties>,
) {
    if previous.is_none_or(|previous| previous.contents_size != properties.contents_size) {
        compositor.set_layer_bounds(layer, properties.contents_size);
    }
    if let Some(clip) = properties.clip {
        if previous.is_none_or(|previous| previous.clip != Some(clip)) {
            compositor.set_scroll_clip_layer(layer, clip);
        }
        if previous.is_none_or(|previous| {
            previous.clip != Some(clip) || previous.visible_size != properties.visible_size
        }) {
            compositor.set_layer_bounds(clip, properties.visible_size);
        }
    }
    if previous.is_none_or(|previous| previous.user_scrollable != properties.user_scrollable) {
        let (x, y) = properties.user_scrollable;
        compositor.set_user_scrollable(layer, x, y);
    }
}

/// The viewport anchoring of the compositor layer of `id`.
///
/// Composited descendants of a fixed layer inherit its anchoring, up to the next
/// layer with a backing of its own.
fn compute_position_constraint(layers: &LayerTree, id: LayerId) -> Option<PositionConstraint> {
    let mut current = Some(id);
    while let Some(layer_id) = current {
        let style = layers.layer(layer_id).style();
        if style.position == Position::Fixed {
            return Some(PositionConstraint {
                fixed_to_right: style.offsets.right.is_some(),
                fixed_to_bottom: style.offsets.bottom.is_some(),
            });
        }
        current = layers
            .parent(layer_id)
            .filter(|parent| layers.layer(*parent).mapping.is_none());
    }
    None
}

/// Whether a fixed or sticky layer moves with the viewport without a backing of its own,
/// which means it must be repainted on every scroll.
fn has_visible_slow_repaint_viewport_constrained_objects(frame: &Frame) -> bool {
    let layers = &frame.layers;
    frame.view().viewport_constrained_layers().any(|id| {
        let Some(layer) = layers.get(id) else {
            return false;
        };
        let scrolls_with_viewport = match layer.style().position {
            Position::Fixed => {
                layers.parent_layer_on_containing_block_chain(id) == Some(layers.root())
            }
            Position::Sticky => layer.ancestor_overflow_layer() == Some(layers.root()),
            _ => false,
        };
        scrolls_with_viewport
            && !layers.subtree_is_invisible(id)
            && !layer.compositing_state.is_composited()
    })
}

/// Makes `reasons` the non-transient reasons of `layer`.
fn apply_main_thread_scrolling_reasons(
    compositor: &mut CompositorProxy,
    layer: LayerHandle,
    reasons: MainThreadScrollingReasons,
) {
    let reasons = reasons.non_transient();
    let stale = compositor
        .main_thread_scrolling_reasons(layer)
        .non_transient()
        .difference(reasons);
    if !stale.is_empty() {
        compositor.clear_main_thread_scrolling_reasons(layer, stale);
    }
    if !reasons.is_empty() {
        compositor.add_main_thread_scrolling_reasons(layer, reasons);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_reasons_keeps_the_animation_reason() {
        let mut compositor = CompositorProxy::new(|_| {});
        let layer = compositor.create_layer();
        compositor.add_main_thread_scrolling_reasons(
            layer,
            MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD
                | MainThreadScrollingReasons::PAGE_OVERLAY,
        );

        apply_main_thread_scrolling_reasons(
            &mut compositor,
            layer,
            MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS,
        );
        assert_eq!(
            compositor.main_thread_scrolling_reasons(layer),
            MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD
                | MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS
        );

        apply_main_thread_scrolling_reasons(
            &mut compositor,
            layer,
            MainThreadScrollingReasons::empty(),
        );
        assert_eq!(
            compositor.main_thread_scrolling_reasons(layer),
            MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD,
            "only main-thread animations clear their own reason"
        );
    }

    #[test]
    fn toggling_reasons_leaves_the_other_set() {
        let mut compositor = CompositorProxy::new(|_| {});
        let layer = compositor.create_layer();
        let x = MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS;
        let y = MainThreadScrollingReasons::CUSTOM_SCROLLBAR_SCROLLING;
        apply_main_thread_scrolling_reasons(&mut compositor, layer, x);
        apply_main_thread_scrolling_reasons(&mut compositor, layer, x | y);
        apply_main_thread_scrolling_reasons(&mut compositor, layer, y);
        assert_eq!(compositor.main_thread_scrolling_reasons(layer), y);
    }
}
