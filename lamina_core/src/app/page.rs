// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use kurbo::{Point, Rect, Size, Vec2};
use smallvec::SmallVec;
use tracing::{debug, info_span, trace};

use crate::app::frame::DetachedContent;
use crate::app::{CompositorCommand, CompositorEvent, CompositorProxy, Frame, FrameTree};
use crate::core::{
    AnimationGroupId, BoxId, BoxKind, BoxStyle, CompositingQueryPermit, FrameId, LayerHandle,
    LayerId, LayerScrollableArea, PaintLayer, ScrollGranularity, ScrollResult, ScrollType,
};
use crate::passes::PassTracing;
use crate::passes::assignment::run_compositing_assignment_pass;
use crate::passes::compositing_inputs::run_compositing_inputs_pass;
use crate::passes::hit_test::{HitTestResult, run_hit_test_pass};
use crate::passes::layer_positions::run_layer_positions_pass;
use crate::scrolling::{EventHandlerRegistry, ScrollingCoordinator, TouchTarget};

// --- MARK: STRUCTS

/// The composition root of Lamina.
///
/// A page owns the frames of a document and everything derived from them. Every change
/// goes through the page, which invalidates what it affects. The derived state is brought
/// up to date by [`update_lifecycle`](Self::update_lifecycle), which also pushes the
/// changes to the compositor.
pub struct Page {
    frames: FrameTree,
    compositor: CompositorProxy,
    coordinator: ScrollingCoordinator,
    event_handlers: EventHandlerRegistry,
    options: PageOptions,
    lifecycle: DocumentLifecycle,
    /// Whether scroll animations can get frames from the host.
    can_schedule_animations: bool,
    /// The time of the last lifecycle update or animation frame.
    now: Duration,
    /// Pass tracing configuration, used to skip tracing to limit overhead.
    trace: PassTracing,
}

/// Options for creating a [`Page`].
#[derive(Clone, Debug)]
pub struct PageOptions {
    /// The size of the main frame's viewport.
    pub viewport_size: Size,
    /// Whether the compositor may scroll on its own thread at all.
    pub threaded_scrolling_enabled: bool,
    /// Whether user scrolls are animated.
    pub scroll_animator_enabled: bool,
    /// Whether touch rects of frames without compositor layers are projected into the
    /// compositor layers of their owner. Otherwise they are dropped.
    pub touch_rects_cross_frames: bool,
    /// Whether the compositor runs scroll animations.
    pub animation_host: bool,
    /// Whether the page has a separate scroll layer for the visual viewport.
    pub visual_viewport_layer: bool,
    /// Whether fixed layers get their own backing when the document scrolls.
    pub accelerated_compositing_for_fixed_position: bool,
    /// Whether every scroller that can scroll on the compositor does.
    pub prefer_composited_scrolling: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            viewport_size: Size::new(800., 600.),
            threaded_scrolling_enabled: true,
            scroll_animator_enabled: true,
            touch_rects_cross_frames: true,
            animation_host: true,
            visual_viewport_layer: false,
            accelerated_compositing_for_fixed_position: false,
            prefer_composited_scrolling: false,
        }
    }
}

/// How far the derived state of a page is up to date.
///
/// Each step depends on the ones before it. Any change to the boxes of a page goes back
/// to [`LayoutClean`](Self::LayoutClean).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentLifecycle {
    /// Boxes are laid out, nothing derived from them is.
    LayoutClean,
    /// Layers are positioned.
    LayerPositionsClean,
    /// Ancestor-dependent compositing inputs are computed.
    CompositingInputsClean,
    /// Every layer knows whether and where it is composited.
    CompositingClean,
    /// The compositor has the scrolling state of the page.
    ScrollingClean,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("frames", &self.frames.len())
            .field("lifecycle", &self.lifecycle)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Creates a page with an empty main frame, whose document has the given size.
    ///
    /// Every compositor command is passed to `sink`, in order.
    pub fn new(
        document_size: Size,
        sink: impl FnMut(CompositorCommand) + 'static,
        options: PageOptions,
    ) -> Self {
        let mut compositor = CompositorProxy::new(sink);
        compositor.set_accepts_animations(options.animation_host);
        let coordinator = ScrollingCoordinator::new(&mut compositor, &options);
        let main = Frame::new(
            None,
            options.viewport_size,
            document_size,
            options.scroll_animator_enabled,
        );
        Self {
            frames: FrameTree::new(main),
            compositor,
            coordinator,
            event_handlers: EventHandlerRegistry::new(),
            options,
            lifecycle: DocumentLifecycle::LayoutClean,
            can_schedule_animations: true,
            now: Duration::ZERO,
            trace: PassTracing::from_env(),
        }
    }

    // --- MARK: GETTERS
    /// Every frame of the page.
    pub fn frames(&self) -> &FrameTree {
        &self.frames
    }

    /// The id of the main frame.
    pub fn main_frame(&self) -> FrameId {
        self.frames.main_frame()
    }

    /// Returns the frame with the given id.
    ///
    /// ## Panics
    ///
    /// If there is no such frame.
    #[track_caller]
    pub fn frame(&self, id: FrameId) -> &Frame {
        self.frames.frame(id)
    }

    /// The compositor, as seen from the main thread.
    pub fn compositor(&self) -> &CompositorProxy {
        &self.compositor
    }

    /// The scrolling coordinator.
    pub fn scrolling_coordinator(&self) -> &ScrollingCoordinator {
        &self.coordinator
    }

    /// The registered touch listeners.
    pub fn event_handlers(&self) -> &EventHandlerRegistry {
        &self.event_handlers
    }

    /// The options the page was created with.
    pub fn options(&self) -> &PageOptions {
        &self.options
    }

    /// How far the derived state is up to date.
    pub fn lifecycle(&self) -> DocumentLifecycle {
        self.lifecycle
    }

    /// A permit to read compositing state, if the compositing assignment is up to date.
    pub fn compositing_query_permit(&self) -> Option<CompositingQueryPermit> {
        (self.lifecycle >= DocumentLifecycle::CompositingClean).then(CompositingQueryPermit::new)
    }

    /// The scrollable area of a layer.
    pub fn scrollable_area(&self, frame: FrameId, layer: LayerId) -> Option<&LayerScrollableArea> {
        self.frames
            .get(frame)?
            .layers
            .get(layer)?
            .scrollable_area()
    }
}

// --- MARK: BOXES
impl Page {
    /// Inserts a leaf box under `parent`, before `before` or last.
    #[track_caller]
    pub fn insert_box(
        &mut self,
        frame: FrameId,
        parent: BoxId,
        before: Option<BoxId>,
        kind: BoxKind,
        location: Point,
        size: Size,
        style: BoxStyle,
    ) -> BoxId {
        let id = self
            .frames
            .frame_mut(frame)
            .insert_box(parent, before, kind, location, size, style);
        self.coordinator.notify_geometry_changed();
        self.coordinator.scrollable_areas_did_change();
        self.invalidate();
        id
    }

    /// Creates a frame hosted by `owner`, a [`BoxKind::FrameOwner`] box of `parent`.
    ///
    /// The viewport of the new frame has the size of the owner box.
    ///
    /// ## Panics
    ///
    /// If `owner` isn't a frame owner, or already hosts a frame.
    #[track_caller]
    pub fn insert_frame(&mut self, parent: FrameId, owner: BoxId, document_size: Size) -> FrameId {
        let parent_frame = self.frames.frame_mut(parent);
        let owner_box = parent_frame.layout.layout_box(owner);
        assert_eq!(
            owner_box.kind,
            BoxKind::FrameOwner,
            "{owner} can't host a frame"
        );
        assert!(
            owner_box.child_frame().is_none(),
            "{owner} already hosts a frame"
        );
        let viewport_size = owner_box.size;
        let child = Frame::new(
            Some((parent, owner)),
            viewport_size,
            document_size,
            self.options.scroll_animator_enabled,
        );
        let id = child.id();
        parent_frame.attach_child_frame(owner, id);
        if let Some(layer) = parent_frame.layout.layout_box(owner).layer() {
            parent_frame.layers.set_needs_compositing_inputs_update(layer);
        }
        self.frames.insert(child);
        self.coordinator.notify_geometry_changed();
        self.invalidate();
        id
    }

    /// Removes a box with its subtree, their layers, and the frames they host.
    #[track_caller]
    pub fn remove_box(&mut self, frame: FrameId, id: BoxId) {
        let frame_ref = self.frames.frame_mut(frame);
        let boxes: Vec<BoxId> = std::iter::once(id)
            .chain(frame_ref.layout.descendants(id))
            .collect();
        let detached = frame_ref.remove_box(id);
        self.event_handlers.did_remove_boxes(frame, &boxes);
        self.release_detached_content(detached);
        self.coordinator.notify_geometry_changed();
        self.coordinator.scrollable_areas_did_change();
        self.invalidate();
    }

    /// Replaces the style of a box.
    #[track_caller]
    pub fn set_style(&mut self, frame: FrameId, id: BoxId, style: BoxStyle) {
        if let Some(layer) = self.frames.frame_mut(frame).set_style(id, style) {
            self.release_layer(&layer);
        }
        self.coordinator.notify_geometry_changed();
        self.coordinator.frame_view_fixed_objects_did_change();
        self.coordinator.scrollable_areas_did_change();
        self.invalidate();
    }

    /// Moves and resizes a box. A frame hosted by the box gets the new size as its viewport.
    #[track_caller]
    pub fn set_geometry(&mut self, frame: FrameId, id: BoxId, location: Point, size: Size) {
        let frame_ref = self.frames.frame_mut(frame);
        frame_ref.set_geometry(id, location, size);
        if let Some(child) = frame_ref.layout.layout_box(id).child_frame() {
            self.frames.frame_mut(child).set_viewport_size(size);
        }
        self.coordinator.notify_geometry_changed();
        self.invalidate();
    }

    /// Sets the size of the scrollable content of a box.
    #[track_caller]
    pub fn set_overflow_size(&mut self, frame: FrameId, id: BoxId, overflow_size: Size) {
        self.frames
            .frame_mut(frame)
            .set_overflow_size(id, overflow_size);
        self.coordinator.notify_overflow_updated();
        self.coordinator.notify_geometry_changed();
        self.invalidate();
    }

    /// Sets the touch-responsive rects of a box, in local coordinates.
    #[track_caller]
    pub fn set_hit_rects(&mut self, frame: FrameId, id: BoxId, hit_rects: &[Rect]) {
        self.frames
            .frame_mut(frame)
            .set_hit_rects(id, SmallVec::from_slice(hit_rects));
        self.coordinator.touch_event_target_rects_did_change();
        self.invalidate();
    }

    /// Resizes the viewport of the main frame.
    pub fn set_viewport_size(&mut self, size: Size) {
        let main = self.frames.main_frame();
        self.options.viewport_size = size;
        self.frames.frame_mut(main).set_viewport_size(size);
        self.coordinator.notify_geometry_changed();
        self.invalidate();
    }

    /// Marks a frame as hidden or offscreen, or visible again.
    #[track_caller]
    pub fn set_frame_throttled(&mut self, frame: FrameId, throttled: bool) {
        let frame_ref = self.frames.frame_mut(frame);
        if frame_ref.view().is_throttled() == throttled {
            return;
        }
        frame_ref.set_throttled(throttled);
        self.coordinator.frame_view_throttling_did_change();
        self.invalidate();
    }

    /// Registers a blocking touch listener.
    pub fn add_touch_handler(&mut self, frame: FrameId, target: TouchTarget) {
        if self.event_handlers.add_touch_handler(frame, target) {
            self.coordinator.touch_event_target_rects_did_change();
            self.invalidate();
        }
    }

    /// Unregisters a blocking touch listener.
    pub fn remove_touch_handler(&mut self, frame: FrameId, target: TouchTarget) {
        if self.event_handlers.remove_touch_handler(frame, target) {
            self.coordinator.touch_event_target_rects_did_change();
            self.invalidate();
        }
    }

    /// Sets whether the host can run animation frames.
    ///
    /// Without frames, scroll animations that can't run on the compositor jump to their target.
    pub fn set_can_schedule_animations(&mut self, can_schedule: bool) {
        self.can_schedule_animations = can_schedule;
    }

    fn invalidate(&mut self) {
        if self.lifecycle != DocumentLifecycle::LayoutClean {
            trace!(from = ?self.lifecycle, "Lifecycle invalidated");
        }
        self.lifecycle = DocumentLifecycle::LayoutClean;
    }

    /// Releases the compositor layers of removed layers and frames.
    fn release_detached_content(&mut self, detached: DetachedContent) {
        for layer in &detached.layers {
            self.release_layer(layer);
        }
        for frame in detached.frames {
            for removed in self.frames.remove(frame) {
                debug!(frame = removed.id().trace(), "Removing frame");
                self.event_handlers.did_remove_frame(removed.id());
                for layer in removed.layers.iter() {
                    self.release_layer(layer);
                }
            }
        }
    }

    fn release_layer(&mut self, layer: &PaintLayer) {
        let Some(mapping) = layer.mapping else {
            return;
        };
        let handles: Vec<LayerHandle> = mapping.handles().collect();
        self.coordinator.will_destroy_layers(handles.iter().copied());
        for handle in handles {
            self.compositor.destroy_layer(handle);
        }
    }
}

// --- MARK: SCROLLING
impl Page {
    /// Scrolls a layer by `delta` steps of `granularity`, as the user would.
    ///
    /// Returns how much of the delta was used. Animated scrolls count as fully used.
    #[track_caller]
    pub fn user_scroll(
        &mut self,
        frame: FrameId,
        layer: LayerId,
        granularity: ScrollGranularity,
        delta: Vec2,
    ) -> ScrollResult {
        let now = self.now;
        let Self {
            frames,
            compositor,
            can_schedule_animations,
            ..
        } = self;
        let Some(area) = frames
            .get_mut(frame)
            .and_then(|frame| frame.layers.get_mut(layer))
            .and_then(PaintLayer::scrollable_area_mut)
        else {
            debug_panic!("{layer} of {frame} can't scroll");
            return ScrollResult {
                unused_scroll_delta: delta,
                ..ScrollResult::default()
            };
        };
        area.state.can_schedule_animation = *can_schedule_animations;
        let before = area.scroll_offset();
        let result = area.user_scroll(compositor, now, granularity, delta);
        let scrolled = area.scroll_offset() != before;
        if scrolled {
            self.did_scroll(frame, layer);
        }
        result
    }

    /// Scrolls a layer to `offset` right away, stopping any animation.
    #[track_caller]
    pub fn set_scroll_offset(&mut self, frame: FrameId, layer: LayerId, offset: Vec2) {
        let now = self.now;
        let Self {
            frames, compositor, ..
        } = self;
        let Some(area) = frames
            .get_mut(frame)
            .and_then(|frame| frame.layers.get_mut(layer))
            .and_then(PaintLayer::scrollable_area_mut)
        else {
            debug_panic!("{layer} of {frame} can't scroll");
            return;
        };
        let before = area.scroll_offset();
        area.set_scroll_offset(compositor, now, offset, ScrollType::Programmatic);
        if area.scroll_offset() != before {
            self.did_scroll(frame, layer);
        }
    }

    /// Shifts the offset of a layer to compensate for a layout shift, along with any animation.
    #[track_caller]
    pub fn adjust_scroll_offset(&mut self, frame: FrameId, layer: LayerId, offset: Vec2) {
        let now = self.now;
        let Self {
            frames, compositor, ..
        } = self;
        let Some(area) = frames
            .get_mut(frame)
            .and_then(|frame| frame.layers.get_mut(layer))
            .and_then(PaintLayer::scrollable_area_mut)
        else {
            debug_panic!("{layer} of {frame} can't scroll");
            return;
        };
        let before = area.scroll_offset();
        area.adjust_scroll_offset(compositor, now, offset);
        if area.scroll_offset() != before {
            self.did_scroll(frame, layer);
        }
    }

    fn scrollable_area_mut(
        &mut self,
        frame: FrameId,
        layer: LayerId,
    ) -> Option<&mut LayerScrollableArea> {
        self.frames
            .get_mut(frame)?
            .layers
            .get_mut(layer)?
            .scrollable_area_mut()
    }

    /// The content of a scroller moved.
    fn did_scroll(&mut self, frame: FrameId, layer: LayerId) {
        self.frames
            .frame_mut(frame)
            .layers
            .set_needs_compositing_inputs_update(layer);
        self.coordinator.notify_geometry_changed();
        self.invalidate();
    }

    /// Finds the scrollable area matching `predicate`.
    fn find_scrollable_area(
        &self,
        predicate: impl Fn(&LayerScrollableArea) -> bool,
    ) -> Option<(FrameId, LayerId)> {
        self.frames.ids().into_iter().find_map(|frame_id| {
            let frame = self.frames.get(frame_id)?;
            frame
                .layers
                .iter()
                .filter_map(PaintLayer::scrollable_area)
                .find(|area| predicate(area))
                .map(|area| (frame_id, area.layer()))
        })
    }
}

// --- MARK: LIFECYCLE
impl Page {
    /// Brings everything derived from the boxes up to date, and pushes the changes to
    /// the compositor.
    ///
    /// Scroll animations that were started or changed since the last update are sent to
    /// the compositor here, once their scroll layers are known.
    pub fn update_lifecycle(&mut self, now: Duration) {
        self.now = now;
        let needs_animation_service = self.needs_animation_service();
        if self.lifecycle == DocumentLifecycle::ScrollingClean && !needs_animation_service {
            return;
        }
        let _span = info_span!("update_lifecycle").entered();

        self.run_compositing_passes();
        // Animations that can't run at all jump to their target, which moves layers again.
        if self.service_scroll_animations() {
            self.run_compositing_passes();
        }

        self.coordinator.update_after_compositing_change_if_needed(
            &mut self.frames,
            &mut self.compositor,
            &self.event_handlers,
            &self.options,
            now,
            self.trace.scrolling_coordinator,
        );
        self.lifecycle = DocumentLifecycle::ScrollingClean;
        debug!(
            frames = self.frames.len(),
            compositor_layers = self.compositor.live_layer_count(),
            "Lifecycle updated"
        );
    }

    fn run_compositing_passes(&mut self) {
        let ids = self.frames.ids();
        for id in &ids {
            run_layer_positions_pass(self.frames.frame_mut(*id), self.trace.layer_positions);
        }
        self.lifecycle = DocumentLifecycle::LayerPositionsClean;

        for id in &ids {
            run_compositing_inputs_pass(self.frames.frame_mut(*id), self.trace.compositing_inputs);
        }
        self.lifecycle = DocumentLifecycle::CompositingInputsClean;

        run_compositing_assignment_pass(
            &mut self.frames,
            &mut self.compositor,
            &self.options,
            self.now,
            self.trace.compositing_assignment,
        );
        self.lifecycle = DocumentLifecycle::CompositingClean;
    }

    fn needs_animation_service(&self) -> bool {
        self.frames.ids().into_iter().any(|frame_id| {
            self.frames.get(frame_id).is_some_and(|frame| {
                frame
                    .layers
                    .iter()
                    .filter_map(PaintLayer::scrollable_area)
                    .any(|area| area.state.registered_for_animation)
            })
        })
    }

    /// Runs [`update_compositor_animations`] on every area registered for it.
    ///
    /// Returns `true` if an offset changed.
    ///
    /// [`update_compositor_animations`]:
    ///     crate::scrolling::ScrollAnimator::update_compositor_animations
    fn service_scroll_animations(&mut self) -> bool {
        let Self {
            frames,
            compositor,
            now,
            can_schedule_animations,
            ..
        } = self;
        let mut scrolled = false;
        for frame_id in frames.ids() {
            let frame = frames.frame_mut(frame_id);
            for layer_id in frame.layers.ids() {
                let Some(area) = frame.layers.layer_mut(layer_id).scrollable_area_mut() else {
                    continue;
                };
                if !area.state.registered_for_animation {
                    continue;
                }
                area.state.registered_for_animation = false;
                area.state.can_schedule_animation = *can_schedule_animations;
                let before = area.scroll_offset();
                area.with_animator(compositor, *now, |animator, ctx| {
                    animator.update_compositor_animations(ctx);
                });
                if area.scroll_offset() != before {
                    frame.layers.set_needs_compositing_inputs_update(layer_id);
                    scrolled = true;
                }
            }
        }
        if scrolled {
            self.coordinator.notify_geometry_changed();
        }
        scrolled
    }

    /// Runs an animation frame: ticks main-thread scroll animations, then updates the lifecycle.
    pub fn animate(&mut self, now: Duration) {
        self.now = now;
        {
            let _span = info_span!("animate").entered();
            let mut scrolled: Vec<(FrameId, LayerId)> = Vec::new();
            let Self {
                frames, compositor, ..
            } = self;
            for frame_id in frames.ids() {
                let frame = frames.frame_mut(frame_id);
                for layer_id in frame.layers.ids() {
                    let Some(area) = frame.layers.layer_mut(layer_id).scrollable_area_mut() else {
                        continue;
                    };
                    if !area.state.animation_scheduled {
                        continue;
                    }
                    area.state.animation_scheduled = false;
                    let before = area.scroll_offset();
                    area.with_animator(compositor, now, |animator, ctx| {
                        animator.tick_animation(ctx);
                    });
                    if area.scroll_offset() != before {
                        scrolled.push((frame_id, layer_id));
                    }
                }
            }
            for (frame, layer) in scrolled {
                self.did_scroll(frame, layer);
            }
        }
        self.update_lifecycle(now);
    }

    /// Whether a main-thread scroll animation is waiting for a frame.
    pub fn has_scheduled_animation(&self) -> bool {
        self.find_scrollable_area(|area| area.state.animation_scheduled)
            .is_some()
    }

    /// Handles a notification from the compositor.
    pub fn dispatch_compositor_event(&mut self, event: CompositorEvent) {
        let _span = info_span!("compositor_event").entered();
        trace!(?event, "Compositor event");
        match event {
            CompositorEvent::AnimationFinished { group } => {
                self.compositor.did_finish_animation_group(group);
                self.notify_animation_group(group, false);
            }
            CompositorEvent::AnimationAborted { group } => {
                self.compositor.did_finish_animation_group(group);
                self.notify_animation_group(group, true);
            }
            CompositorEvent::DidScroll { layer, offset } => {
                let Some((frame, layer_id)) =
                    self.find_scrollable_area(|area| area.layer_for_scrolling() == Some(layer))
                else {
                    debug!(%layer, "Compositor scrolled an unknown layer");
                    return;
                };
                let Some(area) = self.scrollable_area_mut(frame, layer_id) else {
                    return;
                };
                let before = area.scroll_offset();
                area.apply_compositor_scroll(offset);
                if area.scroll_offset() != before {
                    self.did_scroll(frame, layer_id);
                }
            }
        }
    }

    fn notify_animation_group(&mut self, group: AnimationGroupId, aborted: bool) {
        let Some((frame, layer)) = self.find_scrollable_area(|area| {
            area.scroll_animator()
                .and_then(|animator| animator.compositor_animation())
                .is_some_and(|ids| ids.group == group)
        }) else {
            // Animations we aborted ourselves are forgotten already.
            trace!(%group, "Ignoring notification for a stale animation group");
            return;
        };
        let now = self.now;
        let Self {
            frames, compositor, ..
        } = self;
        let Some(area) = frames
            .frame_mut(frame)
            .layers
            .layer_mut(layer)
            .scrollable_area_mut()
        else {
            return;
        };
        area.with_animator(compositor, now, |animator, ctx| {
            if aborted {
                animator.notify_compositor_animation_aborted(ctx, group);
            } else {
                animator.notify_compositor_animation_finished(ctx, group);
            }
        });
    }

    // --- MARK: HIT TESTING
    /// Finds the front-most layer of `frame` under `point`, in viewport coordinates.
    ///
    /// The lifecycle is brought up to date first.
    pub fn hit_test(&mut self, frame: FrameId, point: Point) -> Option<HitTestResult> {
        self.update_lifecycle(self.now);
        let frame = self.frames.get(frame)?;
        run_hit_test_pass(frame, point, self.trace.hit_test)
    }
}
