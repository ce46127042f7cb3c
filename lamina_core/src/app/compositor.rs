// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The main thread side of the compositor protocol.

use std::fmt;
use std::time::Duration;

use hashbrown::{HashMap, HashSet};
use kurbo::{Rect, Size, Vec2};
use tracing::trace;

use crate::core::{AnimationGroupId, AnimationId, LayerHandle};
use crate::scrolling::{MainThreadScrollingReasons, ScrollOffsetAnimationCurve};

/// How a fixed-position layer is anchored to the viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PositionConstraint {
    /// The layer keeps its distance to the right edge of the viewport.
    pub fixed_to_right: bool,
    /// The layer keeps its distance to the bottom edge of the viewport.
    pub fixed_to_bottom: bool,
}

/// Identifies a scroll animation running on the compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScrollAnimationIds {
    /// The animation.
    pub animation: AnimationId,
    /// The group the animation finishes with.
    pub group: AnimationGroupId,
}

/// A scroll offset animation handed over to the compositor.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrollAnimationRequest {
    /// Identifies the animation in later commands and events.
    pub ids: ScrollAnimationIds,
    /// The scroll layer to animate.
    pub layer: LayerHandle,
    /// The offset curve.
    pub curve: ScrollOffsetAnimationCurve,
    /// When the animation started on the main thread, on the page's clock.
    ///
    /// Retargeted animations keep the start time of the first animation.
    pub start_time: Duration,
}

/// A request from the main thread to the compositor.
///
/// Commands are posted in order and never answered directly.
#[derive(Clone, Debug, PartialEq)]
pub enum CompositorCommand {
    /// A new layer exists.
    CreateLayer(LayerHandle),
    /// The layer is gone, along with its animations.
    DestroyLayer(LayerHandle),
    /// The size of a layer changed.
    SetLayerBounds {
        /// The layer.
        layer: LayerHandle,
        /// The new size.
        size: Size,
    },
    /// The viewport anchoring of a layer changed.
    SetPositionConstraint {
        /// The layer.
        layer: LayerHandle,
        /// The anchoring, or `None` for layers that scroll with their content.
        constraint: Option<PositionConstraint>,
    },
    /// Associates a scroll layer with the layer clipping it.
    SetScrollClipLayer {
        /// The scroll layer.
        layer: LayerHandle,
        /// The clip layer.
        clip: LayerHandle,
    },
    /// Which axes of a scroll layer the user may scroll.
    SetUserScrollable {
        /// The scroll layer.
        layer: LayerHandle,
        /// Horizontal axis.
        x: bool,
        /// Vertical axis.
        y: bool,
    },
    /// Scroll gestures starting in these rects must be sent to the main thread.
    SetNonFastScrollableRegion {
        /// The scroll layer the rects are relative to.
        layer: LayerHandle,
        /// The region.
        rects: Vec<Rect>,
    },
    /// Touches starting in these rects must be sent to the main thread.
    SetTouchEventHandlerRegion {
        /// The layer the rects are relative to.
        layer: LayerHandle,
        /// The region. Empty to clear.
        rects: Vec<Rect>,
    },
    /// Adds reasons for a scroll layer to scroll on the main thread.
    AddMainThreadScrollingReasons {
        /// The scroll layer.
        layer: LayerHandle,
        /// The added reasons.
        reasons: MainThreadScrollingReasons,
    },
    /// Removes reasons for a scroll layer to scroll on the main thread.
    ClearMainThreadScrollingReasons {
        /// The scroll layer.
        layer: LayerHandle,
        /// The removed reasons.
        reasons: MainThreadScrollingReasons,
    },
    /// Starts a scroll animation.
    AddScrollAnimation(ScrollAnimationRequest),
    /// Stops an animation, reporting it as aborted.
    AbortAnimation(AnimationId),
    /// Stops an animation without reporting anything.
    RemoveAnimation(AnimationId),
    /// The main thread moved a scroll layer.
    UpdateScrollOffset {
        /// The scroll layer.
        layer: LayerHandle,
        /// The new offset.
        offset: Vec2,
    },
}

/// A notification from the compositor, delivered on the main thread.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompositorEvent {
    /// The animations of a group ran to completion.
    AnimationFinished {
        /// The finished group.
        group: AnimationGroupId,
    },
    /// The animations of a group were aborted.
    AnimationAborted {
        /// The aborted group.
        group: AnimationGroupId,
    },
    /// The compositor scrolled a layer.
    DidScroll {
        /// The scroll layer.
        layer: LayerHandle,
        /// The new offset.
        offset: Vec2,
    },
}

/// The main thread's view of the compositor.
///
/// Handles and animation ids are allocated here, so commands can refer to them right away.
/// The proxy mirrors the main-thread scrolling reasons of every layer, so they can be combined
/// without a round trip.
pub struct CompositorProxy {
    sink: Box<dyn FnMut(CompositorCommand)>,
    live_layers: HashSet<LayerHandle>,
    reasons: HashMap<LayerHandle, MainThreadScrollingReasons>,
    animations: HashMap<AnimationId, ScrollAnimationIds>,
    accepts_animations: bool,
}

impl fmt::Debug for CompositorProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositorProxy")
            .field("live_layers", &self.live_layers.len())
            .field("reasons", &self.reasons)
            .field("animations", &self.animations.len())
            .field("accepts_animations", &self.accepts_animations)
            .finish_non_exhaustive()
    }
}

// --- MARK: LAYERS
impl CompositorProxy {
    /// Creates a proxy posting commands to `sink`.
    pub fn new(sink: impl FnMut(CompositorCommand) + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            live_layers: HashSet::new(),
            reasons: HashMap::new(),
            animations: HashMap::new(),
            accepts_animations: true,
        }
    }

    fn post(&mut self, command: CompositorCommand) {
        trace!(?command, "Posting compositor command");
        (self.sink)(command);
    }

    #[track_caller]
    fn check_live(&self, layer: LayerHandle) -> bool {
        if self.live_layers.contains(&layer) {
            true
        } else {
            debug_panic!("Compositor layer {layer} used after being destroyed");
            false
        }
    }

    /// Whether the handle refers to a layer that exists.
    pub fn is_live(&self, layer: LayerHandle) -> bool {
        self.live_layers.contains(&layer)
    }

    /// The number of live layers.
    pub fn live_layer_count(&self) -> usize {
        self.live_layers.len()
    }

    /// Creates a compositor layer.
    pub fn create_layer(&mut self) -> LayerHandle {
        let layer = LayerHandle::next();
        self.live_layers.insert(layer);
        self.post(CompositorCommand::CreateLayer(layer));
        layer
    }

    /// Destroys a compositor layer. Animations on it end without notification.
    pub fn destroy_layer(&mut self, layer: LayerHandle) {
        if !self.check_live(layer) {
            return;
        }
        self.live_layers.remove(&layer);
        self.reasons.remove(&layer);
        self.post(CompositorCommand::DestroyLayer(layer));
    }

    /// Sets the size of a layer.
    pub fn set_layer_bounds(&mut self, layer: LayerHandle, size: Size) {
        if self.check_live(layer) {
            self.post(CompositorCommand::SetLayerBounds { layer, size });
        }
    }

    /// Sets the viewport anchoring of a layer.
    pub fn set_position_constraint(
        &mut self,
        layer: LayerHandle,
        constraint: Option<PositionConstraint>,
    ) {
        if self.check_live(layer) {
            self.post(CompositorCommand::SetPositionConstraint { layer, constraint });
        }
    }

    /// Associates a scroll layer with its clip layer.
    pub fn set_scroll_clip_layer(&mut self, layer: LayerHandle, clip: LayerHandle) {
        if self.check_live(layer) && self.check_live(clip) {
            self.post(CompositorCommand::SetScrollClipLayer { layer, clip });
        }
    }

    /// Sets which axes of a scroll layer the user may scroll.
    pub fn set_user_scrollable(&mut self, layer: LayerHandle, x: bool, y: bool) {
        if self.check_live(layer) {
            self.post(CompositorCommand::SetUserScrollable { layer, x, y });
        }
    }

    /// Sets the region where scroll gestures must be handled on the main thread.
    pub fn set_non_fast_scrollable_region(&mut self, layer: LayerHandle, rects: Vec<Rect>) {
        if self.check_live(layer) {
            self.post(CompositorCommand::SetNonFastScrollableRegion { layer, rects });
        }
    }

    /// Sets the region where touches must be sent to the main thread.
    pub fn set_touch_event_handler_region(&mut self, layer: LayerHandle, rects: Vec<Rect>) {
        if self.check_live(layer) {
            self.post(CompositorCommand::SetTouchEventHandlerRegion { layer, rects });
        }
    }

    /// Tells the compositor the main thread moved a scroll layer.
    pub fn update_scroll_offset(&mut self, layer: LayerHandle, offset: Vec2) {
        if self.check_live(layer) {
            self.post(CompositorCommand::UpdateScrollOffset { layer, offset });
        }
    }
}

// --- MARK: SCROLLING REASONS
impl CompositorProxy {
    /// The main-thread scrolling reasons currently set on a layer.
    pub fn main_thread_scrolling_reasons(&self, layer: LayerHandle) -> MainThreadScrollingReasons {
        self.reasons.get(&layer).copied().unwrap_or_default()
    }

    /// Whether a scroll layer must scroll on the main thread for a structural reason.
    ///
    /// Running main-thread animations don't count.
    pub fn should_scroll_on_main_thread(&self, layer: LayerHandle) -> bool {
        !self
            .main_thread_scrolling_reasons(layer)
            .non_transient()
            .is_empty()
    }

    /// Adds reasons to a layer. Nothing is posted if they were all set already.
    pub fn add_main_thread_scrolling_reasons(
        &mut self,
        layer: LayerHandle,
        reasons: MainThreadScrollingReasons,
    ) {
        if !self.check_live(layer) {
            return;
        }
        let current = self.reasons.entry(layer).or_default();
        if current.contains(reasons) {
            return;
        }
        *current |= reasons;
        self.post(CompositorCommand::AddMainThreadScrollingReasons { layer, reasons });
    }

    /// Clears reasons from a layer. Nothing is posted if none of them were set.
    pub fn clear_main_thread_scrolling_reasons(
        &mut self,
        layer: LayerHandle,
        reasons: MainThreadScrollingReasons,
    ) {
        if !self.check_live(layer) {
            return;
        }
        let Some(current) = self.reasons.get_mut(&layer) else {
            return;
        };
        if !current.intersects(reasons) {
            return;
        }
        current.remove(reasons);
        self.post(CompositorCommand::ClearMainThreadScrollingReasons { layer, reasons });
    }
}

// --- MARK: ANIMATIONS
impl CompositorProxy {
    /// Whether the compositor currently runs scroll animations.
    pub fn accepts_animations(&self) -> bool {
        self.accepts_animations
    }

    /// Sets whether the compositor runs scroll animations.
    ///
    /// When it doesn't, smooth scrolls tick on the main thread.
    pub fn set_accepts_animations(&mut self, accepts: bool) {
        self.accepts_animations = accepts;
    }

    /// The number of animations posted and not yet finished, aborted or removed.
    pub fn running_animation_count(&self) -> usize {
        self.animations.len()
    }

    /// Whether an animation was posted and is not finished, aborted or removed yet.
    pub fn is_animation_running(&self, animation: AnimationId) -> bool {
        self.animations.contains_key(&animation)
    }

    /// Hands a scroll animation to the compositor.
    ///
    /// Returns `None` if the compositor can't run it.
    pub fn add_scroll_animation(
        &mut self,
        layer: LayerHandle,
        curve: &ScrollOffsetAnimationCurve,
        start_time: Duration,
    ) -> Option<ScrollAnimationIds> {
        if !self.accepts_animations || !self.live_layers.contains(&layer) {
            return None;
        }
        let ids = ScrollAnimationIds {
            animation: AnimationId::next(),
            group: AnimationGroupId::next(),
        };
        self.animations.insert(ids.animation, ids);
        self.post(CompositorCommand::AddScrollAnimation(ScrollAnimationRequest {
            ids,
            layer,
            curve: curve.clone(),
            start_time,
        }));
        Some(ids)
    }

    /// Aborts an animation. The compositor will report it as aborted.
    pub fn abort_animation(&mut self, animation: AnimationId) {
        if self.animations.remove(&animation).is_some() {
            self.post(CompositorCommand::AbortAnimation(animation));
        }
    }

    /// Removes an animation silently.
    pub fn remove_animation(&mut self, animation: AnimationId) {
        if self.animations.remove(&animation).is_some() {
            self.post(CompositorCommand::RemoveAnimation(animation));
        }
    }

    /// Forgets the animations of a group the compositor reported as done.
    pub(crate) fn did_finish_animation_group(&mut self, group: AnimationGroupId) {
        self.animations.retain(|_, ids| ids.group != group);
    }
}
