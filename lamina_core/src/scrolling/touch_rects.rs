// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Touch event target rects: where touches must be sent to the main thread.
//!
//! Rects are first collected per paint layer, then projected into the space of the
//! compositor layers that end up displaying those paint layers.

use hashbrown::{HashMap, HashSet};
use kurbo::{Rect, Vec2};
use tracing::trace;

use crate::app::{Frame, FrameTree};
use crate::core::{BoxId, CompositingState, FrameId, LayerHandle, LayerId, LayerRef};
use crate::passes::enter_span_if;

/// Something touch event listeners can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchTarget {
    /// The window of the frame.
    Window,
    /// The document of the frame.
    Document,
    /// The root element of the document.
    DocumentElement,
    /// The body element of the document.
    Body,
    /// Any other element, by its box.
    Element(BoxId),
}

impl TouchTarget {
    /// Whether a listener on this target covers the whole document.
    pub fn covers_document(self) -> bool {
        !matches!(self, Self::Element(_))
    }
}

/// The targets with blocking touch-start or touch-move listeners, per frame.
#[derive(Clone, Debug, Default)]
pub struct EventHandlerRegistry {
    touch_targets: HashMap<FrameId, HashSet<TouchTarget>>,
}

impl EventHandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a blocking touch listener. Returns `false` if the target had one already.
    pub fn add_touch_handler(&mut self, frame: FrameId, target: TouchTarget) -> bool {
        self.touch_targets.entry(frame).or_default().insert(target)
    }

    /// Forgets a blocking touch listener. Returns `false` if the target had none.
    pub fn remove_touch_handler(&mut self, frame: FrameId, target: TouchTarget) -> bool {
        let Some(targets) = self.touch_targets.get_mut(&frame) else {
            return false;
        };
        let removed = targets.remove(&target);
        if targets.is_empty() {
            self.touch_targets.remove(&frame);
        }
        removed
    }

    /// Whether `target` has a blocking touch listener.
    pub fn has_touch_handler(&self, frame: FrameId, target: TouchTarget) -> bool {
        self.touch_targets
            .get(&frame)
            .is_some_and(|targets| targets.contains(&target))
    }

    /// The targets of a frame with blocking touch listeners.
    pub fn touch_targets(&self, frame: FrameId) -> impl Iterator<Item = TouchTarget> + '_ {
        self.touch_targets
            .get(&frame)
            .into_iter()
            .flat_map(|targets| targets.iter().copied())
    }

    /// Whether any frame has blocking touch listeners.
    pub fn has_touch_handlers(&self) -> bool {
        !self.touch_targets.is_empty()
    }

    /// Forgets the listeners of removed boxes. Returns `true` if there were any.
    pub(crate) fn did_remove_boxes(&mut self, frame: FrameId, boxes: &[BoxId]) -> bool {
        let mut changed = false;
        for box_id in boxes {
            changed |= self.remove_touch_handler(frame, TouchTarget::Element(*box_id));
        }
        changed
    }

    /// Forgets every listener of a removed frame. Returns `true` if there were any.
    pub(crate) fn did_remove_frame(&mut self, frame: FrameId) -> bool {
        self.touch_targets.remove(&frame).is_some()
    }
}

/// Rects per paint layer, in the content space of the layer.
///
/// The content space of a scroller moves with its scrolled content. For every other
/// layer, including frame roots, it's the layer's own coordinate space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerHitTestRects {
    rects: HashMap<LayerRef, Vec<Rect>>,
}

impl LayerHitTestRects {
    /// The rects of a layer, or `None` if the layer has no entry.
    ///
    /// A layer may have an empty entry.
    pub fn get(&self, layer: LayerRef) -> Option<&[Rect]> {
        self.rects.get(&layer).map(Vec::as_slice)
    }

    /// Every entry.
    pub fn iter(&self) -> impl Iterator<Item = (LayerRef, &[Rect])> + '_ {
        self.rects
            .iter()
            .map(|(layer, rects)| (*layer, rects.as_slice()))
    }

    /// The number of layers with an entry.
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Returns `true` if no layer has an entry.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    fn entry(&mut self, layer: LayerRef) -> &mut Vec<Rect> {
        self.rects.entry(layer).or_default()
    }

    fn add(&mut self, layer: LayerRef, rect: Rect) {
        if !rect.is_zero_area() {
            self.entry(layer).push(rect);
        }
    }
}

/// Rects per compositor layer, in the coordinates of that layer.
pub(crate) type GraphicsLayerHitTestRects = HashMap<LayerHandle, Vec<Rect>>;

/// Offset from a layer's coordinate space to its content space.
pub(crate) fn content_offset(frame: &Frame, layer: LayerId) -> Vec2 {
    let layer = frame.layers.layer(layer);
    if layer.is_root() {
        Vec2::ZERO
    } else {
        layer.scroll_offset()
    }
}

// --- MARK: COMPUTE
/// Collects the rects of every blocking touch listener of every frame.
pub(crate) fn compute_touch_event_target_rects(
    frames: &FrameTree,
    registry: &EventHandlerRegistry,
    trace: bool,
) -> LayerHitTestRects {
    let mut rects = LayerHitTestRects::default();
    for frame_id in frames.ids() {
        let Some(frame) = frames.get(frame_id) else {
            continue;
        };
        let targets: HashSet<TouchTarget> = registry.touch_targets(frame_id).collect();
        if targets.is_empty() {
            continue;
        }
        if frame.view().is_throttled() {
            trace!(frame = frame_id.trace(), "Skipping touch targets of throttled frame");
            continue;
        }
        // Listeners on the document cover everything, the rest can be skipped.
        if targets.iter().any(|target| target.covers_document()) {
            accumulate_document_rects(frame, &mut rects);
            continue;
        }
        for target in &targets {
            let TouchTarget::Element(box_id) = *target else {
                continue;
            };
            if !frame.layout.contains(box_id) {
                continue;
            }
            let subsumed = frame
                .layout
                .ancestors(box_id)
                .any(|ancestor| targets.contains(&TouchTarget::Element(ancestor)));
            if subsumed {
                continue;
            }
            accumulate_element_rects(frame, box_id, &mut rects, trace);
        }
    }
    rects
}

fn accumulate_document_rects(frame: &Frame, rects: &mut LayerHitTestRects) {
    let layers = &frame.layers;
    let root = layers.root();
    let document_rect = layers
        .layer(root)
        .scrollable_area()
        .map_or(layers.layer(root).physical_bounding_box(), |area| area.overflow_rect());
    rects.add(LayerRef::new(frame.id(), root), document_rect);

    // Content with its own backing isn't covered by the root's compositor layer.
    for layer in layers.iter() {
        if layer.is_root() || layer.compositing_state != CompositingState::PaintsIntoOwnBacking {
            continue;
        }
        let key = LayerRef::new(frame.id(), layer.id());
        rects.add(key, layer.physical_bounding_box() + content_offset(frame, layer.id()));
        if let Some(area) = layer
            .scrollable_area()
            .filter(|area| area.uses_composited_scrolling())
        {
            rects.add(key, area.overflow_rect());
        }
    }
}

fn accumulate_element_rects(
    frame: &Frame,
    box_id: BoxId,
    rects: &mut LayerHitTestRects,
    trace: bool,
) {
    let layers = &frame.layers;
    let Some(enclosing) = frame.layout.enclosing_layer(box_id) else {
        return;
    };
    let _span = enter_span_if(trace, layers.layer(enclosing));

    // Content of a main-thread scroller moves without the rects being recomputed,
    // so the whole scroller blocks touches.
    let mut outermost_scroller = None;
    let mut current = Some(enclosing);
    while let Some(layer_id) = current {
        let layer = layers.layer(layer_id);
        if layer.is_root() || layer.compositing_state.is_composited() {
            break;
        }
        if layer.scrolls_overflow() {
            outermost_scroller = Some(layer_id);
        }
        current = layers.parent(layer_id);
    }
    if let Some(scroller) = outermost_scroller {
        accumulate_scroller_rects(frame, scroller, rects);
    }

    for descendant in std::iter::once(box_id).chain(frame.layout.descendants(box_id)) {
        let Some((layer, offset)) = frame.layout.offset_from_enclosing_layer(descendant) else {
            continue;
        };
        let key = LayerRef::new(frame.id(), layer);
        for rect in frame.layout.layout_box(descendant).local_hit_rects() {
            rects.add(key, rect + offset);
        }
    }
}

/// Adds the border box of a scroller to its parent.
///
/// The scroller gets an entry of its own, which only holds its content if it scrolls
/// on the compositor.
fn accumulate_scroller_rects(frame: &Frame, scroller: LayerId, rects: &mut LayerHitTestRects) {
    let layers = &frame.layers;
    let layer = layers.layer(scroller);
    if layer.size().is_zero_area() {
        return;
    }
    let key = LayerRef::new(frame.id(), scroller);
    rects.entry(key);
    if layer.compositing_state.is_composited() {
        if let Some(area) = layer.scrollable_area() {
            rects.add(key, area.overflow_rect());
        }
    }
    if let Some(parent) = layers.parent(scroller) {
        let bounds = layers
            .transform_to_ancestor(scroller, Some(parent))
            .transform_rect_bbox(layer.physical_bounding_box());
        rects.add(
            LayerRef::new(frame.id(), parent),
            bounds + content_offset(frame, parent),
        );
    }
}

// --- MARK: PROJECT
/// Maps rects of paint layers into the compositor layers displaying them.
///
/// Layers of a frame without compositor layers are displayed by the frame's owner.
/// Unless `cross_frames` is set, their rects are dropped.
pub(crate) fn project_rects_to_graphics_layers(
    frames: &FrameTree,
    rects: &LayerHitTestRects,
    cross_frames: bool,
) -> GraphicsLayerHitTestRects {
    let mut projected = GraphicsLayerHitTestRects::new();
    for (layer, layer_rects) in rects.iter() {
        for rect in layer_rects {
            if let Some((handle, rect)) = project_rect(frames, layer, *rect, cross_frames) {
                projected.entry(handle).or_default().push(rect);
            }
        }
        // Empty entries still clear the region of their compositor layer.
        if layer_rects.is_empty() {
            if let Some((handle, _)) = project_rect(frames, layer, Rect::ZERO, cross_frames) {
                projected.entry(handle).or_default();
            }
        }
    }
    projected
}

/// Maps one rect, in the content space of `layer`, to the compositor layer displaying it.
fn project_rect(
    frames: &FrameTree,
    mut layer: LayerRef,
    mut rect: Rect,
    cross_frames: bool,
) -> Option<(LayerHandle, Rect)> {
    loop {
        let frame = frames.get(layer.frame)?;
        let layers = &frame.layers;
        if let Some((backing, handle, backing_offset)) =
            graphics_layer_backing(frame, layer.layer)
        {
            let in_layer = rect - content_offset(frame, layer.layer);
            let in_backing = layers
                .transform_to_ancestor(layer.layer, Some(backing))
                .transform_rect_bbox(in_layer);
            return Some((handle, in_backing + backing_offset));
        }
        if !cross_frames {
            return None;
        }
        // The frame isn't composited: continue from the box hosting it.
        let owner_box = frame.owner_box()?;
        let parent = frames.get(frame.parent()?)?;
        let (owner_layer, owner_offset) = parent.layout.offset_from_enclosing_layer(owner_box)?;
        rect = rect - layers.root_scroll_offset() + owner_offset;
        layer = LayerRef::new(parent.id(), owner_layer);
    }
}

/// The paint layer whose compositor layer displays `id`, that compositor layer, and the
/// offset from the paint layer's space to that of the compositor layer.
fn graphics_layer_backing(frame: &Frame, id: LayerId) -> Option<(LayerId, LayerHandle, Vec2)> {
    let layers = &frame.layers;
    let mut current = Some(id);
    while let Some(layer_id) = current {
        let layer = layers.layer(layer_id);
        match layer.compositing_state {
            CompositingState::PaintsIntoOwnBacking => {
                let mapping = layer.mapping?;
                let handle = mapping.graphics_layer_backing(false);
                let offset = if mapping.scrolling_contents == Some(handle) {
                    content_offset(frame, layer_id)
                } else {
                    Vec2::ZERO
                };
                return Some((layer_id, handle, offset));
            }
            CompositingState::PaintsIntoGroupedBacking => {
                let owner = layer.squashing_owner?;
                let handle = layers.layer(owner).mapping?.squashing?;
                return Some((owner, handle, Vec2::ZERO));
            }
            CompositingState::NotComposited => {
                current = layers.compositing_container(layer_id);
            }
        }
    }
    None
}
