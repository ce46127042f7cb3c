// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use hashbrown::{HashMap, HashSet};
use kurbo::{Point, Rect, Size, Vec2};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::core::{
    BoxId, BoxKind, BoxStyle, FrameId, LayerId, LayerScrollableArea, LayerTree, LayerType,
    LayoutBox, LayoutTree, PaintLayer, Position,
};

/// The viewport of a frame, and the objects attached to it.
#[derive(Debug)]
pub struct FrameView {
    /// Fixed layers, and sticky layers whose ancestor overflow layer is the root.
    pub(crate) viewport_constrained: HashSet<LayerId>,
    /// Throttled frames are offscreen or hidden, and skipped by the scrolling coordinator.
    pub(crate) throttled: bool,
}

impl FrameView {
    fn new() -> Self {
        Self {
            viewport_constrained: HashSet::new(),
            throttled: false,
        }
    }

    /// Layers whose position depends on the viewport rather than the document.
    pub fn viewport_constrained_layers(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.viewport_constrained.iter().copied()
    }

    /// Whether the layer is registered as viewport constrained.
    pub fn is_viewport_constrained(&self, layer: LayerId) -> bool {
        self.viewport_constrained.contains(&layer)
    }

    /// Whether any layer is viewport constrained.
    pub fn has_viewport_constrained_objects(&self) -> bool {
        !self.viewport_constrained.is_empty()
    }

    /// Whether the frame is throttled.
    pub fn is_throttled(&self) -> bool {
        self.throttled
    }
}

/// A document with its layout and paint layer trees.
///
/// A frame's root box is its viewport. The root layer always has a scrollable area,
/// which scrolls the document.
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    parent: Option<FrameId>,
    owner_box: Option<BoxId>,
    pub(crate) children: Vec<FrameId>,
    scroll_animator_enabled: bool,
    pub(crate) layout: LayoutTree,
    pub(crate) layers: LayerTree,
    pub(crate) view: FrameView,
    /// Whether the frame has layers with their own compositor backing.
    pub(crate) composited: bool,
}

/// What is left over after removing boxes from a frame.
#[derive(Debug, Default)]
pub(crate) struct DetachedContent {
    pub(crate) layers: Vec<PaintLayer>,
    pub(crate) frames: Vec<FrameId>,
}

// --- MARK: CREATION
impl Frame {
    pub(crate) fn new(
        owner: Option<(FrameId, BoxId)>,
        viewport_size: Size,
        document_size: Size,
        scroll_animator_enabled: bool,
    ) -> Self {
        let id = FrameId::next();
        let mut layout = LayoutTree::new(viewport_size);
        let root_box = layout.root();
        let contents_size = document_size.max(viewport_size);
        layout.layout_box_mut(root_box).overflow_size = contents_size;

        let mut root = PaintLayer::new(
            id,
            root_box,
            BoxKind::View,
            LayerType::Normal,
            BoxStyle::default(),
            viewport_size,
        );
        let mut area = LayerScrollableArea::new(root.id(), viewport_size, contents_size);
        area.state.scroll_animator_enabled = scroll_animator_enabled;
        root.scrollable_area = Some(area);
        layout.layout_box_mut(root_box).layer = Some(root.id());

        debug!(frame = id.trace(), ?viewport_size, "Creating frame");
        Self {
            id,
            parent: owner.map(|(frame, _)| frame),
            owner_box: owner.map(|(_, owner_box)| owner_box),
            children: Vec::new(),
            scroll_animator_enabled,
            layout,
            layers: LayerTree::new(root),
            view: FrameView::new(),
            composited: false,
        }
    }
}

// --- MARK: GETTERS
impl Frame {
    /// The id of the frame.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The frame hosting this one, if any.
    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// The box of the parent frame hosting this frame.
    pub fn owner_box(&self) -> Option<BoxId> {
        self.owner_box
    }

    /// Whether this is the page's main frame.
    pub fn is_main_frame(&self) -> bool {
        self.parent.is_none()
    }

    /// The frames hosted by boxes of this frame.
    pub fn children(&self) -> &[FrameId] {
        &self.children
    }

    /// The layout tree.
    pub fn layout(&self) -> &LayoutTree {
        &self.layout
    }

    /// The paint layer tree.
    pub fn layers(&self) -> &LayerTree {
        &self.layers
    }

    /// The viewport state.
    pub fn view(&self) -> &FrameView {
        &self.view
    }

    /// Whether a layer of this frame paints into its own compositor backing.
    ///
    /// The main frame is always composited.
    pub fn is_composited(&self) -> bool {
        self.composited
    }

    /// The root layer.
    pub fn root_layer(&self) -> LayerId {
        self.layers.root()
    }

    /// The scrollable area scrolling the document.
    pub fn root_scrollable_area(&self) -> Option<&LayerScrollableArea> {
        self.layers.layer(self.layers.root()).scrollable_area()
    }

    /// The size of the viewport.
    pub fn viewport_size(&self) -> Size {
        self.layout.layout_box(self.layout.root()).size
    }

    /// Whether a box of this frame paints a fixed background.
    pub fn has_background_attachment_fixed_objects(&self) -> bool {
        self.layout
            .iter()
            .any(|layout_box| layout_box.style.background_attachment_fixed)
    }

    /// Plugins that consume wheel events.
    pub fn wheel_event_plugins(&self) -> impl Iterator<Item = &LayoutBox> + '_ {
        self.layout.iter().filter(|layout_box| {
            matches!(
                layout_box.kind,
                BoxKind::Plugin {
                    wants_wheel_events: true
                }
            )
        })
    }
}

// --- MARK: BOXES
impl Frame {
    /// Inserts a new leaf box, and a layer for it if it needs one.
    pub(crate) fn insert_box(
        &mut self,
        parent: BoxId,
        before: Option<BoxId>,
        kind: BoxKind,
        location: Point,
        size: Size,
        style: BoxStyle,
    ) -> BoxId {
        let id = self.layout.insert(parent, before, kind, location, size, style);
        if let Some(layer_type) = self.layout.layout_box(id).layer_type_required() {
            self.create_layer(id, layer_type);
        } else {
            self.mark_enclosing_layer(id);
        }
        id
    }

    /// Connects a frame owner box with the frame it hosts.
    pub(crate) fn attach_child_frame(&mut self, owner: BoxId, child: FrameId) {
        let layout_box = self.layout.layout_box_mut(owner);
        layout_box.child_frame = Some(child);
        if let Some(layer) = layout_box.layer {
            self.layers.layer_mut(layer).child_frame = Some(child);
        }
        self.children.push(child);
    }

    /// Removes a box with its subtree and their layers.
    pub(crate) fn remove_box(&mut self, id: BoxId) -> DetachedContent {
        if id == self.layout.root() {
            debug_panic!("Cannot remove the root box of {}", self.id);
            return DetachedContent::default();
        }
        let boxes: Vec<BoxId> = std::iter::once(id)
            .chain(self.layout.descendants(id))
            .collect();
        let layers: Vec<LayerId> = boxes
            .iter()
            .filter_map(|box_id| self.layout.layout_box(*box_id).layer)
            .collect();
        for layer in &layers {
            self.unregister_viewport_constrained(*layer);
        }
        if self.layout.layout_box(id).layer.is_none() {
            self.mark_enclosing_layer(id);
        }

        let mut detached = DetachedContent::default();
        for layout_box in self.layout.remove_subtree(id) {
            if let Some(frame) = layout_box.child_frame {
                self.children.retain(|child| *child != frame);
                detached.frames.push(frame);
            }
        }
        for layer in layers {
            // Descendant layers go away with their ancestor.
            if self.layers.contains(layer) {
                detached.layers.extend(self.layers.remove_child(layer));
            }
        }
        trace!(
            frame = self.id.trace(),
            layers = detached.layers.len(),
            "Removed box {id}"
        );
        detached
    }

    /// Replaces the style of a box, creating or destroying its layer as needed.
    ///
    /// Returns the destroyed layer, if any.
    pub(crate) fn set_style(&mut self, id: BoxId, style: BoxStyle) -> Option<PaintLayer> {
        let layout_box = self.layout.layout_box_mut(id);
        if layout_box.style == style {
            return None;
        }
        layout_box.style = style;
        let required = layout_box.layer_type_required();
        match (layout_box.layer, required) {
            (None, None) => {
                self.mark_enclosing_layer(id);
                None
            }
            (None, Some(layer_type)) => {
                self.create_layer(id, layer_type);
                None
            }
            (Some(layer), None) => self.destroy_layer(id, layer),
            (Some(layer), Some(layer_type)) => {
                self.update_layer_style(id, layer, layer_type);
                None
            }
        }
    }

    /// Moves and resizes a box.
    pub(crate) fn set_geometry(&mut self, id: BoxId, location: Point, size: Size) {
        let layout_box = self.layout.layout_box_mut(id);
        if layout_box.location == location && layout_box.size == size {
            return;
        }
        layout_box.location = location;
        layout_box.size = size;
        layout_box.overflow_size = layout_box.overflow_size.max(size);
        self.mark_enclosing_layer(id);
    }

    /// Sets the size of the scrollable content of a box.
    pub(crate) fn set_overflow_size(&mut self, id: BoxId, overflow_size: Size) {
        let layout_box = self.layout.layout_box_mut(id);
        layout_box.overflow_size = overflow_size.max(layout_box.size);
        self.mark_enclosing_layer(id);
    }

    /// Sets the touch-responsive rects of a box, in local coordinates.
    pub(crate) fn set_hit_rects(&mut self, id: BoxId, hit_rects: SmallVec<[Rect; 1]>) {
        self.layout.layout_box_mut(id).hit_rects = hit_rects;
    }

    /// Resizes the viewport.
    pub(crate) fn set_viewport_size(&mut self, size: Size) {
        let root = self.layout.root();
        self.set_geometry(root, Point::ORIGIN, size);
    }

    pub(crate) fn set_throttled(&mut self, throttled: bool) {
        self.view.throttled = throttled;
    }

    fn mark_enclosing_layer(&mut self, id: BoxId) {
        if let Some(layer) = self.layout.enclosing_layer(id) {
            self.layers.set_needs_compositing_inputs_update(layer);
        }
    }
}

// --- MARK: LAYERS
impl Frame {
    fn create_layer(&mut self, box_id: BoxId, layer_type: LayerType) {
        let Some(parent_box) = self.layout.parent(box_id) else {
            debug_panic!("The root box of {} already has a layer", self.id);
            return;
        };
        let Some(parent_layer) = self.layout.enclosing_layer(parent_box) else {
            debug_panic!("{parent_box} has no enclosing layer");
            return;
        };
        let layout_box = self.layout.layout_box(box_id);
        let mut layer = PaintLayer::new(
            self.id,
            box_id,
            layout_box.kind,
            layer_type,
            layout_box.style.clone(),
            layout_box.size,
        );
        layer.child_frame = layout_box.child_frame;
        if layout_box.style.has_overflow_clip() {
            layer.scrollable_area = Some(self.new_scrollable_area(layer.id(), layout_box));
        }
        let is_fixed = layout_box.style.position == Position::Fixed;

        let before = self.find_next_layer(parent_layer, box_id);
        let id = self.layers.add_child(parent_layer, before, layer);
        self.layout.layout_box_mut(box_id).layer = Some(id);

        // Layers of descendant boxes now belong under the new layer.
        let adopted: Vec<LayerId> = self
            .layers
            .children(parent_layer)
            .filter(|child| {
                *child != id
                    && self
                        .layout
                        .is_descendant_of(self.layers.layer(*child).box_id(), box_id)
            })
            .collect();
        for child in adopted {
            self.layers.move_child(child, id, None);
        }

        if is_fixed {
            self.view.viewport_constrained.insert(id);
        }
        trace!(frame = self.id.trace(), "Created {id} for {box_id}");
    }

    fn destroy_layer(&mut self, box_id: BoxId, id: LayerId) -> Option<PaintLayer> {
        self.unregister_viewport_constrained(id);
        self.layout.layout_box_mut(box_id).layer = None;
        let layer = self.layers.remove_only_this_layer(id);
        trace!(frame = self.id.trace(), "Destroyed {id} of {box_id}");
        layer
    }

    fn update_layer_style(&mut self, box_id: BoxId, id: LayerId, layer_type: LayerType) {
        let layout_box = self.layout.layout_box(box_id);
        let style = layout_box.style.clone();
        let new_area = (style.has_overflow_clip()
            && self.layers.layer(id).scrollable_area.is_none())
        .then(|| self.new_scrollable_area(id, layout_box));

        let layer = self.layers.layer_mut(id);
        let was_stacked = layer.is_stacked();
        let was_stacking_context = layer.is_stacking_context();
        let old_z_index = layer.z_index();
        let old_position = layer.style.position;
        layer.style = style;
        layer.layer_type = layer_type;

        if !layer.is_root {
            if !layer.style.has_overflow_clip() {
                layer.scrollable_area = None;
            } else if let Some(area) = layer.scrollable_area.as_mut() {
                area.state.user_scrollable_x = layer.style.overflow_x.is_user_scrollable();
                area.state.user_scrollable_y = layer.style.overflow_y.is_user_scrollable();
            } else {
                layer.scrollable_area = new_area;
            }
        }

        let position = layer.style.position;
        let stacking_changed = was_stacked != layer.is_stacked()
            || was_stacking_context != layer.is_stacking_context()
            || old_z_index != layer.z_index();
        if was_stacking_context != layer.is_stacking_context() {
            layer.stacking.dirty_z_order_lists();
        }
        if stacking_changed {
            self.layers.dirty_stacking_context_z_order_lists(id);
        }

        if old_position != position {
            if old_position == Position::Sticky || old_position == Position::Fixed {
                self.unregister_viewport_constrained(id);
            }
            if position == Position::Fixed {
                self.view.viewport_constrained.insert(id);
            }
        }
        self.layers.set_needs_compositing_inputs_update(id);
    }

    fn new_scrollable_area(&self, layer: LayerId, layout_box: &LayoutBox) -> LayerScrollableArea {
        let mut area = LayerScrollableArea::new(layer, layout_box.size, layout_box.overflow_size);
        area.state.user_scrollable_x = layout_box.style.overflow_x.is_user_scrollable();
        area.state.user_scrollable_y = layout_box.style.overflow_y.is_user_scrollable();
        area.state.scroll_animator_enabled = self.scroll_animator_enabled;
        area
    }

    /// Forgets a layer as a viewport-constrained or sticky object.
    fn unregister_viewport_constrained(&mut self, id: LayerId) {
        self.view.viewport_constrained.remove(&id);
        let layer = self.layers.layer_mut(id);
        layer.sticky_offset = Vec2::ZERO;
        let Some(overflow_layer) = layer.ancestor_overflow_layer() else {
            return;
        };
        if let Some(area) = self
            .layers
            .get_mut(overflow_layer)
            .and_then(PaintLayer::scrollable_area_mut)
        {
            area.sticky_constraints.remove(&id);
        }
    }

    /// The layer a new layer for `box_id` must be inserted before, among the children of
    /// `parent_layer`: the first one whose box follows `box_id` in layout order.
    fn find_next_layer(&self, parent_layer: LayerId, box_id: BoxId) -> Option<LayerId> {
        let parent_box = self.layers.layer(parent_layer).box_id();
        let mut after_box = false;
        for candidate in self.layout.descendants(parent_box) {
            if candidate == box_id {
                after_box = true;
                continue;
            }
            if !after_box || self.layout.is_descendant_of(candidate, box_id) {
                continue;
            }
            if let Some(layer) = self.layout.layout_box(candidate).layer {
                if self.layers.parent(layer) == Some(parent_layer) {
                    return Some(layer);
                }
            }
        }
        None
    }
}

/// Every frame of a page.
#[derive(Debug)]
pub struct FrameTree {
    frames: HashMap<FrameId, Frame>,
    main: FrameId,
}

impl FrameTree {
    pub(crate) fn new(main: Frame) -> Self {
        let id = main.id();
        let mut frames = HashMap::new();
        frames.insert(id, main);
        Self { frames, main: id }
    }

    /// The main frame.
    pub fn main_frame(&self) -> FrameId {
        self.main
    }

    /// The number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`: a page has at least its main frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the frame with the given id.
    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&id)
    }

    /// Returns the frame with the given id.
    ///
    /// ## Panics
    ///
    /// If there is no such frame.
    #[track_caller]
    pub fn frame(&self, id: FrameId) -> &Frame {
        self.get(id)
            .unwrap_or_else(|| panic!("{id} not found in page"))
    }

    #[track_caller]
    pub(crate) fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("{id} not found in page"))
    }

    /// Every frame id, parents before children.
    pub fn ids(&self) -> Vec<FrameId> {
        let mut ids = Vec::with_capacity(self.frames.len());
        let mut stack = vec![self.main];
        while let Some(id) = stack.pop() {
            ids.push(id);
            if let Some(frame) = self.get(id) {
                stack.extend(frame.children.iter().rev().copied());
            }
        }
        ids
    }

    /// The frame and layer hosting a child frame.
    pub fn owner_layer(&self, id: FrameId) -> Option<(FrameId, LayerId)> {
        let frame = self.get(id)?;
        let parent = self.get(frame.parent?)?;
        let layer = parent.layout.get(frame.owner_box?)?.layer()?;
        Some((parent.id(), layer))
    }

    pub(crate) fn insert(&mut self, frame: Frame) {
        self.frames.insert(frame.id(), frame);
    }

    /// Removes a frame and the frames it hosts.
    pub(crate) fn remove(&mut self, id: FrameId) -> Vec<Frame> {
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(frame) = self.frames.remove(&id) {
                stack.extend(frame.children.iter().copied());
                removed.push(frame);
            }
        }
        removed
    }
}
