// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use kurbo::{Affine, Insets, Point, Rect, Vec2};
use tree_arena::TreeArena;

use crate::core::{BoxKind, CompositingState, FrameId, LayerId, PaintLayer, Position};

/// The paint layer tree of one frame.
///
/// The tree is sparse: it only has a layer for the boxes of the layout tree that need one,
/// and a layer's parent is the layer of the nearest ancestor box that has one.
/// The root layer belongs to the frame's root box and is never removed.
#[derive(Debug)]
pub struct LayerTree {
    layers: TreeArena<PaintLayer>,
    root: LayerId,
    frame: FrameId,
}

// --- MARK: QUERIES
impl LayerTree {
    pub(crate) fn new(root: PaintLayer) -> Self {
        let root_id = root.id;
        let frame = root.frame;
        let mut layers = TreeArena::new();
        layers.insert_root(root_id, root);
        Self {
            layers,
            root: root_id,
            frame,
        }
    }

    /// The root layer.
    pub fn root(&self) -> LayerId {
        self.root
    }

    /// The frame this tree belongs to.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// The number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if the tree only has its root layer.
    pub fn is_empty(&self) -> bool {
        self.layers.len() <= 1
    }

    /// Returns `true` if the layer is part of this tree.
    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains(id)
    }

    /// Returns the layer with the given id.
    pub fn get(&self, id: LayerId) -> Option<&PaintLayer> {
        self.layers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: LayerId) -> Option<&mut PaintLayer> {
        self.layers.get_mut(id)
    }

    /// Returns the layer with the given id.
    ///
    /// ## Panics
    ///
    /// If the layer isn't in the tree.
    #[track_caller]
    pub fn layer(&self, id: LayerId) -> &PaintLayer {
        self.get(id)
            .unwrap_or_else(|| panic!("{id} not found in layer tree"))
    }

    #[track_caller]
    pub(crate) fn layer_mut(&mut self, id: LayerId) -> &mut PaintLayer {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("{id} not found in layer tree"))
    }

    /// The parent layer, if any.
    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.layers.parent_of(id).map(LayerId::from_node)
    }

    /// The children of a layer, in paint-tree order.
    pub fn children(&self, id: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.children(id).map(LayerId::from_node)
    }

    /// The first child of a layer.
    pub fn first_child(&self, id: LayerId) -> Option<LayerId> {
        self.layers.first_child(id).map(LayerId::from_node)
    }

    /// The next sibling of a layer.
    pub fn next_sibling(&self, id: LayerId) -> Option<LayerId> {
        self.layers.next_sibling(id).map(LayerId::from_node)
    }

    /// The strict ancestors of a layer, from its parent up to the root.
    pub fn ancestors(&self, id: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.ancestors(id).map(LayerId::from_node)
    }

    /// The strict descendants of a layer, in pre-order.
    pub fn descendants(&self, id: LayerId) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.descendants(id).map(LayerId::from_node)
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: LayerId, id: LayerId) -> bool {
        self.layers.is_ancestor_of(ancestor, id)
    }

    /// Every layer, in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &PaintLayer> + '_ {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .filter_map(|id| self.get(id))
    }

    /// Every layer id, in pre-order.
    pub fn ids(&self) -> Vec<LayerId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .collect()
    }
}

// --- MARK: STRUCTURE
impl LayerTree {
    /// Inserts a new layer as a child of `parent`, before `before` (or last).
    pub(crate) fn add_child(
        &mut self,
        parent: LayerId,
        before: Option<LayerId>,
        layer: PaintLayer,
    ) -> LayerId {
        let id = layer.id;
        self.layers
            .insert_child(parent, before.map(Into::into), id, layer);
        self.did_attach(id);
        id
    }

    /// Moves an attached layer (with its subtree) under a new parent.
    pub(crate) fn move_child(&mut self, id: LayerId, new_parent: LayerId, before: Option<LayerId>) {
        self.will_detach(id);
        self.layers.detach(id);
        self.layers.attach(id, new_parent, before.map(Into::into));
        self.did_attach(id);
    }

    /// Removes a layer and its subtree.
    ///
    /// Returns the removed layers, in pre-order.
    pub(crate) fn remove_child(&mut self, id: LayerId) -> Vec<PaintLayer> {
        if id == self.root {
            debug_panic!("Cannot remove the root layer of {}", self.frame);
            return Vec::new();
        }
        self.will_detach(id);
        self.layers
            .remove_subtree(id)
            .into_iter()
            .map(|(_, layer)| layer)
            .collect()
    }

    /// Removes a single layer, moving its children into its place.
    pub(crate) fn remove_only_this_layer(&mut self, id: LayerId) -> Option<PaintLayer> {
        let parent = self.parent(id)?;
        let next = self.next_sibling(id);
        let children: Vec<LayerId> = self.children(id).collect();
        for child in children {
            self.move_child(child, parent, next);
        }
        self.remove_child(id).into_iter().next()
    }

    fn did_attach(&mut self, id: LayerId) {
        let layer = self.layer(id);
        if layer.is_stacked() || self.first_child(id).is_some() {
            self.dirty_stacking_context_z_order_lists(id);
        }
        self.set_needs_compositing_inputs_update(id);
    }

    fn will_detach(&mut self, id: LayerId) {
        let layer = self.layer(id);
        if layer.is_stacked() || self.first_child(id).is_some() {
            self.dirty_stacking_context_z_order_lists(id);
        }
        if let Some(parent) = self.parent(id) {
            self.set_needs_compositing_inputs_update(parent);
        }
        // Pagination is recomputed from the new ancestors on the next position update.
        let subtree: Vec<LayerId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for layer in subtree {
            self.layer_mut(layer).enclosing_pagination_layer = None;
        }
    }
}

// --- MARK: DIRTY BITS
impl LayerTree {
    /// Marks a layer as needing its ancestor-dependent compositing inputs recomputed.
    ///
    /// Every ancestor learns that a descendant needs an update.
    pub(crate) fn set_needs_compositing_inputs_update(&mut self, id: LayerId) {
        let layer = self.layer_mut(id);
        layer.needs_compositing_inputs_update = true;
        layer.child_needs_compositing_inputs_update = true;
        // A freshly attached subtree may carry its own bits, so start above it.
        let mut current = self.parent(id);
        while let Some(layer_id) = current {
            let layer = self.layer_mut(layer_id);
            if layer.child_needs_compositing_inputs_update {
                break;
            }
            layer.child_needs_compositing_inputs_update = true;
            current = self.parent(layer_id);
        }
    }
}

// --- MARK: ANCESTORS
impl LayerTree {
    /// The nearest ancestor that establishes a stacking context.
    pub fn ancestor_stacking_context(&self, id: LayerId) -> Option<LayerId> {
        self.ancestors(id)
            .find(|ancestor| self.layer(*ancestor).is_stacking_context())
    }

    /// The layer this layer is composited under: its stacking context if stacked,
    /// its parent otherwise.
    pub fn compositing_container(&self, id: LayerId) -> Option<LayerId> {
        if self.layer(id).is_stacked() {
            self.ancestor_stacking_context(id)
        } else {
            self.parent(id)
        }
    }

    /// The layer whose coordinate space this layer's location is expressed in.
    ///
    /// For out-of-flow layers this skips ancestors that can't contain them. The boolean is
    /// `true` if `ancestor` was among the skipped layers.
    pub fn containing_layer(
        &self,
        id: LayerId,
        ancestor: Option<LayerId>,
    ) -> (Option<LayerId>, bool) {
        let layer = self.layer(id);
        let position = layer.style.position;
        if !position.is_out_of_flow() && !layer.style.is_floating {
            return (self.parent(id), false);
        }
        let can_contain = |candidate: &PaintLayer| match position {
            Position::Fixed => {
                candidate.is_root || candidate.style.can_contain_fixed_position_objects()
            }
            Position::Absolute => {
                candidate.is_root || candidate.style.can_contain_absolute_position_objects()
            }
            // Floats skip inline ancestors.
            _ => candidate.kind != BoxKind::Inline,
        };

        let mut skipped_ancestor = false;
        let mut current = self.parent(id);
        while let Some(candidate) = current {
            if can_contain(self.layer(candidate)) {
                break;
            }
            if Some(candidate) == ancestor {
                skipped_ancestor = true;
            }
            current = self.parent(candidate);
        }
        (current, skipped_ancestor)
    }

    /// The nearest layer on the containing block chain.
    pub(crate) fn parent_layer_on_containing_block_chain(&self, id: LayerId) -> Option<LayerId> {
        self.containing_layer(id, None).0
    }

    /// The nearest layer on the chain of boxes whose clips apply to this layer.
    ///
    /// The legacy `clip` property applies to fixed-position descendants even when the
    /// clipping box isn't their containing block.
    pub(crate) fn parent_layer_on_clipping_container_chain(&self, id: LayerId) -> Option<LayerId> {
        if self.layer(id).style.position != Position::Fixed {
            return self.parent_layer_on_containing_block_chain(id);
        }
        self.ancestors(id).find(|ancestor| {
            let ancestor = self.layer(*ancestor);
            ancestor.is_root
                || ancestor.style.can_contain_fixed_position_objects()
                || ancestor.style.has_clip()
        })
    }

    /// This layer or the nearest ancestor that paints its own content.
    pub fn enclosing_self_painting_layer(&self, id: LayerId) -> LayerId {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|candidate| self.layer(*candidate).is_self_painting_layer())
            .unwrap_or(self.root)
    }

    /// Returns `true` if neither the layer nor any descendant is visible.
    pub fn subtree_is_invisible(&self, id: LayerId) -> bool {
        std::iter::once(id)
            .chain(self.descendants(id))
            .all(|layer| !self.layer(layer).style.visible)
    }
}

// --- MARK: GEOMETRY
impl LayerTree {
    /// The scroll offset of the root layer.
    pub fn root_scroll_offset(&self) -> Vec2 {
        self.layer(self.root).scroll_offset()
    }

    /// Converts a point from the coordinate space of `id` to that of `ancestor`.
    ///
    /// `None` stands for the coordinate space of the document, i.e. the root layer.
    /// Only offsets are accumulated: transforms are ignored, see
    /// [`transform_to_ancestor`](Self::transform_to_ancestor) for that.
    pub fn convert_to_layer_coords(
        &self,
        id: LayerId,
        ancestor: Option<LayerId>,
        point: Point,
    ) -> Point {
        if Some(id) == ancestor {
            return point;
        }
        let mut offset = Vec2::ZERO;
        let mut current = Some(id);
        while let Some(layer) = current {
            if Some(layer) == ancestor {
                break;
            }
            current = self.accumulate_offset_towards_ancestor(layer, ancestor, &mut offset);
        }
        point + offset
    }

    /// Adds the offset from `id` to the next layer on the way to `ancestor`, and returns
    /// that layer.
    fn accumulate_offset_towards_ancestor(
        &self,
        id: LayerId,
        ancestor: Option<LayerId>,
        offset: &mut Vec2,
    ) -> Option<LayerId> {
        let layer = self.layer(id);
        let (containing, skipped_ancestor) = self.containing_layer(id, ancestor);

        if layer.style.position == Position::Fixed
            && containing == Some(self.root)
            && (ancestor.is_none() || ancestor == Some(self.root))
        {
            // Fixed layers are positioned in viewport space.
            *offset += layer.location.to_vec2() + self.root_scroll_offset();
            return ancestor;
        }

        if let (true, Some(ancestor), Some(containing)) = (skipped_ancestor, ancestor, containing) {
            // `ancestor` lies between this layer and its containing layer, so go through
            // the containing layer and subtract the ancestor's own offset.
            let this_coords = self.convert_to_layer_coords(id, Some(containing), Point::ORIGIN);
            let ancestor_coords =
                self.convert_to_layer_coords(ancestor, Some(containing), Point::ORIGIN);
            *offset += this_coords - ancestor_coords;
            return Some(ancestor);
        }

        let parent = containing?;
        *offset += layer.location.to_vec2();
        Some(parent)
    }

    /// The transform from this layer's space to its containing layer's space.
    pub fn local_transform(&self, id: LayerId) -> Affine {
        let layer = self.layer(id);
        let mut offset = layer.location.to_vec2();
        if layer.style.position == Position::Fixed
            && self.containing_layer(id, None).0 == Some(self.root)
        {
            offset += self.root_scroll_offset();
        }
        let transform = layer
            .style
            .transform
            .map_or(Affine::IDENTITY, |transform| transform.affine);
        Affine::translate(offset) * transform
    }

    /// The transform from this layer's space to that of `ancestor` (or the document, if `None`).
    pub fn transform_to_ancestor(&self, id: LayerId, ancestor: Option<LayerId>) -> Affine {
        let mut transform = Affine::IDENTITY;
        let mut current = id;
        loop {
            if Some(current) == ancestor {
                return transform;
            }
            let (containing, skipped_ancestor) = self.containing_layer(current, ancestor);
            transform = self.local_transform(current) * transform;
            match (skipped_ancestor, ancestor, containing) {
                (true, Some(ancestor), Some(containing)) => {
                    let ancestor_to_containing =
                        self.transform_to_ancestor(ancestor, Some(containing));
                    return ancestor_to_containing.inverse() * transform;
                }
                (_, _, Some(containing)) => current = containing,
                (_, None, None) => return transform,
                (_, Some(ancestor), None) => {
                    // `ancestor` isn't on the containing chain: go through the document.
                    return self.transform_to_ancestor(ancestor, None).inverse() * transform;
                }
            }
        }
    }

    /// The transform from this layer's space to the document.
    pub fn absolute_transform(&self, id: LayerId) -> Affine {
        self.transform_to_ancestor(id, None)
    }

    /// The border box of the layer, mapped to the document.
    pub fn absolute_bounding_box(&self, id: LayerId) -> Rect {
        self.absolute_transform(id)
            .transform_rect_bbox(self.layer(id).physical_bounding_box())
    }

    /// The area painted into the backing of `ancestor` by this layer and its stacking
    /// children, in `ancestor`'s coordinates.
    ///
    /// The layer's own transform is applied unless `ancestor` is the layer itself.
    /// Composited stacking children are left out, since they paint into their own backing.
    pub fn bounding_box_for_compositing(&self, id: LayerId, ancestor: LayerId) -> Rect {
        let layer = self.layer(id);
        if !layer.is_self_painting_layer() {
            return Rect::ZERO;
        }
        if id != ancestor && self.subtree_is_invisible(id) {
            return Rect::ZERO;
        }
        if layer.is_root {
            return layer.physical_bounding_box();
        }

        let mut result = layer.physical_bounding_box();
        if !layer.has_overflow_clip() {
            self.expand_rect_for_stacking_children(id, &mut result, false);
            if let Some(clip_path) = layer.style.clip_path {
                result = result.intersect(clip_path);
            }
            if let Some(clip) = layer.style.clip.filter(|_| layer.style.has_clip()) {
                result = result.intersect(clip);
            }
            if let Some(outsets) = layer.style.filter_outsets {
                result = result + outsets;
            }
        }
        if id != ancestor {
            if let Some(transform) = layer.style.transform {
                result = transform.affine.transform_rect_bbox(result);
            }
        }
        let delta = self.convert_to_layer_coords(id, Some(ancestor), Point::ORIGIN);
        result + delta.to_vec2()
    }

    /// The bounds used to test this layer for overlap, in local coordinates.
    ///
    /// Only filters that move pixels make the children part of the overlap bounds.
    pub fn bounding_box_for_compositing_overlap_test(&self, id: LayerId) -> Rect {
        let layer = self.layer(id);
        if layer.style.filter_outsets.is_some_and(|outsets| outsets != Insets::ZERO) {
            self.bounding_box_for_compositing(id, id)
        } else {
            layer.physical_bounding_box()
        }
    }

    /// The union of the layer's border box and those of its stacking children, translated
    /// by `offset_from_root`.
    pub fn physical_bounding_box_including_stacking_children(
        &self,
        id: LayerId,
        offset_from_root: Vec2,
    ) -> Rect {
        let mut result = self.layer(id).physical_bounding_box();
        self.expand_rect_for_stacking_children(id, &mut result, true);
        result + offset_from_root
    }

    fn expand_rect_for_stacking_children(
        &self,
        id: LayerId,
        result: &mut Rect,
        include_composited: bool,
    ) {
        for child in self.stacking_children(id) {
            if !include_composited
                && self.layer(child).compositing_state != CompositingState::NotComposited
            {
                continue;
            }
            let child_box = self.bounding_box_for_compositing(child, id);
            if child_box.is_zero_area() {
                continue;
            }
            *result = if result.is_zero_area() {
                child_box
            } else {
                result.union(child_box)
            };
        }
    }
}
