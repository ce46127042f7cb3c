// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The compositing inputs pass: recomputes ancestor-dependent inputs top-down.
//!
//! Only subtrees holding a dirty layer are visited, and a dirty layer forces the
//! recomputation of its whole subtree. Every back-reference written here is a pure
//! function of the walk, so stale references heal on the next update.

use kurbo::{Affine, Rect, Size};
use tracing::info_span;

use crate::app::Frame;
use crate::core::{
    AncestorDependentCompositingInputs, GeometryMap, LayerId, LayerRef, Position,
};
use crate::passes::enter_span_if;
use crate::passes::layer_positions::{compute_sticky_constraints, update_layer_position};
use crate::util::enclosing_int_rect;

/// Proof that the caller is the compositing inputs update.
///
/// Ancestor-dependent fields of [`PaintLayer`](crate::core::PaintLayer) can only be
/// written with one.
#[derive(Debug)]
pub(crate) struct InputsUpdateToken(());

/// What the walk knows about the ancestors of the layer it visits.
#[derive(Clone, Copy, Debug, Default)]
struct AncestorInfo {
    ancestor_stacking_context: Option<LayerId>,
    last_overflow_clip_layer: Option<LayerId>,
    last_scrolling_ancestor: Option<LayerId>,
    has_ancestor_with_clip_related_property: bool,
    has_ancestor_with_clip_path: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UpdateType {
    DoNotForceUpdate,
    ForceUpdate,
}

struct CompositingInputsUpdater<'a> {
    frame: &'a mut Frame,
    geometry_map: GeometryMap,
    token: InputsUpdateToken,
    trace: bool,
}

pub(crate) fn run_compositing_inputs_pass(frame: &mut Frame, trace: bool) {
    let _span = info_span!("compositing_inputs", frame = frame.id().trace()).entered();
    let root = frame.layers.root();
    if !frame.layers.layer(root).child_needs_compositing_inputs_update() {
        return;
    }
    let mut updater = CompositingInputsUpdater {
        frame,
        geometry_map: GeometryMap::new(),
        token: InputsUpdateToken(()),
        trace,
    };
    updater.update_recursive(root, UpdateType::DoNotForceUpdate, AncestorInfo::default());
    debug_assert!(
        updater.geometry_map.is_empty(),
        "Geometry map pushes and pops must balance"
    );
}

impl CompositingInputsUpdater<'_> {
    fn update_recursive(
        &mut self,
        id: LayerId,
        mut update_type: UpdateType,
        mut info: AncestorInfo,
    ) {
        let layer = self.frame.layers.layer(id);
        if !layer.child_needs_compositing_inputs_update()
            && update_type != UpdateType::ForceUpdate
        {
            return;
        }
        let _span = enter_span_if(self.trace, layer);

        let previous_overflow_layer = layer.ancestor_overflow_layer();
        let needs_update = layer.needs_compositing_inputs_update();
        let is_sticky = layer.style().position == Position::Sticky;
        self.frame
            .layers
            .layer_mut(id)
            .update_ancestor_overflow_layer(info.last_overflow_clip_layer, &self.token);
        if let (true, Some(scroller)) = (is_sticky, info.last_overflow_clip_layer) {
            if needs_update || update_type == UpdateType::ForceUpdate {
                // The sticky offset depends on the scroller, so this comes before positioning.
                self.update_sticky_registration(id, previous_overflow_layer, scroller);
            }
        }

        let key = LayerRef::new(self.frame.id(), id);
        match self.frame.layers.parent(id) {
            Some(parent) => {
                let to_parent = self.frame.layers.transform_to_ancestor(id, Some(parent));
                self.geometry_map.push(key, to_parent);
            }
            None => self.geometry_map.push_root(key, Affine::IDENTITY),
        }

        if needs_update {
            update_type = UpdateType::ForceUpdate;
        }
        if update_type == UpdateType::ForceUpdate {
            let inputs = self.compute_inputs(id, &info);
            self.frame
                .layers
                .layer_mut(id)
                .update_ancestor_dependent_compositing_inputs(inputs, &self.token);
        }

        let layer = self.frame.layers.layer(id);
        if layer.is_stacking_context() {
            info.ancestor_stacking_context = Some(id);
        }
        if layer.is_root() || layer.has_overflow_clip() {
            info.last_overflow_clip_layer = Some(id);
        }
        if layer.scrolls_overflow() {
            info.last_scrolling_ancestor = Some(id);
        }
        if layer.has_clip_related_property() {
            info.has_ancestor_with_clip_related_property = true;
        }
        if layer.style().clip_path.is_some() {
            info.has_ancestor_with_clip_path = true;
        }

        let children: Vec<LayerId> = self.frame.layers.children(id).collect();
        for child in children {
            self.update_recursive(child, update_type, info);
        }

        self.frame
            .layers
            .layer_mut(id)
            .did_update_compositing_inputs(&self.token);
        self.geometry_map.pop(key);
    }

    /// Moves the sticky constraints of a layer to its current ancestor overflow layer.
    fn update_sticky_registration(
        &mut self,
        id: LayerId,
        previous_scroller: Option<LayerId>,
        scroller: LayerId,
    ) {
        let root = self.frame.layers.root();
        if previous_scroller != Some(scroller) {
            if let Some(area) = previous_scroller
                .and_then(|previous| self.frame.layers.get_mut(previous))
                .and_then(|previous| previous.scrollable_area_mut())
            {
                area.sticky_constraints.remove(&id);
            }
        }
        // Sticky layers are viewport constrained while they stick to the document.
        if scroller == root {
            self.frame.view.viewport_constrained.insert(id);
        } else {
            self.frame.view.viewport_constrained.remove(&id);
        }

        let constraints = compute_sticky_constraints(self.frame, id, scroller);
        if let Some(area) = self.frame.layers.layer_mut(scroller).scrollable_area_mut() {
            match constraints {
                Some(constraints) => {
                    area.sticky_constraints.insert(id, constraints);
                }
                None => {
                    area.sticky_constraints.remove(&id);
                }
            }
        }
        update_layer_position(self.frame, id);
    }

    fn compute_inputs(
        &self,
        id: LayerId,
        info: &AncestorInfo,
    ) -> AncestorDependentCompositingInputs {
        let layers = &self.frame.layers;
        let layer = layers.layer(id);
        let mut inputs = AncestorDependentCompositingInputs::default();

        let overlap_box = layers.bounding_box_for_compositing_overlap_test(id);
        let mut unclipped = enclosing_int_rect(self.geometry_map.absolute_rect(overlap_box));
        // Empty layers still take part in overlap testing.
        if unclipped.is_zero_area() {
            unclipped = Rect::from_origin_size(unclipped.origin(), Size::new(1.0, 1.0));
        }
        inputs.unclipped_absolute_bounding_box = unclipped;
        inputs.clipped_absolute_bounding_box = unclipped;

        let Some(parent) = layers.parent(id) else {
            return inputs;
        };
        let parent_layer = layers.layer(parent);
        let parent_inputs = parent_layer.ancestor_inputs_unchecked();

        inputs.opacity_ancestor = if parent_layer.is_transparent() {
            Some(parent)
        } else {
            parent_inputs.opacity_ancestor
        };
        inputs.transform_ancestor = if parent_layer.style().has_transform_related_property() {
            Some(parent)
        } else {
            parent_inputs.transform_ancestor
        };
        inputs.filter_ancestor = if parent_layer.style().has_filter() {
            Some(parent)
        } else {
            parent_inputs.filter_ancestor
        };
        inputs.nearest_fixed_position_layer = if layer.style().position == Position::Fixed {
            Some(id)
        } else {
            parent_inputs.nearest_fixed_position_layer
        };

        if info.has_ancestor_with_clip_related_property {
            if let Some(clipping_parent) = layers.parent_layer_on_clipping_container_chain(id) {
                let clipping_parent_layer = layers.layer(clipping_parent);
                inputs.clipping_container = if clipping_parent_layer.has_clip_related_property() {
                    Some(clipping_parent)
                } else {
                    clipping_parent_layer.ancestor_inputs_unchecked().clipping_container
                };
            }
        }
        inputs.clipped_absolute_bounding_box =
            self.clip_to_containers(unclipped, inputs.clipping_container);

        if info.last_scrolling_ancestor.is_some() {
            if let Some(containing) = layers.parent_layer_on_containing_block_chain(id) {
                let containing_layer = layers.layer(containing);
                inputs.ancestor_scrolling_layer = if containing_layer.scrolls_overflow() {
                    Some(containing)
                } else {
                    containing_layer.ancestor_inputs_unchecked().ancestor_scrolling_layer
                };
            }
            if let (true, Some(scroller), Some(stacking_context)) = (
                layer.is_stacked(),
                inputs.ancestor_scrolling_layer,
                info.ancestor_stacking_context,
            ) {
                // Scrolled by a layer that isn't one of its compositing ancestors.
                if !self.is_inclusive_ancestor(scroller, stacking_context) {
                    inputs.scroll_parent = Some(scroller);
                }
            }
        }

        if layer.style().position.is_out_of_flow() && !layers.subtree_is_invisible(id) {
            let clipping_layer = inputs.clipping_container.unwrap_or(layers.root());
            if self.has_clipped_stacking_ancestor(id, clipping_layer) {
                inputs.clip_parent = Some(clipping_layer);
            }
        }

        inputs.has_ancestor_with_clip_path = info.has_ancestor_with_clip_path;
        inputs
    }

    /// Intersects an absolute rect with the clips of a chain of clipping containers.
    fn clip_to_containers(&self, rect: Rect, mut container: Option<LayerId>) -> Rect {
        let layers = &self.frame.layers;
        let mut clipped = rect;
        while let Some(current) = container {
            let current_layer = layers.layer(current);
            if let Some(clip) = current_layer.clip_rect() {
                let absolute_clip = layers.absolute_transform(current).transform_rect_bbox(clip);
                clipped = clipped.intersect(absolute_clip);
            }
            container = current_layer.ancestor_inputs_unchecked().clipping_container;
        }
        clipped
    }

    /// Whether a layer between `id` and `clipping_layer` on the compositing container chain
    /// clips without being an ancestor of `clipping_layer`.
    ///
    /// Such a layer escapes the clips it would inherit on the compositor.
    fn has_clipped_stacking_ancestor(&self, id: LayerId, clipping_layer: LayerId) -> bool {
        if id == clipping_layer {
            return false;
        }
        let layers = &self.frame.layers;
        let mut current = layers.compositing_container(id);
        while let Some(ancestor) = current {
            if ancestor == clipping_layer {
                break;
            }
            let ancestor_layer = layers.layer(ancestor);
            if ancestor_layer.has_clip_related_property()
                && !self.is_inclusive_ancestor(ancestor, clipping_layer)
            {
                return true;
            }
            if let Some(container) = ancestor_layer.ancestor_inputs_unchecked().clipping_container {
                if !self.is_inclusive_ancestor(container, clipping_layer) {
                    return true;
                }
            }
            current = layers.compositing_container(ancestor);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: LayerId, id: LayerId) -> bool {
        ancestor == id || self.frame.layers.is_ancestor_of(ancestor, id)
    }
}
