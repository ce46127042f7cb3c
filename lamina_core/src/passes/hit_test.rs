// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The hit-test pass: finds the front-most layer under a point.
//!
//! Children are tested front to back: positive z-order list, normal flow, the layer's
//! own content, then the negative z-order list. Inside a `preserve-3d` stacking context
//! every candidate is collected and the one closest to the viewer wins instead.

use kurbo::{Affine, Point, Vec2};
use tracing::{info_span, trace};

use crate::app::Frame;
use crate::core::{LayerId, LayerTree};
use crate::passes::enter_span_if;

/// The outcome of a hit test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitTestResult {
    /// The self-painting layer whose content was hit.
    ///
    /// This is `hit_layer` itself, or the nearest ancestor that paints it.
    pub layer: LayerId,
    /// The layer whose box contains the point.
    pub hit_layer: LayerId,
    /// The point, in the coordinates of `hit_layer`.
    pub local_point: Point,
}

/// Maps the tested point into the space of the visited layer.
///
/// Descending returns a new state, the parent's state is never modified.
#[derive(Clone, Copy, Debug, PartialEq)]
struct HitTestingTransformState {
    /// From the document to the layer's space.
    to_local: Affine,
    /// Depth of the layer in its 3D rendering context.
    z: f64,
}

impl HitTestingTransformState {
    const DOCUMENT: Self = Self {
        to_local: Affine::IDENTITY,
        z: 0.,
    };

    /// The state of a child, given the transform from its space to the current one.
    ///
    /// Children of a layer that doesn't preserve 3D are flattened into its plane.
    /// Returns `None` if the transform can't be inverted, since nothing can be hit then.
    fn descend(
        self,
        to_parent: Affine,
        translate_z: f64,
        parent_preserves_3d: bool,
    ) -> Option<Self> {
        if to_parent.determinant().abs() < f64::EPSILON {
            return None;
        }
        Some(Self {
            to_local: to_parent.inverse() * self.to_local,
            z: if parent_preserves_3d {
                self.z + translate_z
            } else {
                self.z
            },
        })
    }

    /// The same state, with the layer's content shifted by `offset`.
    fn translated(self, offset: Vec2) -> Self {
        Self {
            to_local: Affine::translate(-offset) * self.to_local,
            z: self.z,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    result: HitTestResult,
    z: f64,
}

#[derive(Clone, Copy, Debug)]
enum Step {
    Child(LayerId),
    Own,
}

struct HitTester<'a> {
    layers: &'a LayerTree,
    /// The tested point, in document coordinates.
    point: Point,
    trace: bool,
}

/// Hit tests a frame at `point`, in the coordinates of the frame's viewport.
pub(crate) fn run_hit_test_pass(frame: &Frame, point: Point, trace: bool) -> Option<HitTestResult> {
    let _span = info_span!("hit_test", frame = frame.id().trace()).entered();
    let layers = &frame.layers;
    let tester = HitTester {
        layers,
        point: point + layers.root_scroll_offset(),
        trace,
    };
    let result = tester
        .hit_test_layer(layers.root(), HitTestingTransformState::DOCUMENT)
        .map(|candidate| candidate.result);
    trace!(?point, ?result, "Hit test");
    result
}

impl HitTester<'_> {
    fn hit_test_layer(&self, id: LayerId, state: HitTestingTransformState) -> Option<Candidate> {
        let layers = self.layers;
        let layer = layers.layer(id);
        let _span = enter_span_if(self.trace, layer);
        let depth_sort = layer.is_stacking_context() && layer.style().preserves_3d;

        let lists = layers.z_order_lists(id);
        let normal_flow = layers.normal_flow_children(id);
        let steps = lists
            .positive
            .iter()
            .rev()
            .copied()
            .map(Step::Child)
            .chain(normal_flow.iter().rev().copied().map(Step::Child))
            .chain(std::iter::once(Step::Own))
            .chain(lists.negative.iter().rev().copied().map(Step::Child));

        let mut candidates = Vec::new();
        for step in steps {
            let hit = match step {
                Step::Child(child) => self.hit_test_child(id, child, state),
                Step::Own => self.hit_test_self(id, state),
            };
            let Some(hit) = hit else {
                continue;
            };
            if !depth_sort {
                return Some(hit);
            }
            candidates.push(hit);
        }
        // Ties keep the candidate that comes first in front-to-back order.
        candidates
            .into_iter()
            .reduce(|best, candidate| if candidate.z > best.z { candidate } else { best })
    }

    fn hit_test_child(
        &self,
        parent: LayerId,
        child: LayerId,
        state: HitTestingTransformState,
    ) -> Option<Candidate> {
        let layers = self.layers;
        let child_layer = layers.layer(child);
        let parent_preserves_3d = layers.layer(parent).style().preserves_3d;
        let translate_z = child_layer
            .style()
            .transform
            .map_or(0., |transform| transform.translate_z);

        let pagination = child_layer
            .enclosing_pagination_layer()
            .filter(|pagination| {
                *pagination == parent || layers.is_ancestor_of(parent, *pagination)
            });
        if let Some(pagination) = pagination {
            return self.hit_test_fragments(parent, pagination, child, state);
        }

        let to_parent = layers.transform_to_ancestor(child, Some(parent));
        let child_state = state.descend(to_parent, translate_z, parent_preserves_3d)?;
        self.hit_test_layer(child, child_state)
    }

    /// Tests a child laid out in the flow thread of `pagination`, once per fragment under
    /// the point.
    fn hit_test_fragments(
        &self,
        parent: LayerId,
        pagination: LayerId,
        child: LayerId,
        state: HitTestingTransformState,
    ) -> Option<Candidate> {
        let layers = self.layers;
        let pagination_state = if pagination == parent {
            state
        } else {
            state.descend(layers.transform_to_ancestor(pagination, Some(parent)), 0., false)?
        };
        let point_in_pagination = pagination_state.to_local * self.point;
        let parent_preserves_3d = layers.layer(parent).style().preserves_3d;
        let translate_z = layers
            .layer(child)
            .style()
            .transform
            .map_or(0., |transform| transform.translate_z);
        let to_pagination = layers.transform_to_ancestor(child, Some(pagination));

        for fragment in &layers.layer(pagination).style().fragments {
            if !fragment.visual_rect().contains(point_in_pagination) {
                continue;
            }
            let Some(child_state) = pagination_state
                .translated(fragment.translation)
                .descend(to_pagination, translate_z, parent_preserves_3d)
            else {
                continue;
            };
            if let Some(hit) = self.hit_test_layer(child, child_state) {
                return Some(hit);
            }
        }
        None
    }

    fn hit_test_self(&self, id: LayerId, state: HitTestingTransformState) -> Option<Candidate> {
        let layers = self.layers;
        let layer = layers.layer(id);
        if !layer.style().visible {
            return None;
        }
        let local_point = state.to_local * self.point;
        let bounds = if layer.is_root() {
            layer
                .scrollable_area()
                .map_or(layer.physical_bounding_box(), |area| area.overflow_rect())
        } else {
            layer.physical_bounding_box()
        };
        if !bounds.contains(local_point) {
            return None;
        }
        if layer.clip_rect().is_some_and(|clip| !clip.contains(local_point)) {
            return None;
        }
        if !self.passes_ancestor_clips(id, local_point) {
            return None;
        }
        Some(Candidate {
            result: HitTestResult {
                layer: layers.enclosing_self_painting_layer(id),
                hit_layer: id,
                local_point,
            },
            z: state.z,
        })
    }

    /// Whether the clips of every clipping container of the layer contain `local_point`.
    fn passes_ancestor_clips(&self, id: LayerId, local_point: Point) -> bool {
        let layers = self.layers;
        let mut container = layers
            .layer(id)
            .ancestor_dependent_compositing_inputs()
            .clipping_container;
        while let Some(current) = container {
            let current_layer = layers.layer(current);
            if let Some(clip) = current_layer.clip_rect() {
                let point = layers.transform_to_ancestor(id, Some(current)) * local_point;
                if !clip.contains(point) {
                    return false;
                }
            }
            container = current_layer
                .ancestor_dependent_compositing_inputs()
                .clipping_container;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattening_keeps_the_parent_depth() {
        let state = HitTestingTransformState::DOCUMENT
            .descend(Affine::IDENTITY, 10., true)
            .unwrap();
        assert_eq!(state.z, 10., "children of a 3D context are offset in depth");

        let flattened = state.descend(Affine::IDENTITY, 5., false).unwrap();
        assert_eq!(flattened.z, 10., "a flat parent ignores the child's depth");
    }

    #[test]
    fn descending_maps_the_point_into_the_child() {
        let state = HitTestingTransformState::DOCUMENT
            .descend(Affine::translate((20., 30.)), 0., false)
            .unwrap();
        assert_eq!(state.to_local * Point::new(25., 35.), Point::new(5., 5.));

        let shifted = state.translated(Vec2::new(0., 100.));
        assert_eq!(shifted.to_local * Point::new(25., 135.), Point::new(5., 5.));
    }

    #[test]
    fn singular_transforms_cannot_be_hit() {
        let collapsed = Affine::scale_non_uniform(1., 0.);
        assert!(
            HitTestingTransformState::DOCUMENT
                .descend(collapsed, 0., false)
                .is_none(),
            "a collapsed layer has no area to hit"
        );
    }
}
