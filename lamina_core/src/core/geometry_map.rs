// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use kurbo::{Affine, Rect};
use smallvec::SmallVec;

use crate::core::LayerRef;

#[derive(Clone, Copy, Debug)]
struct Step {
    key: LayerRef,
    /// From the layer's space to the space of the first step.
    to_root: Affine,
}

/// A stack of layers with their accumulated transforms, for top-down walks.
///
/// Each push composes the transform of a layer to its parent with that of the parent,
/// so mapping to the root costs one multiplication per layer instead of a walk up
/// the tree. The stack may span frames: a frame's root is pushed with the transform
/// to the space of the hosting frame's root.
///
/// Every push must be matched by a pop of the same layer.
#[derive(Clone, Debug, Default)]
pub struct GeometryMap {
    steps: SmallVec<[Step; 16]>,
}

impl GeometryMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of pushed layers.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if nothing is pushed.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The layer on top of the stack.
    pub fn top(&self) -> Option<LayerRef> {
        self.steps.last().map(|step| step.key)
    }

    /// Pushes a layer whose space is `to_root` away from the space of the first step.
    ///
    /// Used for the first step, and for layers whose transform to the root is known.
    pub fn push_root(&mut self, key: LayerRef, to_root: Affine) {
        self.steps.push(Step { key, to_root });
    }

    /// Pushes a layer, given the transform from its space to that of the current top.
    pub fn push(&mut self, key: LayerRef, to_parent: Affine) {
        let parent = self.absolute_transform();
        self.steps.push(Step {
            key,
            to_root: parent * to_parent,
        });
    }

    /// Pops `key`, which must be on top of the stack.
    #[track_caller]
    pub fn pop(&mut self, key: LayerRef) {
        match self.steps.last() {
            Some(step) if step.key == key => {
                self.steps.pop();
            }
            top => {
                debug_panic!(
                    "Unbalanced geometry map: popping {key} but the top is {:?}",
                    top.map(|step| step.key)
                );
            }
        }
    }

    /// The transform from the space of the top layer to the root.
    pub fn absolute_transform(&self) -> Affine {
        self.steps
            .last()
            .map_or(Affine::IDENTITY, |step| step.to_root)
    }

    /// Maps a rect from the space of the top layer to the root.
    pub fn absolute_rect(&self, rect: Rect) -> Rect {
        self.absolute_transform().transform_rect_bbox(rect)
    }

    /// Maps a rect from the space of the top layer to that of `ancestor`.
    ///
    /// Returns `None` if `ancestor` isn't on the stack, or if its transform can't be inverted.
    pub fn map_rect_to_ancestor(&self, rect: Rect, ancestor: LayerRef) -> Option<Rect> {
        let ancestor_to_root = self
            .steps
            .iter()
            .rev()
            .find(|step| step.key == ancestor)?
            .to_root;
        if ancestor_to_root.determinant().abs() < f64::EPSILON {
            return None;
        }
        Some((ancestor_to_root.inverse() * self.absolute_transform()).transform_rect_bbox(rect))
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Vec2;

    use super::*;
    use crate::core::{FrameId, LayerId};

    fn key() -> LayerRef {
        LayerRef::new(FrameId::next(), LayerId::next())
    }

    #[test]
    fn pushes_accumulate() {
        let (root, child, grandchild) = (key(), key(), key());
        let mut map = GeometryMap::new();
        map.push_root(root, Affine::IDENTITY);
        map.push(child, Affine::translate(Vec2::new(10., 20.)));
        map.push(grandchild, Affine::scale(2.));

        let rect = Rect::new(0., 0., 5., 5.);
        assert_eq!(map.absolute_rect(rect), Rect::new(10., 20., 20., 30.));
        assert_eq!(
            map.map_rect_to_ancestor(rect, child),
            Some(Rect::new(0., 0., 10., 10.))
        );

        map.pop(grandchild);
        assert_eq!(map.top(), Some(child));
        map.pop(child);
        map.pop(root);
        assert!(map.is_empty());
    }

    #[test]
    fn mapping_to_a_flattened_ancestor_fails() {
        let (root, flat, child) = (key(), key(), key());
        let mut map = GeometryMap::new();
        map.push_root(root, Affine::IDENTITY);
        map.push(flat, Affine::scale_non_uniform(1., 0.));
        map.push(child, Affine::IDENTITY);
        assert_eq!(map.map_rect_to_ancestor(Rect::new(0., 0., 1., 1.), flat), None);
        assert_eq!(map.map_rect_to_ancestor(Rect::new(0., 0., 1., 1.), key()), None);
    }
}
