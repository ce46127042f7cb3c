// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Types describing the outcome of the compositing decision.

use bitflags::bitflags;
use kurbo::Size;

use crate::core::LayerHandle;

/// How a layer's content reaches the screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositingState {
    /// The layer paints into the backing of an ancestor.
    #[default]
    NotComposited,
    /// The layer has its own compositor layer.
    PaintsIntoOwnBacking,
    /// The layer shares a squashing layer with other overlapping layers.
    PaintsIntoGroupedBacking,
}

impl CompositingState {
    /// Whether the layer paints into a compositor layer of its own or a shared one.
    pub fn is_composited(self) -> bool {
        self != Self::NotComposited
    }
}

bitflags! {
    /// Why a layer is composited.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompositingReasons: u32 {
        /// The root layer of a composited frame.
        const ROOT = 1 << 0;
        /// The layer has a transform with a z component.
        const TRANSFORM_3D = 1 << 1;
        /// The layer preserves the 3D context of its descendants.
        const PRESERVE_3D = 1 << 2;
        /// The author announced that the transform will change.
        const WILL_CHANGE_TRANSFORM = 1 << 3;
        /// The layer scrolls on the compositor.
        const OVERFLOW_SCROLLING = 1 << 4;
        /// The layer is fixed to the viewport of a scrollable frame.
        const FIXED_POSITION = 1 << 5;
        /// The layer hosts a composited child frame.
        const IFRAME = 1 << 6;
        /// The layer is assumed to overlap earlier composited content.
        const ASSUMED_OVERLAP = 1 << 7;
        /// The layer overlaps earlier composited content.
        const OVERLAP = 1 << 8;
    }
}

impl CompositingReasons {
    /// Reasons that justify a backing of the layer's own.
    pub const DIRECT: Self = Self::ROOT
        .union(Self::TRANSFORM_3D)
        .union(Self::PRESERVE_3D)
        .union(Self::WILL_CHANGE_TRANSFORM)
        .union(Self::OVERFLOW_SCROLLING)
        .union(Self::FIXED_POSITION)
        .union(Self::IFRAME);

    /// Reasons that can be satisfied by squashing into a shared backing.
    pub const SQUASHABLE: Self = Self::ASSUMED_OVERLAP.union(Self::OVERLAP);
}

/// Proof that compositing state may be read.
///
/// Compositing state is only meaningful once the compositing assignment of the current
/// lifecycle has run.
/// [`Page::compositing_query_permit`](crate::app::Page::compositing_query_permit) hands out
/// a permit only when that's the case.
#[derive(Clone, Copy, Debug)]
pub struct CompositingQueryPermit(());

impl CompositingQueryPermit {
    pub(crate) fn new() -> Self {
        Self(())
    }

    /// Read compositing state without checking the document lifecycle.
    ///
    /// The state may be stale. Use this only for debugging output.
    pub fn disable_compositing_query_asserts() -> Self {
        Self(())
    }
}

/// The compositor layers backing a layer that paints into its own backing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositedLayerMapping {
    /// The layer the content is painted into.
    pub main: LayerHandle,
    /// For composited scrollers, the layer that clips the scrolled content.
    pub scroll_clip: Option<LayerHandle>,
    /// For composited scrollers, the layer that moves when scrolling.
    pub scrolling_contents: Option<LayerHandle>,
    /// The layer that layers squashed into this one paint into.
    pub squashing: Option<LayerHandle>,
    /// The bounds last pushed for `main`.
    pub bounds: Size,
}

impl CompositedLayerMapping {
    /// The compositor layer that content of a layer of the owning layer's subtree lands in.
    ///
    /// `is_owner_box` is `true` for content of the owning layer's own box, which is
    /// painted into `main`. Descendant content of a scroller moves with its scrolled
    /// content.
    pub fn graphics_layer_backing(&self, is_owner_box: bool) -> LayerHandle {
        match self.scrolling_contents {
            Some(scrolling_contents) if !is_owner_box => scrolling_contents,
            _ => self.main,
        }
    }

    /// Every handle of the mapping.
    pub fn handles(&self) -> impl Iterator<Item = LayerHandle> {
        [
            Some(self.main),
            self.scroll_clip,
            self.scrolling_contents,
            self.squashing,
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_squashable_reasons_are_disjoint() {
        assert!(!CompositingReasons::DIRECT.intersects(CompositingReasons::SQUASHABLE));
        assert_eq!(
            CompositingReasons::DIRECT | CompositingReasons::SQUASHABLE,
            CompositingReasons::all()
        );
    }
}
