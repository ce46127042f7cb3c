// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The trees Lamina is built on: boxes, paint layers, and their scroll state.

mod compositing;
mod geometry_map;
mod ids;
mod layer_tree;
mod layout_tree;
mod paint_layer;
mod region;
mod scrollable_area;
mod stacking_node;
mod style;

pub use compositing::{
    CompositedLayerMapping, CompositingQueryPermit, CompositingReasons, CompositingState,
};
pub use geometry_map::GeometryMap;
pub use ids::{AnimationGroupId, AnimationId, BoxId, FrameId, LayerHandle, LayerId, LayerRef};
pub use layer_tree::LayerTree;
pub use layout_tree::{BoxKind, LayerType, LayoutBox, LayoutTree};
pub use paint_layer::{AncestorDependentCompositingInputs, PaintLayer};
pub use region::Region;
pub use scrollable_area::{
    LayerScrollableArea, ResizerHitTest, ScrollGranularity, ScrollResult, ScrollState,
    ScrollType, ScrollableArea, StickyPositionConstraints,
};
pub use stacking_node::ZOrderLists;
pub use style::{BoxOffsets, BoxStyle, Fragment, LayerTransform, Overflow, Position};

pub(crate) use stacking_node::StackingNode;
