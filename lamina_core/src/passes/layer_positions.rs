// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The layer positions pass: syncs every layer with the geometry of its box.
//!
//! Also recomputes the state that depends on the shape of the layer tree rather than
//! on compositing: the enclosing pagination layer and whether a subtree has self-painting layers.

use kurbo::{Point, Rect, Vec2};
use tracing::info_span;

use crate::app::Frame;
use crate::core::{LayerId, Position, ScrollType, ScrollableArea, StickyPositionConstraints};
use crate::passes::enter_span_if;

pub(crate) fn run_layer_positions_pass(frame: &mut Frame, trace: bool) {
    let _span = info_span!("layer_positions", frame = frame.id().trace()).entered();
    frame.layers.update_z_order_lists();
    let root = frame.layers.root();
    update_recursive(frame, root, trace);
}

/// Returns `true` if the layer or a descendant is self painting.
fn update_recursive(frame: &mut Frame, id: LayerId, trace: bool) -> bool {
    let _span = enter_span_if(trace, frame.layers.layer(id));
    update_layer_position(frame, id);

    let pagination_layer = frame
        .layers
        .parent_layer_on_containing_block_chain(id)
        .and_then(|containing| {
            let containing = frame.layers.layer(containing);
            if containing.style().is_paginated() {
                Some(containing.id())
            } else {
                containing.enclosing_pagination_layer()
            }
        });
    frame.layers.layer_mut(id).enclosing_pagination_layer = pagination_layer;

    let children: Vec<LayerId> = frame.layers.children(id).collect();
    let mut has_self_painting_descendant = false;
    for child in children {
        has_self_painting_descendant |= update_recursive(frame, child, trace);
    }

    let layer = frame.layers.layer_mut(id);
    layer.has_self_painting_layer_descendant = has_self_painting_descendant;
    layer.is_self_painting_layer() || has_self_painting_descendant
}

/// Recomputes the location and size of a layer from its box.
///
/// The location is relative to the containing layer, minus that layer's scroll offset
/// (the root's scroll offset is never subtracted), plus any relative or sticky offset.
/// A layer whose geometry changed needs its compositing inputs updated.
pub(crate) fn update_layer_position(frame: &mut Frame, id: LayerId) {
    let layer = frame.layers.layer(id);
    let Some(layout_box) = frame.layout.get(layer.box_id()) else {
        debug_panic!("{id} outlived its box {}", layer.box_id());
        return;
    };
    let size = layout_box.size;
    let contents_size = layout_box.overflow_size.max(size);

    let mut location = Point::ORIGIN;
    if !layer.is_root() {
        if let Some((containing, offset)) =
            frame.layout.offset_from_containing_layer(layer.box_id())
        {
            location += offset;
            let containing = frame.layers.layer(containing);
            if !containing.is_root() {
                location -= containing.scroll_offset();
            }
        }
        if layer.style().position == Position::Relative {
            location += layer.style().relative_offset;
        }
    }
    let sticky_offset = if layer.style().position == Position::Sticky {
        sticky_offset(frame, id)
    } else {
        Vec2::ZERO
    };
    location += sticky_offset;

    let layer = frame.layers.layer_mut(id);
    let changed = layer.location != location || layer.size != size;
    layer.location = location;
    layer.size = size;
    layer.sticky_offset = sticky_offset;
    if let Some(area) = layer.scrollable_area_mut() {
        if !area.state.visible_size.eq(&size) || !area.state.contents_size.eq(&contents_size) {
            area.state.visible_size = size;
            area.state.contents_size = contents_size;
            // Shrinking content may leave the offset out of range.
            let offset = area.state.scroll_offset();
            area.state.set_scroll_offset(offset, ScrollType::Programmatic);
        }
    }
    if changed {
        frame.layers.set_needs_compositing_inputs_update(id);
    }
}

/// The offset of a sticky layer, from the constraints registered with its ancestor overflow layer.
fn sticky_offset(frame: &Frame, id: LayerId) -> Vec2 {
    let Some(scroller) = frame.layers.layer(id).ancestor_overflow_layer() else {
        return Vec2::ZERO;
    };
    let Some(area) = frame
        .layers
        .get(scroller)
        .and_then(|scroller| scroller.scrollable_area())
    else {
        return Vec2::ZERO;
    };
    area.sticky_constraints()
        .get(&id)
        .map_or(Vec2::ZERO, |constraints| {
            constraints.compute_sticky_offset(area.visible_content_rect())
        })
}

/// Computes the constraints of a sticky layer against the scroller it sticks to.
///
/// Rects are in the scroller's content space, ignoring the current sticky offset.
pub(crate) fn compute_sticky_constraints(
    frame: &Frame,
    id: LayerId,
    scroller: LayerId,
) -> Option<StickyPositionConstraints> {
    let layers = &frame.layers;
    let layer = layers.layer(id);
    let scroller_layer = layers.layer(scroller);
    let area = scroller_layer.scrollable_area()?;
    // Locations below the root already are in document space.
    let content_offset = if scroller_layer.is_root() {
        Vec2::ZERO
    } else {
        area.scroll_offset()
    };

    let sticky_origin = layers.convert_to_layer_coords(id, Some(scroller), Point::ORIGIN)
        - layer.sticky_offset
        + content_offset;
    let sticky_box_rect = Rect::from_origin_size(sticky_origin, layer.size());

    let container = frame.layout.container(layer.box_id())?;
    let containing_block_rect = if container == scroller_layer.box_id() {
        area.overflow_rect()
    } else {
        let (container_layer, offset) = frame.layout.offset_from_enclosing_layer(container)?;
        let origin = if container_layer == scroller {
            offset.to_point()
        } else {
            layers.convert_to_layer_coords(container_layer, Some(scroller), offset.to_point())
                + content_offset
        };
        Rect::from_origin_size(origin, frame.layout.layout_box(container).size)
    };

    Some(StickyPositionConstraints {
        offsets: layer.style().offsets,
        scroll_container_relative_sticky_box_rect: sticky_box_rect,
        scroll_container_relative_containing_block_rect: containing_block_rect,
    })
}
