// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use kurbo::{Point, Rect, Size, Vec2};
use smallvec::SmallVec;
use tree_arena::TreeArena;

use crate::core::{BoxId, BoxStyle, FrameId, LayerId, Position};
use crate::util::size_rect;

/// What kind of layout object a box is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoxKind {
    /// The root box of a document.
    View,
    /// A block-level box.
    Block,
    /// An inline-level box.
    Inline,
    /// A table row group.
    TableSection,
    /// A table row. Rows share their section's coordinate space with their cells.
    TableRow,
    /// A table cell, positioned relative to its section.
    TableCell,
    /// A box that hosts a child frame.
    FrameOwner,
    /// A plugin.
    Plugin {
        /// Whether the plugin consumes wheel events, which forces scrolling over it
        /// to be handled on the main thread.
        wants_wheel_events: bool,
    },
}

/// Whether a box needs a layer, and which kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerType {
    /// A layer that paints its own content.
    Normal,
    /// A layer that only exists to clip overflow. Its content is painted by an ancestor.
    OverflowClip,
}

/// A box of the layout tree.
///
/// Boxes are produced by an external layout engine. Their geometry is *physical*:
/// `location` is relative to the box's container, as returned by
/// [`LayoutTree::container`], except for table cells which are relative to their section.
#[derive(Clone, Debug)]
pub struct LayoutBox {
    pub(crate) id: BoxId,
    /// The kind of layout object.
    pub kind: BoxKind,
    /// Location of the border box, relative to the container box.
    pub location: Point,
    /// Size of the border box.
    pub size: Size,
    /// Size of the scrollable content, for boxes that clip their overflow.
    ///
    /// Never smaller than `size`.
    pub overflow_size: Size,
    /// Computed style.
    pub style: BoxStyle,
    /// Rects that respond to touch, in local coordinates.
    ///
    /// An empty list means the border box.
    pub hit_rects: SmallVec<[Rect; 1]>,
    pub(crate) layer: Option<LayerId>,
    pub(crate) child_frame: Option<FrameId>,
}

impl LayoutBox {
    /// The id of the box.
    pub fn id(&self) -> BoxId {
        self.id
    }

    /// The layer this box owns, if any.
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    /// The frame hosted by this box, if it's a frame owner.
    pub fn child_frame(&self) -> Option<FrameId> {
        self.child_frame
    }

    /// The border box in local coordinates.
    pub fn border_box(&self) -> Rect {
        size_rect(self.size)
    }

    /// The touch-responsive rects in local coordinates.
    pub fn local_hit_rects(&self) -> SmallVec<[Rect; 1]> {
        if self.hit_rects.is_empty() {
            smallvec::smallvec![self.border_box()]
        } else {
            self.hit_rects.clone()
        }
    }

    /// Which kind of layer this box requires, if any.
    pub fn layer_type_required(&self) -> Option<LayerType> {
        let style = &self.style;
        let normal = self.kind == BoxKind::View
            || self.kind == BoxKind::FrameOwner
            || style.position.is_positioned()
            || style.is_stacking_context()
            || style.has_clip()
            || style.is_paginated();
        if normal {
            Some(LayerType::Normal)
        } else if style.has_overflow_clip() {
            Some(LayerType::OverflowClip)
        } else {
            None
        }
    }
}

/// The tree of boxes of one document.
///
/// The tree always has a root box of kind [`BoxKind::View`].
#[derive(Debug)]
pub struct LayoutTree {
    boxes: TreeArena<LayoutBox>,
    root: BoxId,
}

impl LayoutTree {
    pub(crate) fn new(document_size: Size) -> Self {
        let root = BoxId::next();
        let mut boxes = TreeArena::new();
        boxes.insert_root(
            root,
            LayoutBox {
                id: root,
                kind: BoxKind::View,
                location: Point::ORIGIN,
                size: document_size,
                overflow_size: document_size,
                style: BoxStyle::default(),
                hit_rects: SmallVec::new(),
                layer: None,
                child_frame: None,
            },
        );
        Self { boxes, root }
    }

    /// The root box.
    pub fn root(&self) -> BoxId {
        self.root
    }

    /// The number of boxes in the tree.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Returns `true` if the tree only has its root.
    pub fn is_empty(&self) -> bool {
        self.boxes.len() <= 1
    }

    /// Returns `true` if the box is part of this tree.
    pub fn contains(&self, id: BoxId) -> bool {
        self.boxes.contains(id)
    }

    /// Returns the box with the given id.
    pub fn get(&self, id: BoxId) -> Option<&LayoutBox> {
        self.boxes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: BoxId) -> Option<&mut LayoutBox> {
        self.boxes.get_mut(id)
    }

    /// Returns the box with the given id.
    ///
    /// ## Panics
    ///
    /// If the box isn't in the tree.
    #[track_caller]
    pub fn layout_box(&self, id: BoxId) -> &LayoutBox {
        self.get(id)
            .unwrap_or_else(|| panic!("{id} not found in layout tree"))
    }

    #[track_caller]
    pub(crate) fn layout_box_mut(&mut self, id: BoxId) -> &mut LayoutBox {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("{id} not found in layout tree"))
    }

    /// The parent box, if any.
    pub fn parent(&self, id: BoxId) -> Option<BoxId> {
        self.boxes.parent_of(id).map(BoxId::from_node)
    }

    /// The children of a box, in order.
    pub fn children(&self, id: BoxId) -> impl Iterator<Item = BoxId> + '_ {
        self.boxes.children(id).map(BoxId::from_node)
    }

    /// The strict descendants of a box, in pre-order.
    pub fn descendants(&self, id: BoxId) -> impl Iterator<Item = BoxId> + '_ {
        self.boxes.descendants(id).map(BoxId::from_node)
    }

    /// The strict ancestors of a box, from its parent up.
    pub fn ancestors(&self, id: BoxId) -> impl Iterator<Item = BoxId> + '_ {
        self.boxes.ancestors(id).map(BoxId::from_node)
    }

    /// Returns `true` if `id` is a strict descendant of `ancestor`.
    pub fn is_descendant_of(&self, id: BoxId, ancestor: BoxId) -> bool {
        self.boxes.is_ancestor_of(ancestor, id)
    }

    /// Every box of the tree, in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &LayoutBox> + '_ {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .filter_map(|id| self.get(id))
    }

    pub(crate) fn insert(
        &mut self,
        parent: BoxId,
        before: Option<BoxId>,
        kind: BoxKind,
        location: Point,
        size: Size,
        style: BoxStyle,
    ) -> BoxId {
        let id = BoxId::next();
        self.boxes.insert_child(
            parent,
            before.map(Into::into),
            id,
            LayoutBox {
                id,
                kind,
                location,
                size,
                overflow_size: size,
                style,
                hit_rects: SmallVec::new(),
                layer: None,
                child_frame: None,
            },
        );
        id
    }

    pub(crate) fn remove_subtree(&mut self, id: BoxId) -> Vec<LayoutBox> {
        if id == self.root {
            debug_panic!("Cannot remove the root box of a layout tree");
            return Vec::new();
        }
        self.boxes
            .remove_subtree(id)
            .into_iter()
            .map(|(_, item)| item)
            .collect()
    }

    /// The box this box is positioned against.
    ///
    /// For in-flow boxes, this is the parent. Floats skip inline ancestors.
    /// Absolute boxes are positioned against the nearest positioned or transformed
    /// ancestor, and fixed boxes against the nearest transformed ancestor; both fall
    /// back to the root.
    pub fn container(&self, id: BoxId) -> Option<BoxId> {
        let layout_box = self.get(id)?;
        let parent = self.parent(id)?;
        let mut candidates = std::iter::once(parent).chain(self.ancestors(parent));
        let style = &layout_box.style;
        match style.position {
            Position::Fixed => candidates.find(|candidate| {
                let candidate = self.layout_box(*candidate);
                candidate.kind == BoxKind::View
                    || candidate.style.can_contain_fixed_position_objects()
            }),
            Position::Absolute => candidates.find(|candidate| {
                let candidate = self.layout_box(*candidate);
                candidate.kind == BoxKind::View
                    || candidate.style.can_contain_absolute_position_objects()
            }),
            _ if style.is_floating => {
                candidates.find(|candidate| self.layout_box(*candidate).kind != BoxKind::Inline)
            }
            _ => Some(parent),
        }
    }

    /// The layer of this box, or of its nearest ancestor that has one.
    pub fn enclosing_layer(&self, id: BoxId) -> Option<LayerId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|ancestor| self.get(ancestor)?.layer)
    }

    /// The first layer on the container chain of a box, and the offset of the box's
    /// origin in that layer's coordinates.
    ///
    /// If the box owns a layer, that layer is returned with a zero offset.
    /// For boxes inside a scroller, the offset is in the scroller's content space.
    pub fn offset_from_enclosing_layer(&self, id: BoxId) -> Option<(LayerId, Vec2)> {
        let layout_box = self.get(id)?;
        if let Some(layer) = layout_box.layer {
            return Some((layer, Vec2::ZERO));
        }
        self.offset_from_containing_layer(id)
    }

    /// Like [`offset_from_enclosing_layer`](Self::offset_from_enclosing_layer), but the
    /// box's own layer is skipped.
    ///
    /// For a box that owns a layer, this is the layer its location is relative to.
    pub fn offset_from_containing_layer(&self, id: BoxId) -> Option<(LayerId, Vec2)> {
        let mut offset = self.get(id)?.location.to_vec2();
        let mut current = self.container(id);
        while let Some(container) = current {
            let container_box = self.layout_box(container);
            if let Some(layer) = container_box.layer {
                // Cells are positioned relative to the section, not the row.
                if container_box.kind == BoxKind::TableRow {
                    offset -= container_box.location.to_vec2();
                }
                return Some((layer, offset));
            }
            if container_box.kind != BoxKind::TableRow {
                offset += container_box.location.to_vec2();
            }
            current = self.container(container);
        }
        None
    }
}
