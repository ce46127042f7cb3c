// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use kurbo::{Point, Rect, Size, Vec2};

use crate::core::{
    BoxId, BoxKind, BoxStyle, CompositedLayerMapping, CompositingQueryPermit, CompositingReasons,
    CompositingState, FrameId, LayerId, LayerScrollableArea, LayerType, StackingNode,
};
use crate::passes::compositing_inputs::InputsUpdateToken;
use crate::util::size_rect;

/// Compositing inputs of a layer that depend on its ancestors.
///
/// These are computed top-down by the compositing inputs update and are stale
/// whenever [`PaintLayer::needs_compositing_inputs_update`] is set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AncestorDependentCompositingInputs {
    /// Nearest translucent ancestor.
    pub opacity_ancestor: Option<LayerId>,
    /// Nearest ancestor with a transform-related property.
    pub transform_ancestor: Option<LayerId>,
    /// Nearest ancestor with a filter.
    pub filter_ancestor: Option<LayerId>,
    /// Nearest fixed-position layer, this layer included.
    pub nearest_fixed_position_layer: Option<LayerId>,
    /// Nearest layer whose clip applies to this layer.
    pub clipping_container: Option<LayerId>,
    /// The layer whose clip must be applied to this layer on the compositor, when
    /// this layer escapes the clips of the layers it's composited under.
    pub clip_parent: Option<LayerId>,
    /// The scroller this layer must scroll with on the compositor, when it isn't one
    /// of its compositing ancestors.
    pub scroll_parent: Option<LayerId>,
    /// Nearest scroller on the containing block chain.
    pub ancestor_scrolling_layer: Option<LayerId>,
    /// Bounding box for overlap testing in root coordinates, ignoring clips.
    pub unclipped_absolute_bounding_box: Rect,
    /// Bounding box for overlap testing in root coordinates.
    pub clipped_absolute_bounding_box: Rect,
    /// Whether an ancestor has a clip path.
    pub has_ancestor_with_clip_path: bool,
}

/// A layer of the paint layer tree.
///
/// A layer is created for every box that [needs one](crate::core::LayoutBox::layer_type_required).
/// It holds its box's position relative to its containing layer, its z-order lists,
/// the compositing inputs, and the outcome of the compositing decision.
#[derive(Debug)]
pub struct PaintLayer {
    pub(crate) id: LayerId,
    pub(crate) frame: FrameId,
    pub(crate) box_id: BoxId,
    pub(crate) kind: BoxKind,
    pub(crate) layer_type: LayerType,
    pub(crate) style: BoxStyle,
    pub(crate) size: Size,
    /// Relative to the containing layer, after subtracting its scroll offset.
    pub(crate) location: Point,
    pub(crate) sticky_offset: Vec2,
    pub(crate) is_root: bool,
    pub(crate) child_frame: Option<FrameId>,

    pub(crate) stacking: StackingNode,

    pub(crate) needs_compositing_inputs_update: bool,
    pub(crate) child_needs_compositing_inputs_update: bool,
    ancestor_inputs: AncestorDependentCompositingInputs,
    ancestor_overflow_layer: Option<LayerId>,

    pub(crate) has_self_painting_layer_descendant: bool,
    pub(crate) enclosing_pagination_layer: Option<LayerId>,

    pub(crate) compositing_state: CompositingState,
    pub(crate) compositing_reasons: CompositingReasons,
    pub(crate) mapping: Option<CompositedLayerMapping>,
    pub(crate) squashing_owner: Option<LayerId>,

    pub(crate) scrollable_area: Option<LayerScrollableArea>,
}

// --- MARK: CREATION
impl PaintLayer {
    pub(crate) fn new(
        frame: FrameId,
        box_id: BoxId,
        kind: BoxKind,
        layer_type: LayerType,
        style: BoxStyle,
        size: Size,
    ) -> Self {
        Self {
            id: LayerId::next(),
            frame,
            box_id,
            kind,
            layer_type,
            style,
            size,
            location: Point::ORIGIN,
            sticky_offset: Vec2::ZERO,
            is_root: kind == BoxKind::View,
            child_frame: None,
            stacking: StackingNode::default(),
            needs_compositing_inputs_update: true,
            child_needs_compositing_inputs_update: false,
            ancestor_inputs: AncestorDependentCompositingInputs::default(),
            ancestor_overflow_layer: None,
            has_self_painting_layer_descendant: false,
            enclosing_pagination_layer: None,
            compositing_state: CompositingState::NotComposited,
            compositing_reasons: CompositingReasons::empty(),
            mapping: None,
            squashing_owner: None,
            scrollable_area: None,
        }
    }
}

// --- MARK: GETTERS
impl PaintLayer {
    /// The id of this layer.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// The frame whose layer tree holds this layer.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// The box this layer was created for.
    pub fn box_id(&self) -> BoxId {
        self.box_id
    }

    /// The kind of the box this layer was created for.
    pub fn kind(&self) -> BoxKind {
        self.kind
    }

    /// The style of the layer's box.
    pub fn style(&self) -> &BoxStyle {
        &self.style
    }

    /// The size of the layer's border box.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Location relative to the containing layer, including scroll and positioning offsets.
    pub fn location(&self) -> Point {
        self.location
    }

    /// Whether this is the root layer of its frame.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// The frame hosted by this layer's box, if any.
    pub fn child_frame(&self) -> Option<FrameId> {
        self.child_frame
    }

    /// Whether this layer establishes a stacking context.
    pub fn is_stacking_context(&self) -> bool {
        self.is_root || self.style.is_stacking_context()
    }

    /// Whether this layer is ordered by z-index within its stacking context.
    pub fn is_stacked(&self) -> bool {
        !self.is_root && self.style.is_stacked()
    }

    /// The z-index used for ordering.
    pub fn z_index(&self) -> i32 {
        self.style.effective_z_index()
    }

    /// Whether this layer paints its own content.
    ///
    /// Layers that only clip overflow are painted by their ancestor, unless they
    /// scroll on the compositor.
    pub fn is_self_painting_layer(&self) -> bool {
        self.layer_type == LayerType::Normal
            || self
                .scrollable_area
                .as_ref()
                .is_some_and(|area| area.needs_composited_scrolling)
    }

    /// Whether a descendant layer is self painting.
    pub fn has_self_painting_layer_descendant(&self) -> bool {
        self.has_self_painting_layer_descendant
    }

    /// The border box in local coordinates.
    pub fn physical_bounding_box(&self) -> Rect {
        size_rect(self.size)
    }

    /// Whether the layer is translucent.
    pub fn is_transparent(&self) -> bool {
        self.style.has_opacity()
    }

    /// Whether the layer clips its descendants.
    pub fn has_clip_related_property(&self) -> bool {
        self.style.has_clip_related_property()
    }

    /// Whether the layer clips its overflow.
    pub fn has_overflow_clip(&self) -> bool {
        self.style.has_overflow_clip()
    }

    /// The rect this layer clips its descendants to, in local coordinates.
    ///
    /// Returns `None` if the layer doesn't clip.
    pub fn clip_rect(&self) -> Option<Rect> {
        let style = &self.style;
        let clips = [
            style.has_overflow_clip().then(|| self.physical_bounding_box()),
            style.clip.filter(|_| style.has_clip()),
            style.clip_path,
        ];
        clips.into_iter().flatten().reduce(|a, b| a.intersect(b))
    }

    /// The scroll state of this layer, if it clips its overflow.
    pub fn scrollable_area(&self) -> Option<&LayerScrollableArea> {
        self.scrollable_area.as_ref()
    }

    pub(crate) fn scrollable_area_mut(&mut self) -> Option<&mut LayerScrollableArea> {
        self.scrollable_area.as_mut()
    }

    /// The current scroll offset, or zero for layers that don't scroll.
    pub fn scroll_offset(&self) -> Vec2 {
        self.scrollable_area
            .as_ref()
            .map_or(Vec2::ZERO, |area| area.scroll_offset())
    }

    /// Whether the layer has content to scroll and allows the user to scroll it.
    pub fn scrolls_overflow(&self) -> bool {
        self.scrollable_area
            .as_ref()
            .is_some_and(|area| area.scrolls_overflow())
    }

    /// The nearest ancestor whose box paginates its content.
    pub fn enclosing_pagination_layer(&self) -> Option<LayerId> {
        self.enclosing_pagination_layer
    }

    /// Whether this layer needs its ancestor-dependent inputs recomputed.
    pub fn needs_compositing_inputs_update(&self) -> bool {
        self.needs_compositing_inputs_update
    }

    /// Whether a descendant needs its ancestor-dependent inputs recomputed.
    pub fn child_needs_compositing_inputs_update(&self) -> bool {
        self.child_needs_compositing_inputs_update
    }

    /// The nearest ancestor that clips its overflow, or the root.
    ///
    /// This is kept up to date on every compositing inputs update, even for clean layers.
    pub fn ancestor_overflow_layer(&self) -> Option<LayerId> {
        self.ancestor_overflow_layer
    }

    /// The ancestor-dependent compositing inputs.
    ///
    /// Reading stale inputs is a bug; this panics in debug builds if an update is pending.
    #[track_caller]
    pub fn ancestor_dependent_compositing_inputs(&self) -> &AncestorDependentCompositingInputs {
        if self.needs_compositing_inputs_update {
            debug_panic!(
                "Compositing inputs of {} read while an update is pending",
                self.id
            );
        }
        &self.ancestor_inputs
    }

    /// Inputs as last written by the update, even if an update is pending.
    pub(crate) fn ancestor_inputs_unchecked(&self) -> &AncestorDependentCompositingInputs {
        &self.ancestor_inputs
    }

    /// See [`AncestorDependentCompositingInputs::opacity_ancestor`].
    pub fn opacity_ancestor(&self) -> Option<LayerId> {
        self.ancestor_dependent_compositing_inputs().opacity_ancestor
    }

    /// See [`AncestorDependentCompositingInputs::transform_ancestor`].
    pub fn transform_ancestor(&self) -> Option<LayerId> {
        self.ancestor_dependent_compositing_inputs()
            .transform_ancestor
    }

    /// See [`AncestorDependentCompositingInputs::clip_parent`].
    pub fn clip_parent(&self) -> Option<LayerId> {
        self.ancestor_dependent_compositing_inputs().clip_parent
    }

    /// See [`AncestorDependentCompositingInputs::scroll_parent`].
    pub fn scroll_parent(&self) -> Option<LayerId> {
        self.ancestor_dependent_compositing_inputs().scroll_parent
    }

    /// See [`AncestorDependentCompositingInputs::unclipped_absolute_bounding_box`].
    pub fn unclipped_absolute_bounding_box(&self) -> Rect {
        self.ancestor_dependent_compositing_inputs()
            .unclipped_absolute_bounding_box
    }

    /// See [`AncestorDependentCompositingInputs::clipped_absolute_bounding_box`].
    pub fn clipped_absolute_bounding_box(&self) -> Rect {
        self.ancestor_dependent_compositing_inputs()
            .clipped_absolute_bounding_box
    }

    /// How this layer reaches the screen.
    pub fn compositing_state(&self, _: CompositingQueryPermit) -> CompositingState {
        self.compositing_state
    }

    /// Why this layer is composited.
    pub fn compositing_reasons(&self, _: CompositingQueryPermit) -> CompositingReasons {
        self.compositing_reasons
    }

    /// The compositor layers backing this layer, if it paints into its own backing.
    pub fn composited_layer_mapping(
        &self,
        _: CompositingQueryPermit,
    ) -> Option<&CompositedLayerMapping> {
        self.mapping.as_ref()
    }

    /// For layers painting into a grouped backing, the layer owning that backing.
    pub fn squashing_owner(&self, _: CompositingQueryPermit) -> Option<LayerId> {
        self.squashing_owner
    }
}

// --- MARK: COMPOSITING INPUTS
impl PaintLayer {
    /// Write the inputs computed by the top-down update.
    pub(crate) fn update_ancestor_dependent_compositing_inputs(
        &mut self,
        inputs: AncestorDependentCompositingInputs,
        _: &InputsUpdateToken,
    ) {
        self.ancestor_inputs = inputs;
    }

    pub(crate) fn update_ancestor_overflow_layer(
        &mut self,
        layer: Option<LayerId>,
        _: &InputsUpdateToken,
    ) {
        self.ancestor_overflow_layer = layer;
    }

    /// Clears both dirty bits, once the subtree has been processed.
    pub(crate) fn did_update_compositing_inputs(&mut self, _: &InputsUpdateToken) {
        self.needs_compositing_inputs_update = false;
        self.child_needs_compositing_inputs_update = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Overflow, Position};

    fn layer(style: BoxStyle) -> PaintLayer {
        PaintLayer::new(
            FrameId::next(),
            BoxId::next(),
            BoxKind::Block,
            LayerType::Normal,
            style,
            Size::new(100., 80.),
        )
    }

    #[test]
    fn clip_rect_intersects_every_clip() {
        assert_eq!(layer(BoxStyle::default()).clip_rect(), None);

        let overflow = layer(BoxStyle {
            overflow_x: Overflow::Hidden,
            overflow_y: Overflow::Hidden,
            ..BoxStyle::positioned(Position::Relative)
        });
        assert_eq!(overflow.clip_rect(), Some(Rect::new(0., 0., 100., 80.)));

        let both = layer(BoxStyle {
            overflow_x: Overflow::Hidden,
            overflow_y: Overflow::Hidden,
            clip_path: Some(Rect::new(50., -20., 150., 40.)),
            ..BoxStyle::positioned(Position::Relative)
        });
        assert_eq!(both.clip_rect(), Some(Rect::new(50., 0., 100., 40.)));
    }
}
