// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The subset of computed style the layer machinery reads.

use kurbo::{Affine, Insets, Rect, Vec2};

/// The CSS `position` of a box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Position {
    /// In normal flow.
    #[default]
    Static,
    /// In flow, shifted by [`BoxStyle::relative_offset`].
    Relative,
    /// Out of flow, positioned against the nearest positioned ancestor.
    Absolute,
    /// Out of flow, positioned against the viewport (or a transformed ancestor).
    Fixed,
    /// In flow, shifted to stay within its scroller's visible rect.
    Sticky,
}

impl Position {
    /// Returns `true` for anything but [`Position::Static`].
    pub fn is_positioned(self) -> bool {
        self != Self::Static
    }

    /// Returns `true` for absolute and fixed positioning.
    pub fn is_out_of_flow(self) -> bool {
        matches!(self, Self::Absolute | Self::Fixed)
    }

    /// Returns `true` for relative and sticky positioning.
    pub fn is_in_flow_positioned(self) -> bool {
        matches!(self, Self::Relative | Self::Sticky)
    }
}

/// The CSS `overflow` of a box, along one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Overflow {
    /// Overflowing content is painted.
    #[default]
    Visible,
    /// Overflowing content is clipped, and can only be scrolled programmatically.
    Hidden,
    /// Overflowing content is clipped and the user can always scroll.
    Scroll,
    /// Overflowing content is clipped and the user can scroll if there is overflow.
    Auto,
}

impl Overflow {
    /// Whether this value clips overflowing content.
    pub fn clips(self) -> bool {
        self != Self::Visible
    }

    /// Whether the user may scroll along this axis.
    pub fn is_user_scrollable(self) -> bool {
        matches!(self, Self::Scroll | Self::Auto)
    }
}

/// A transform applied to a box.
///
/// The engine models 3D as a 2D affine plus a translation along the z axis.
/// This is enough to decide 3D compositing and to depth-sort hit tests inside
/// a `preserve-3d` context. The affine is expressed relative to the box's
/// top-left corner, with any transform origin already folded in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerTransform {
    /// The planar part of the transform.
    pub affine: Affine,
    /// The translation along the z axis.
    pub translate_z: f64,
}

impl LayerTransform {
    /// A purely planar transform.
    pub fn planar(affine: Affine) -> Self {
        Self {
            affine,
            translate_z: 0.,
        }
    }

    /// A translation along the z axis only.
    pub fn translate_z(z: f64) -> Self {
        Self {
            affine: Affine::IDENTITY,
            translate_z: z,
        }
    }

    /// Whether the transform has a 3D component.
    pub fn is_3d(&self) -> bool {
        self.translate_z != 0.
    }
}

/// The `top`, `right`, `bottom` and `left` insets of a positioned box.
///
/// `None` stands for `auto`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxOffsets {
    /// The `left` inset.
    pub left: Option<f64>,
    /// The `top` inset.
    pub top: Option<f64>,
    /// The `right` inset.
    pub right: Option<f64>,
    /// The `bottom` inset.
    pub bottom: Option<f64>,
}

/// One fragment of a paginated (multi-column) box.
///
/// Content of a paginated box is laid out in a single tall *flow thread*, which is then
/// cut into fragments and shifted into place.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment {
    /// The part of the flow thread this fragment shows, in the paginated box's coordinates.
    pub flow_clip: Rect,
    /// The offset from the flow thread position to the visual position of the fragment.
    pub translation: Vec2,
}

impl Fragment {
    /// The rect this fragment covers on screen, in the paginated box's coordinates.
    pub fn visual_rect(&self) -> Rect {
        self.flow_clip + self.translation
    }
}

/// Computed style of a box, as far as layers are concerned.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxStyle {
    /// CSS `position`.
    pub position: Position,
    /// CSS `top`/`right`/`bottom`/`left`.
    ///
    /// Used for sticky constraints and to anchor fixed-position layers on the compositor.
    pub offsets: BoxOffsets,
    /// CSS `z-index`. `None` stands for `auto`.
    pub z_index: Option<i32>,
    /// CSS `opacity`.
    pub opacity: f32,
    /// CSS `transform`.
    pub transform: Option<LayerTransform>,
    /// CSS `transform-style: preserve-3d`.
    pub preserves_3d: bool,
    /// How far CSS `filter` effects paint outside the border box.
    ///
    /// `Some` means the box has a filter, even if the outsets are zero.
    pub filter_outsets: Option<Insets>,
    /// CSS `overflow-x`.
    pub overflow_x: Overflow,
    /// CSS `overflow-y`.
    pub overflow_y: Overflow,
    /// CSS `clip-path`, approximated by its bounding box in local coordinates.
    pub clip_path: Option<Rect>,
    /// The legacy CSS `clip` property, in local coordinates.
    ///
    /// Only honoured on out-of-flow positioned boxes.
    pub clip: Option<Rect>,
    /// CSS `visibility: visible`.
    pub visible: bool,
    /// CSS `float` other than `none`.
    pub is_floating: bool,
    /// The offset applied by relative positioning.
    pub relative_offset: Vec2,
    /// CSS `will-change: transform`.
    pub will_change_transform: bool,
    /// CSS `background-attachment: fixed`.
    pub background_attachment_fixed: bool,
    /// CSS `resize` other than `none`.
    pub has_resizer: bool,
    /// The box uses custom (styled) scrollbars.
    pub custom_scrollbar: bool,
    /// The author prefers this scroller to be scrolled on the compositor.
    pub prefer_composited_scrolling: bool,
    /// The box should be treated as overlapping anything painted before it.
    ///
    /// This is set for boxes whose position can change off the main thread,
    /// like the targets of accelerated animations.
    pub assumed_overlap: bool,
    /// Fragments, if this box paginates its content.
    pub fragments: Vec<Fragment>,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            position: Position::Static,
            offsets: BoxOffsets::default(),
            z_index: None,
            opacity: 1.0,
            transform: None,
            preserves_3d: false,
            filter_outsets: None,
            overflow_x: Overflow::Visible,
            overflow_y: Overflow::Visible,
            clip_path: None,
            clip: None,
            visible: true,
            is_floating: false,
            relative_offset: Vec2::ZERO,
            will_change_transform: false,
            background_attachment_fixed: false,
            has_resizer: false,
            custom_scrollbar: false,
            prefer_composited_scrolling: false,
            assumed_overlap: false,
            fragments: Vec::new(),
        }
    }
}

impl BoxStyle {
    /// Shorthand for a box with the given position.
    pub fn positioned(position: Position) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Shorthand for a box with overflow clipping along both axes.
    pub fn scroller(overflow: Overflow) -> Self {
        Self {
            overflow_x: overflow,
            overflow_y: overflow,
            ..Self::default()
        }
    }

    /// Whether the box is translucent.
    pub fn has_opacity(&self) -> bool {
        self.opacity < 1.0
    }

    /// Whether the box has a CSS filter.
    pub fn has_filter(&self) -> bool {
        self.filter_outsets.is_some()
    }

    /// Whether the box has a transform or otherwise establishes a transform context.
    pub fn has_transform_related_property(&self) -> bool {
        self.transform.is_some() || self.preserves_3d || self.will_change_transform
    }

    /// Whether the box clips its overflow along either axis.
    pub fn has_overflow_clip(&self) -> bool {
        self.overflow_x.clips() || self.overflow_y.clips()
    }

    /// Whether the legacy `clip` applies.
    pub fn has_clip(&self) -> bool {
        self.clip.is_some() && self.position.is_out_of_flow()
    }

    /// Whether the box clips its descendants in any way.
    pub fn has_clip_related_property(&self) -> bool {
        self.has_overflow_clip() || self.has_clip() || self.clip_path.is_some()
    }

    /// Whether the box paginates its content.
    pub fn is_paginated(&self) -> bool {
        !self.fragments.is_empty()
    }

    /// Whether the box establishes a stacking context.
    pub fn is_stacking_context(&self) -> bool {
        (self.position.is_positioned() && self.z_index.is_some())
            || self.position == Position::Fixed
            || self.position == Position::Sticky
            || self.has_opacity()
            || self.has_filter()
            || self.has_transform_related_property()
            || self.clip_path.is_some()
    }

    /// Whether the box takes part in z-ordering.
    ///
    /// Positioned boxes with `z-index: auto` are stacked without being stacking contexts.
    pub fn is_stacked(&self) -> bool {
        self.is_stacking_context() || self.position.is_positioned()
    }

    /// The z-index used to sort stacked boxes.
    pub fn effective_z_index(&self) -> i32 {
        self.z_index.unwrap_or(0)
    }

    /// Whether a box with this style must be contained by a transformed ancestor
    /// rather than the viewport when fixed-positioned.
    pub fn can_contain_fixed_position_objects(&self) -> bool {
        self.has_transform_related_property()
    }

    /// Whether a box with this style acts as the containing block of absolute descendants.
    pub fn can_contain_absolute_position_objects(&self) -> bool {
        self.position.is_positioned() || self.can_contain_fixed_position_objects()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_z_index_is_stacked_but_not_a_stacking_context() {
        let style = BoxStyle::positioned(Position::Absolute);
        assert!(style.is_stacked());
        assert!(!style.is_stacking_context());

        let style = BoxStyle {
            z_index: Some(0),
            ..BoxStyle::positioned(Position::Absolute)
        };
        assert!(style.is_stacking_context());
    }

    #[test]
    fn legacy_clip_needs_out_of_flow_positioning() {
        let clip = Some(Rect::new(0., 0., 10., 10.));
        let style = BoxStyle {
            clip,
            ..BoxStyle::positioned(Position::Relative)
        };
        assert!(!style.has_clip());
        let style = BoxStyle {
            clip,
            ..BoxStyle::positioned(Position::Absolute)
        };
        assert!(style.has_clip_related_property());
    }
}
