// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The compositing assignment pass: decides which layers get compositor backings.
//!
//! Layers with a direct reason paint into their own backing. Layers that overlap
//! composited content painted before them are squashed into the most recent backing,
//! so they stay on top of what they overlap. Everything else paints into an ancestor.

use std::time::Duration;

use hashbrown::{HashMap, HashSet};
use kurbo::Rect;
use tracing::{debug, info_span};

use crate::app::{CompositorProxy, Frame, FrameTree, PageOptions};
use crate::core::{
    CompositedLayerMapping, CompositingReasons, CompositingState, FrameId, LayerHandle, LayerId,
    Position,
};
use crate::passes::enter_span_if;
use crate::util::rects_intersect;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Decision {
    state: CompositingState,
    reasons: CompositingReasons,
    squashing_owner: Option<LayerId>,
}

/// Walks one frame in paint order.
struct AssignmentWalk<'a> {
    frame: &'a Frame,
    frame_composited: bool,
    direct_reasons: HashMap<LayerId, CompositingReasons>,
    /// Clipped absolute bounds of the composited layers visited so far.
    overlap_map: Vec<(LayerId, Rect)>,
    latest_owner: Option<LayerId>,
    decisions: Vec<(LayerId, Decision)>,
    trace: bool,
}

/// Assigns backings in every frame, child frames first.
///
/// A frame owner is composited when the frame it hosts is, so child frames go first.
pub(crate) fn run_compositing_assignment_pass(
    frames: &mut FrameTree,
    compositor: &mut CompositorProxy,
    options: &PageOptions,
    now: Duration,
    trace: bool,
) {
    let _span = info_span!("compositing_assignment").entered();
    let mut ids = frames.ids();
    ids.reverse();
    for id in ids {
        let composited_children: HashSet<FrameId> = frames
            .frame(id)
            .children()
            .iter()
            .copied()
            .filter(|child| frames.get(*child).is_some_and(Frame::is_composited))
            .collect();
        let frame = frames.frame_mut(id);
        assign_frame(frame, &composited_children, compositor, options, now, trace);
    }
}

fn assign_frame(
    frame: &mut Frame,
    composited_children: &HashSet<FrameId>,
    compositor: &mut CompositorProxy,
    options: &PageOptions,
    now: Duration,
    trace: bool,
) {
    frame.layers.update_z_order_lists();
    let root = frame.layers.root();
    for id in frame.layers.ids() {
        let layer = frame.layers.layer_mut(id);
        let needs_composited_scrolling = !layer.is_root()
            && layer.scrolls_overflow()
            && (options.prefer_composited_scrolling || layer.style().prefer_composited_scrolling);
        if let Some(area) = layer.scrollable_area_mut() {
            area.needs_composited_scrolling = needs_composited_scrolling;
        }
    }

    let direct_reasons: HashMap<LayerId, CompositingReasons> = frame
        .layers
        .ids()
        .into_iter()
        .map(|id| (id, direct_reasons(frame, id, composited_children, options)))
        .collect();
    let frame_composited = frame.is_main_frame()
        || direct_reasons
            .values()
            .any(|reasons| reasons.intersects(CompositingReasons::DIRECT));

    let mut walk = AssignmentWalk {
        frame,
        frame_composited,
        direct_reasons,
        overlap_map: Vec::new(),
        latest_owner: None,
        decisions: Vec::new(),
        trace,
    };
    walk.visit(root);
    let decisions = walk.decisions;

    apply_decisions(frame, &decisions, compositor, now);
    frame.composited = frame_composited;
    debug!(
        frame = frame.id().trace(),
        composited = frame_composited,
        own_backings = decisions
            .iter()
            .filter(|(_, decision)| decision.state == CompositingState::PaintsIntoOwnBacking)
            .count(),
        "Assigned compositing"
    );
}

/// Reasons for a layer to have a backing of its own, or to be squashed regardless of overlap.
fn direct_reasons(
    frame: &Frame,
    id: LayerId,
    composited_children: &HashSet<FrameId>,
    options: &PageOptions,
) -> CompositingReasons {
    let layers = &frame.layers;
    let layer = layers.layer(id);
    let style = layer.style();
    let mut reasons = CompositingReasons::empty();
    if style.transform.is_some_and(|transform| transform.is_3d()) {
        reasons |= CompositingReasons::TRANSFORM_3D;
    }
    if style.preserves_3d {
        reasons |= CompositingReasons::PRESERVE_3D;
    }
    if style.will_change_transform {
        reasons |= CompositingReasons::WILL_CHANGE_TRANSFORM;
    }
    if layer
        .scrollable_area()
        .is_some_and(|area| area.needs_composited_scrolling())
    {
        reasons |= CompositingReasons::OVERFLOW_SCROLLING;
    }
    // Fixed layers only need to move on the compositor if the document scrolls.
    if options.accelerated_compositing_for_fixed_position
        && style.position == Position::Fixed
        && layers.parent_layer_on_containing_block_chain(id) == Some(layers.root())
        && layers.layer(layers.root()).scrolls_overflow()
    {
        reasons |= CompositingReasons::FIXED_POSITION;
    }
    if layer
        .child_frame()
        .is_some_and(|child| composited_children.contains(&child))
    {
        reasons |= CompositingReasons::IFRAME;
    }
    if style.assumed_overlap {
        reasons |= CompositingReasons::ASSUMED_OVERLAP;
    }
    reasons
}

impl AssignmentWalk<'_> {
    fn visit(&mut self, id: LayerId) {
        let _span = enter_span_if(self.trace, self.frame.layers.layer(id));
        self.assign(id);
        for child in self.frame.layers.stacking_children(id) {
            self.visit(child);
        }
    }

    fn assign(&mut self, id: LayerId) {
        let layers = &self.frame.layers;
        let layer = layers.layer(id);
        if layer.is_root() {
            let decision = if self.frame_composited {
                self.latest_owner = Some(id);
                Decision {
                    state: CompositingState::PaintsIntoOwnBacking,
                    reasons: CompositingReasons::ROOT | self.direct_reasons[&id],
                    squashing_owner: None,
                }
            } else {
                Decision {
                    state: CompositingState::NotComposited,
                    reasons: CompositingReasons::empty(),
                    squashing_owner: None,
                }
            };
            self.decisions.push((id, decision));
            return;
        }

        let mut reasons = self.direct_reasons.get(&id).copied().unwrap_or_default();
        let bounds = layer.ancestor_inputs_unchecked().clipped_absolute_bounding_box;
        let overlaps = self.overlap_map.iter().any(|(other, other_bounds)| {
            !layers.is_ancestor_of(*other, id) && rects_intersect(*other_bounds, bounds)
        });
        if overlaps {
            reasons |= CompositingReasons::OVERLAP;
        }

        let decision = if reasons.intersects(CompositingReasons::DIRECT) {
            self.latest_owner = Some(id);
            Decision {
                state: CompositingState::PaintsIntoOwnBacking,
                reasons,
                squashing_owner: None,
            }
        } else if let (true, true, Some(owner)) = (
            reasons.intersects(CompositingReasons::SQUASHABLE),
            layer.is_self_painting_layer(),
            self.latest_owner,
        ) {
            Decision {
                state: CompositingState::PaintsIntoGroupedBacking,
                reasons,
                squashing_owner: Some(owner),
            }
        } else {
            Decision {
                state: CompositingState::NotComposited,
                reasons: CompositingReasons::empty(),
                squashing_owner: None,
            }
        };
        if decision.state.is_composited() {
            self.overlap_map.push((id, bounds));
        }
        self.decisions.push((id, decision));
    }
}

/// Writes the decisions to the layers and reconciles their compositor layers.
fn apply_decisions(
    frame: &mut Frame,
    decisions: &[(LayerId, Decision)],
    compositor: &mut CompositorProxy,
    now: Duration,
) {
    let squashing_owners: HashSet<LayerId> = decisions
        .iter()
        .filter_map(|(_, decision)| decision.squashing_owner)
        .collect();
    let mut stale_handles: Vec<LayerHandle> = Vec::new();

    for (id, decision) in decisions {
        let layer = frame.layers.layer_mut(*id);
        layer.compositing_state = decision.state;
        layer.compositing_reasons = decision.reasons;
        layer.squashing_owner = decision.squashing_owner;

        let old_mapping = layer.mapping.take();
        let new_mapping = (decision.state == CompositingState::PaintsIntoOwnBacking).then(|| {
            let needs_scroll_layers = layer.is_root()
                || decision
                    .reasons
                    .contains(CompositingReasons::OVERFLOW_SCROLLING);
            let main = old_mapping.map_or_else(|| compositor.create_layer(), |old| old.main);
            if old_mapping.is_none_or(|old| old.bounds != layer.size()) {
                compositor.set_layer_bounds(main, layer.size());
            }
            let mut reuse_or_create = |handle: Option<LayerHandle>| {
                handle.unwrap_or_else(|| compositor.create_layer())
            };
            let (scroll_clip, scrolling_contents) = if needs_scroll_layers {
                (
                    Some(reuse_or_create(old_mapping.and_then(|old| old.scroll_clip))),
                    Some(reuse_or_create(
                        old_mapping.and_then(|old| old.scrolling_contents),
                    )),
                )
            } else {
                (None, None)
            };
            let squashing = squashing_owners
                .contains(id)
                .then(|| reuse_or_create(old_mapping.and_then(|old| old.squashing)));
            CompositedLayerMapping {
                main,
                scroll_clip,
                scrolling_contents,
                squashing,
                bounds: layer.size(),
            }
        });
        if let Some(old_mapping) = old_mapping {
            stale_handles.extend(old_mapping.handles().filter(|handle| {
                !new_mapping.is_some_and(|new| new.handles().any(|kept| kept == *handle))
            }));
        }
        layer.mapping = new_mapping;

        let uses_composited_scrolling = !layer.is_root()
            && decision.state == CompositingState::PaintsIntoOwnBacking
            && decision
                .reasons
                .contains(CompositingReasons::OVERFLOW_SCROLLING);
        let scroll_layer = new_mapping.and_then(|mapping| mapping.scrolling_contents);
        if let Some(area) = layer.scrollable_area_mut() {
            if area.state.scroll_layer != scroll_layer {
                // Animations on the old scroll layer can't continue on the compositor.
                area.with_animator(compositor, now, |animator, ctx| {
                    animator.take_over_compositor_animation(ctx);
                });
                area.state.scroll_layer = scroll_layer;
            }
            area.uses_composited_scrolling = uses_composited_scrolling;
        }
    }

    for handle in stale_handles {
        compositor.destroy_layer(handle);
    }
}
