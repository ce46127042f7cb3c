// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;

use crate::core::{LayerId, LayerTree};

/// The z-order lists of a stacking context.
///
/// Stacked descendants are collected through descendants that aren't stacking contexts
/// themselves, and sorted by z-index. The sort is stable, so layers with equal z-index
/// stay in tree order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZOrderLists {
    /// Stacked descendants with a negative z-index, back to front.
    pub negative: Vec<LayerId>,
    /// Stacked descendants with a zero, `auto` or positive z-index, back to front.
    pub positive: Vec<LayerId>,
}

/// Cached z-order lists of a layer.
///
/// Lists are rebuilt lazily: structural or z-index changes only mark them dirty.
#[derive(Clone, Debug)]
pub(crate) struct StackingNode {
    pub(crate) z_order_lists_dirty: bool,
    pub(crate) lists: ZOrderLists,
}

impl Default for StackingNode {
    fn default() -> Self {
        Self {
            z_order_lists_dirty: true,
            lists: ZOrderLists::default(),
        }
    }
}

impl StackingNode {
    pub(crate) fn dirty_z_order_lists(&mut self) {
        self.z_order_lists_dirty = true;
    }
}

impl LayerTree {
    /// Returns the z-order lists of a stacking context.
    ///
    /// Returns empty lists for layers that aren't stacking contexts. If the cached lists
    /// are dirty, fresh lists are computed without updating the cache.
    pub fn z_order_lists(&self, id: LayerId) -> Cow<'_, ZOrderLists> {
        let layer = self.layer(id);
        if !layer.is_stacking_context() {
            return Cow::Owned(ZOrderLists::default());
        }
        if layer.stacking.z_order_lists_dirty {
            Cow::Owned(self.collect_z_order_lists(id))
        } else {
            Cow::Borrowed(&layer.stacking.lists)
        }
    }

    /// Rebuilds the cached z-order lists of every dirty stacking context.
    pub(crate) fn update_z_order_lists(&mut self) {
        let dirty: Vec<LayerId> = self
            .iter()
            .filter(|layer| layer.is_stacking_context() && layer.stacking.z_order_lists_dirty)
            .map(|layer| layer.id())
            .collect();
        for id in dirty {
            let lists = self.collect_z_order_lists(id);
            let stacking = &mut self.layer_mut(id).stacking;
            stacking.lists = lists;
            stacking.z_order_lists_dirty = false;
        }
    }

    /// Children that aren't stacked, in tree order.
    pub fn normal_flow_children(&self, id: LayerId) -> Vec<LayerId> {
        self.children(id)
            .filter(|child| !self.layer(*child).is_stacked())
            .collect()
    }

    /// Every layer painted as part of this layer's stacking order, back to front:
    /// negative z-order list, normal flow children, then positive z-order list.
    pub fn stacking_children(&self, id: LayerId) -> Vec<LayerId> {
        let lists = self.z_order_lists(id);
        let mut children = lists.negative.clone();
        children.extend(self.normal_flow_children(id));
        children.extend(lists.positive.iter().copied());
        children
    }

    /// Marks the z-order lists of the stacking context containing `id` as dirty.
    pub(crate) fn dirty_stacking_context_z_order_lists(&mut self, id: LayerId) {
        if let Some(context) = self.ancestor_stacking_context(id) {
            self.layer_mut(context).stacking.dirty_z_order_lists();
        }
    }

    fn collect_z_order_lists(&self, id: LayerId) -> ZOrderLists {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for child in self.children(id) {
            self.collect_layers(child, &mut positive, &mut negative);
        }
        positive.sort_by_key(|layer| self.layer(*layer).z_index());
        negative.sort_by_key(|layer| self.layer(*layer).z_index());
        ZOrderLists { negative, positive }
    }

    fn collect_layers(
        &self,
        id: LayerId,
        positive: &mut Vec<LayerId>,
        negative: &mut Vec<LayerId>,
    ) {
        let layer = self.layer(id);
        if layer.is_stacked() {
            if layer.z_index() >= 0 {
                positive.push(id);
            } else {
                negative.push(id);
            }
        }
        if !layer.is_stacking_context() {
            for child in self.children(id) {
                self.collect_layers(child, positive, negative);
            }
        }
    }
}
