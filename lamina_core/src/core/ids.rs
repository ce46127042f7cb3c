// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Stable identifiers for boxes, layers and frames.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::field::DisplayValue;
use tree_arena::NodeId;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Allocate a new, unique id.
            pub(crate) fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                let id = COUNTER.fetch_add(1, Ordering::Relaxed);
                Self(id.try_into().unwrap())
            }

            /// Rebuild an id from an arena key.
            pub(crate) fn from_node(id: NodeId) -> Self {
                Self(NonZeroU64::new(id).expect("arena keys are never zero"))
            }

            /// Returns the integer value of the id.
            pub fn to_raw(self) -> u64 {
                self.0.get()
            }

            /// Returns a value for use in tracing fields.
            pub fn trace(self) -> DisplayValue<Self> {
                tracing::field::display(self)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A unique identifier for a box of a [`LayoutTree`](crate::core::LayoutTree).
    ///
    /// Ids are unique across every frame of the process.
    BoxId,
    "box"
);

define_id!(
    /// A unique identifier for a [`PaintLayer`](crate::core::PaintLayer).
    LayerId,
    "layer"
);

define_id!(
    /// A unique identifier for a [`Frame`](crate::app::Frame).
    FrameId,
    "frame"
);

define_id!(
    /// A handle to a layer owned by the compositor.
    ///
    /// Handles are allocated on the main thread, so that commands referring to a new
    /// layer can be posted without waiting for the compositor.
    LayerHandle,
    "cc"
);

define_id!(
    /// Identifies one compositor animation.
    AnimationId,
    "anim"
);

define_id!(
    /// Identifies a group of compositor animations that finish together.
    ///
    /// Completion is reported per group.
    AnimationGroupId,
    "group"
);

/// A layer of a specific frame.
///
/// Layer ids are unique across the page, but most lookups need the frame's tree,
/// so the frame travels with the layer.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct LayerRef {
    /// The frame whose layer tree holds the layer.
    pub frame: FrameId,
    /// The layer itself.
    pub layer: LayerId,
}

impl LayerRef {
    /// Build a new reference.
    pub fn new(frame: FrameId, layer: LayerId) -> Self {
        Self { frame, layer }
    }
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.frame, self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_round_trip_through_arena_keys() {
        let a = LayerId::next();
        let b = LayerId::next();
        assert_ne!(a, b);
        assert_eq!(LayerId::from_node(a.into()), a);
        assert_eq!(a.to_string(), format!("layer#{}", a.to_raw()));
    }
}
