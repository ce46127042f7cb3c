// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! This crate implements an arena-allocated tree for use in Lamina.
//!
//! Items are addressed by stable [`NodeId`]s chosen by the caller. Each node stores
//! intrusive links to its parent, its first and last child, and its previous and next
//! sibling, so that child order is preserved and siblings can be walked without
//! touching the parent.
//!
//! The arena never hands out references that outlive a structural mutation: all
//! relationships are expressed as ids and must be re-queried after the tree changes.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET

/// The id type used to address items of a [`TreeArena`].
pub type NodeId = u64;

mod ordered_tree;

pub use ordered_tree::*;
