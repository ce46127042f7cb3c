// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Lamina Core turns a laid-out box tree into composited layers, and keeps the
//! compositor's scrolling state in sync with it.
//!
//! The engine is organised around a handful of trees and passes:
//!
//! - The **layout tree** ([`LayoutTree`](core::LayoutTree)) is the input: positioned,
//!   sized and styled boxes, produced by some external layout engine.
//! - The **paint layer tree** ([`LayerTree`](core::LayerTree)) is a sparse tree derived from
//!   the layout tree. A box gets a [`PaintLayer`](core::PaintLayer) if it is positioned,
//!   transformed, translucent, clips its overflow, or otherwise needs its own painting context.
//! - The **passes** walk the layer tree to compute positions, the ancestor-dependent
//!   *compositing inputs*, the compositing decision itself and hit-test results.
//! - The **scrolling** module translates the outcome into compositor scroll state:
//!   main-thread scrolling reasons, the non-fast-scrollable region, touch handler regions,
//!   and smooth scroll animations.
//!
//! Everything is owned by a [`Page`](app::Page), which is the composition root and drives
//! the document lifecycle. The compositor is never called directly: every request is a
//! [`CompositorCommand`](app::CompositorCommand) handed to a sink, and the compositor answers
//! with [`CompositorEvent`](app::CompositorEvent)s.
//!
//! ## Logging
//!
//! Lamina uses [`tracing`] throughout. Each pass opens a span, and detailed per-layer spans
//! can be turned on with the `LAMINA_TRACE_PASSES` environment variable. A reasonable
//! default subscriber is provided in [`app::try_init_tracing`].

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET

pub use kurbo;

#[macro_use]
pub mod util;

pub mod app;
pub mod core;
pub mod scrolling;

mod passes;
