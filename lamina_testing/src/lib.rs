// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Headless runner for testing [Lamina](https://docs.rs/lamina_core/latest/) pages.
//!
//! The primary type from this crate is [`TestHarness`], which hosts a page with a recording
//! compositor and a manual clock.
//!
//! The testing harness can:
//!
//! - Build documents box by box, including nested frames.
//! - Control the flow of time (i.e. for testing scroll animations).
//! - Record every command sent to the compositor, and play the compositor's side:
//!   finishing or aborting animations and scrolling layers.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![expect(missing_debug_implementations, reason = "Deferred: Noisy")]

mod assert_debug_panics;
mod harness;

pub use assert_debug_panics::assert_debug_panics_inner;
pub use harness::{TestHarness, TestHarnessParams};
