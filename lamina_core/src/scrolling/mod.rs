// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Keeping the compositor's scrolling state in sync with the layer trees.
//!
//! The [`ScrollingCoordinator`] runs at the end of every lifecycle update. It decides
//! which scrolls the compositor may handle on its own, and which must be sent to the
//! main thread, and pushes the result as [`MainThreadScrollingReasons`], the
//! non-fast-scrollable region, and touch event handler regions.
//!
//! Smooth scrolls are run by a [`ScrollAnimator`] per scrollable area.

mod animator;
mod coordinator;
mod curve;
mod main_thread_reasons;
mod touch_rects;

pub use animator::{RunState, ScrollAnimator};
pub use coordinator::ScrollingCoordinator;
pub use curve::{CubicBezierTiming, DurationBehavior, ScrollOffsetAnimationCurve};
pub use main_thread_reasons::MainThreadScrollingReasons;
pub use touch_rects::{EventHandlerRegistry, LayerHitTestRects, TouchTarget};

pub(crate) use animator::AnimatorCtx;
pub(crate) use touch_rects::{compute_touch_event_target_rects, project_rects_to_graphics_layers};
