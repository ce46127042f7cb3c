// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Types needed for embedding Lamina in a host.

mod compositor;
mod frame;
mod page;
mod tracing_backend;

pub use compositor::{
    CompositorCommand, CompositorEvent, CompositorProxy, PositionConstraint, ScrollAnimationIds,
    ScrollAnimationRequest,
};
pub use frame::{Frame, FrameTree, FrameView};
pub use page::{DocumentLifecycle, Page, PageOptions};
pub use tracing_backend::{
    TracingSubscriberHasBeenSetError, default_tracing_subscriber, try_init_test_tracing,
    try_init_tracing,
};

pub use crate::passes::hit_test::HitTestResult;
