// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! A headless host for a Lamina page.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use lamina_core::app::{
    CompositorCommand, CompositorEvent, Page, PageOptions, ScrollAnimationRequest,
    try_init_test_tracing,
};
use lamina_core::core::{
    AnimationGroupId, BoxId, BoxKind, BoxStyle, FrameId, LayerHandle, LayerId,
};
use lamina_core::kurbo::{Rect, Size, Vec2};
use tracing::debug;

/// A [`Page`] with a fake compositor and a manual clock.
///
/// Every [`CompositorCommand`] the page posts is recorded. Tests drive the page through
/// [`page_mut`](Self::page_mut), bring it up to date with [`update`](Self::update), and
/// inspect the commands with [`take_commands`](Self::take_commands).
///
/// Time only moves when the test says so, with [`animate_ms`](Self::animate_ms).
/// The compositor never acts on its own either: finishing animations and compositor
/// scrolls are simulated with [`finish_animation`](Self::finish_animation) and
/// [`compositor_scroll`](Self::compositor_scroll).
pub struct TestHarness {
    page: Page,
    log: Rc<RefCell<Vec<CompositorCommand>>>,
    /// Index of the first command not returned by [`Self::take_commands`] yet.
    taken: usize,
    now: Duration,
}

/// Parameters for creating a [`TestHarness`].
#[derive(Debug, Clone)]
pub struct TestHarnessParams {
    /// The size of the main document.
    /// Defaults to [`Self::DEFAULT_DOCUMENT_SIZE`].
    pub document_size: Size,
    /// Options for the page. The viewport defaults to [`Self::DEFAULT_VIEWPORT_SIZE`].
    pub options: PageOptions,
}

impl TestHarnessParams {
    /// Default viewport size for tests.
    pub const DEFAULT_VIEWPORT_SIZE: Size = Size::new(800., 600.);
    /// Default document size for tests. It scrolls vertically.
    pub const DEFAULT_DOCUMENT_SIZE: Size = Size::new(800., 2000.);
}

impl Default for TestHarnessParams {
    fn default() -> Self {
        Self {
            document_size: Self::DEFAULT_DOCUMENT_SIZE,
            options: PageOptions {
                viewport_size: Self::DEFAULT_VIEWPORT_SIZE,
                ..PageOptions::default()
            },
        }
    }
}

impl TestHarness {
    /// Builds a harness for a page with an empty document of the given size.
    pub fn create(document_size: Size) -> Self {
        Self::create_with(TestHarnessParams {
            document_size,
            ..Default::default()
        })
    }

    /// Builds a harness for a page with the given options.
    pub fn create_with_options(options: PageOptions) -> Self {
        Self::create_with(TestHarnessParams {
            options,
            ..Default::default()
        })
    }

    /// Builds a harness with the given parameters.
    pub fn create_with(params: TestHarnessParams) -> Self {
        // Swallow the error if a subscriber is already set, e.g. by another harness.
        let _ = try_init_test_tracing();

        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let page = Page::new(
            params.document_size,
            move |command| sink.borrow_mut().push(command),
            params.options,
        );
        Self {
            page,
            log,
            taken: 0,
            now: Duration::ZERO,
        }
    }

    // --- MARK: PAGE

    /// The page under test.
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// The page under test, for changes.
    ///
    /// Changes are not applied until the next [`update`](Self::update).
    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    /// The main frame.
    pub fn main_frame(&self) -> FrameId {
        self.page.main_frame()
    }

    /// The root box of a frame.
    #[track_caller]
    pub fn root_box(&self, frame: FrameId) -> BoxId {
        self.page.frame(frame).layout().root()
    }

    /// Appends a box to `parent` in the main frame, at `rect` relative to its container.
    #[track_caller]
    pub fn add_box(&mut self, parent: BoxId, kind: BoxKind, rect: Rect, style: BoxStyle) -> BoxId {
        let frame = self.main_frame();
        self.add_box_in(frame, parent, kind, rect, style)
    }

    /// Appends a box to `parent` in `frame`, at `rect` relative to its container.
    #[track_caller]
    pub fn add_box_in(
        &mut self,
        frame: FrameId,
        parent: BoxId,
        kind: BoxKind,
        rect: Rect,
        style: BoxStyle,
    ) -> BoxId {
        self.page
            .insert_box(frame, parent, None, kind, rect.origin(), rect.size(), style)
    }

    /// The layer of a box.
    ///
    /// ## Panics
    ///
    /// If the box has no layer.
    #[track_caller]
    pub fn layer_of(&self, frame: FrameId, id: BoxId) -> LayerId {
        match self.page.frame(frame).layout().layout_box(id).layer() {
            Some(layer) => layer,
            None => panic!("{id} has no layer"),
        }
    }

    /// The compositor layer `layer` scrolls, once it uses composited scrolling.
    #[track_caller]
    pub fn scroll_layer_of(&self, frame: FrameId, layer: LayerId) -> Option<LayerHandle> {
        self.page
            .scrollable_area(frame, layer)
            .and_then(|area| area.layer_for_scrolling())
    }

    // --- MARK: TIME

    /// The harness clock.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Runs a lifecycle update without moving the clock.
    pub fn update(&mut self) {
        self.page.update_lifecycle(self.now);
    }

    /// Moves the clock forward by `ms` milliseconds and runs an animation frame.
    pub fn animate_ms(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.page.animate(self.now);
    }

    // --- MARK: COMPOSITOR

    /// Returns the commands posted since the last call.
    pub fn take_commands(&mut self) -> Vec<CompositorCommand> {
        let log = self.log.borrow();
        let commands = log[self.taken..].to_vec();
        self.taken = log.len();
        commands
    }

    /// Every command posted since the harness was created.
    pub fn all_commands(&self) -> Vec<CompositorCommand> {
        self.log.borrow().clone()
    }

    /// The scroll animations the compositor would be running now.
    pub fn running_compositor_animations(&self) -> Vec<ScrollAnimationRequest> {
        let compositor = self.page.compositor();
        self.log
            .borrow()
            .iter()
            .filter_map(|command| match command {
                CompositorCommand::AddScrollAnimation(request)
                    if compositor.is_animation_running(request.ids.animation) =>
                {
                    Some(request.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Reports an animation group as finished, as the compositor would.
    pub fn finish_animation(&mut self, group: AnimationGroupId) {
        debug!(%group, "Finishing compositor animation");
        self.page
            .dispatch_compositor_event(CompositorEvent::AnimationFinished { group });
    }

    /// Reports an animation group as aborted, as the compositor would.
    pub fn abort_animation(&mut self, group: AnimationGroupId) {
        self.page
            .dispatch_compositor_event(CompositorEvent::AnimationAborted { group });
    }

    /// Reports that the compositor scrolled `layer` to `offset`.
    pub fn compositor_scroll(&mut self, layer: LayerHandle, offset: Vec2) {
        self.page
            .dispatch_compositor_event(CompositorEvent::DidScroll { layer, offset });
    }
}
