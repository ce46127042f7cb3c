// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Smooth scrolling.
//!
//! A [`ScrollAnimator`] owns at most one scroll animation for its scrollable area.
//! The animation is sent to the compositor when possible, and ticked on the main
//! thread otherwise. New input retargets the running animation instead of starting
//! a second one.
//!
//! Compositor animations are only changed during [`update_compositor_animations`],
//! which runs once compositing is clean. Everything else records what needs to happen
//! in the [`RunState`] and registers the area to be serviced.
//!
//! ## Transitions
//!
//! Events are: *scroll*, a user scroll to a new target; *update*, a call to
//! [`update_compositor_animations`]; *tick*; *done*, the compositor reporting the
//! animation as finished or aborted; *cancel*; *take over*; and *adjust*.
//! Events not listed for a state leave it unchanged.
//!
//! - `Idle`: scroll → `WaitingToSendToCompositor`.
//! - `WaitingToSendToCompositor`: update → `RunningOnCompositor`¹; cancel → `Idle`.
//! - `RunningOnMainThread`: tick → `PostAnimationCleanup`²; cancel → `PostAnimationCleanup`.
//! - `RunningOnCompositor`: scroll → `…ButNeedsUpdate`; done → `PostAnimationCleanup`;
//!   cancel → `WaitingToCancelOnCompositor`; take over → `…ButNeedsTakeover`;
//!   adjust → `…ButNeedsAdjustment`.
//! - `RunningOnCompositorButNeedsUpdate`: update → `RunningOnCompositor`¹;
//!   done → `PostAnimationCleanup`; cancel → `WaitingToCancelOnCompositor`;
//!   take over → `…ButNeedsTakeover`.
//! - `RunningOnCompositorButNeedsTakeover`: scroll → `…ButNeedsUpdate`;
//!   update → `RunningOnCompositor`¹; cancel → `WaitingToCancelOnCompositor`.
//! - `RunningOnCompositorButNeedsAdjustment`: scroll → `…ButNeedsUpdate`;
//!   update → `RunningOnCompositor`¹; done → `PostAnimationCleanup`;
//!   cancel → `WaitingToCancelOnCompositor`; take over → `…ButNeedsTakeover`.
//! - `WaitingToCancelOnCompositor`: scroll → `…ButNewScroll`; update → `Idle`;
//!   done → `PostAnimationCleanup`.
//! - `WaitingToCancelOnCompositorButNewScroll`: update → `RunningOnCompositor`¹;
//!   cancel → `WaitingToCancelOnCompositor`.
//! - `PostAnimationCleanup`: scroll → `WaitingToSendToCompositor`; update → `Idle`.
//!
//! ¹ Or `RunningOnMainThread` if the compositor can't run the animation, or `Idle` after
//! jumping to the target if the main thread can't schedule frames either.
//!
//! ² Once the curve has run its course.
//!
//! [`update_compositor_animations`]: ScrollAnimator::update_compositor_animations

use std::time::Duration;

use kurbo::Vec2;
use tracing::{debug, trace};

use crate::app::{CompositorProxy, ScrollAnimationIds};
use crate::core::{AnimationGroupId, ScrollGranularity, ScrollResult, ScrollType, ScrollableArea};
use crate::scrolling::{DurationBehavior, MainThreadScrollingReasons, ScrollOffsetAnimationCurve};

/// What an animator operation acts on.
pub(crate) struct AnimatorCtx<'a> {
    area: &'a mut dyn ScrollableArea,
    compositor: &'a mut CompositorProxy,
    now: Duration,
}

impl<'a> AnimatorCtx<'a> {
    pub(crate) fn new(
        area: &'a mut dyn ScrollableArea,
        compositor: &'a mut CompositorProxy,
        now: Duration,
    ) -> Self {
        Self {
            area,
            compositor,
            now,
        }
    }
}

/// Where a scroll animation is in its life cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RunState {
    /// No animation.
    #[default]
    Idle,
    /// An animation should be started on the next compositor update.
    WaitingToSendToCompositor,
    /// The animation is ticked by the main thread.
    RunningOnMainThread,
    /// The animation runs on the compositor.
    RunningOnCompositor,
    /// The compositor animation has to be replaced, because the target changed.
    RunningOnCompositorButNeedsUpdate,
    /// The compositor animation was aborted, and the main thread has to continue it.
    RunningOnCompositorButNeedsTakeover,
    /// The compositor animation has to be replaced, because the content under it moved.
    RunningOnCompositorButNeedsAdjustment,
    /// The compositor animation has to be aborted.
    WaitingToCancelOnCompositor,
    /// The compositor animation has to be aborted, but a new scroll wants to continue it.
    WaitingToCancelOnCompositorButNewScroll,
    /// The animation ended, and the main-thread scrolling reason it added has to be removed.
    PostAnimationCleanup,
}

/// Animates the scroll offset of one scrollable area.
#[derive(Clone, Debug, Default)]
pub struct ScrollAnimator {
    run_state: RunState,
    curve: Option<ScrollOffsetAnimationCurve>,
    target_offset: Vec2,
    /// When the current animation started. Retargeting keeps the start time.
    start_time: Duration,
    last_granularity: ScrollGranularity,
    compositor_animation: Option<ScrollAnimationIds>,
}

// --- MARK: GETTERS
impl ScrollAnimator {
    /// An idle animator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Whether an animation is going to move the offset.
    pub fn has_running_animation(&self) -> bool {
        !matches!(
            self.run_state,
            RunState::Idle | RunState::PostAnimationCleanup | RunState::WaitingToCancelOnCompositor
        )
    }

    /// Whether the animator needs
    /// [`update_compositor_animations`](Self::update_compositor_animations) to be called.
    pub fn has_animation_that_requires_service(&self) -> bool {
        !matches!(self.run_state, RunState::Idle | RunState::RunningOnCompositor)
    }

    /// The offset the running animation heads to.
    pub fn target_offset(&self) -> Vec2 {
        self.target_offset
    }

    /// The current animation curve, if one was created.
    pub fn curve(&self) -> Option<&ScrollOffsetAnimationCurve> {
        self.curve.as_ref()
    }

    /// The ids of the animation running on the compositor, if any.
    pub fn compositor_animation(&self) -> Option<ScrollAnimationIds> {
        self.compositor_animation
    }

    /// The offset new input is applied to.
    ///
    /// While an animation runs, input compounds against its target rather than the
    /// offset currently on screen.
    pub fn desired_target_offset(&self, area: &dyn ScrollableArea) -> Vec2 {
        if self.has_running_animation() {
            self.target_offset
        } else {
            area.scroll_offset()
        }
    }

    fn set_run_state(&mut self, run_state: RunState) {
        if self.run_state != run_state {
            debug!(from = ?self.run_state, to = ?run_state, "Scroll animator state changed");
            self.run_state = run_state;
        }
    }
}

// --- MARK: INPUT
impl ScrollAnimator {
    /// Scrolls by `delta` pixels, animated unless the granularity is precise.
    ///
    /// While an animation runs, the whole delta is reported as used, so that the gesture
    /// stays latched to this area.
    pub(crate) fn user_scroll(
        &mut self,
        ctx: &mut AnimatorCtx<'_>,
        granularity: ScrollGranularity,
        delta: Vec2,
    ) -> ScrollResult {
        if !ctx.area.scroll_animator_enabled() || granularity == ScrollGranularity::PrecisePixel {
            if self.has_running_animation() {
                self.cancel_animation(ctx);
            }
            return scroll_immediately(ctx.area, delta);
        }

        let needs_post_animation_cleanup = self.run_state == RunState::PostAnimationCleanup;
        if needs_post_animation_cleanup {
            self.reset_animation_state();
        }

        let target_offset = ctx
            .area
            .clamp_scroll_offset(self.desired_target_offset(ctx.area) + delta);
        if self.will_animate_to_offset(ctx, target_offset) {
            self.last_granularity = granularity;
            return ScrollResult {
                did_scroll_x: true,
                did_scroll_y: true,
                unused_scroll_delta: Vec2::ZERO,
            };
        }

        // Not starting anything, so the scrolling reason of the last animation still has to go.
        if needs_post_animation_cleanup {
            self.set_run_state(RunState::PostAnimationCleanup);
        }
        ScrollResult {
            unused_scroll_delta: delta,
            ..ScrollResult::default()
        }
    }

    /// Heads to `target_offset`, starting or retargeting an animation.
    ///
    /// Returns `false` if there is nothing to animate.
    pub(crate) fn will_animate_to_offset(
        &mut self,
        ctx: &mut AnimatorCtx<'_>,
        target_offset: Vec2,
    ) -> bool {
        match self.run_state {
            RunState::PostAnimationCleanup => self.reset_animation_state(),
            RunState::WaitingToCancelOnCompositor
            | RunState::WaitingToCancelOnCompositorButNewScroll => {
                self.target_offset = target_offset;
                if self.register_and_schedule_animation(ctx) {
                    self.set_run_state(RunState::WaitingToCancelOnCompositorButNewScroll);
                }
                return true;
            }
            RunState::WaitingToSendToCompositor => {
                self.target_offset = target_offset;
                return true;
            }
            _ => {}
        }

        if let Some(curve) = &mut self.curve {
            if target_offset == self.target_offset {
                return true;
            }
            self.target_offset = target_offset;
            if self.run_state == RunState::RunningOnMainThread {
                curve.update_target(ctx.now.saturating_sub(self.start_time), target_offset);
                self.register_and_schedule_animation(ctx);
                return true;
            }
            if self.register_and_schedule_animation(ctx) {
                self.set_run_state(RunState::RunningOnCompositorButNeedsUpdate);
            }
            return true;
        }

        if target_offset == ctx.area.scroll_offset() {
            return false;
        }
        self.target_offset = target_offset;
        self.start_time = ctx.now;
        if self.register_and_schedule_animation(ctx) {
            self.set_run_state(RunState::WaitingToSendToCompositor);
        }
        true
    }

    /// Jumps to `offset` without animating.
    pub(crate) fn scroll_to_offset_without_animation(
        &mut self,
        ctx: &mut AnimatorCtx<'_>,
        offset: Vec2,
    ) {
        self.target_offset = ctx.area.clamp_scroll_offset(offset);
        ctx.area.set_scroll_offset(offset, ScrollType::User);
    }

    /// Sets the offset to `offset`, moving a running animation along with it.
    pub(crate) fn adjust_animation_and_set_scroll_offset(
        &mut self,
        ctx: &mut AnimatorCtx<'_>,
        offset: Vec2,
        scroll_type: ScrollType,
    ) {
        let adjustment = ctx.area.clamp_scroll_offset(offset) - ctx.area.scroll_offset();
        ctx.area.set_scroll_offset(offset, scroll_type);
        if !self.has_running_animation() || adjustment == Vec2::ZERO {
            return;
        }

        self.target_offset += adjustment;
        let Some(curve) = &mut self.curve else {
            return;
        };
        curve.apply_adjustment(adjustment);
        if self.run_state == RunState::RunningOnCompositor
            && self.register_and_schedule_animation(ctx)
        {
            self.set_run_state(RunState::RunningOnCompositorButNeedsAdjustment);
        }
    }
}

// --- MARK: SERVICING
impl ScrollAnimator {
    /// Brings the compositor in line with the run state.
    ///
    /// Must only be called when compositing is clean.
    pub(crate) fn update_compositor_animations(&mut self, ctx: &mut AnimatorCtx<'_>) {
        match self.run_state {
            RunState::PostAnimationCleanup => {
                self.post_animation_cleanup_and_reset(ctx);
                return;
            }
            RunState::WaitingToCancelOnCompositor => {
                self.abort_compositor_animation(ctx);
                self.post_animation_cleanup_and_reset(ctx);
                return;
            }
            RunState::RunningOnCompositorButNeedsTakeover => {
                // Aborted already, restart on the main thread below.
                self.abort_compositor_animation(ctx);
                self.set_run_state(RunState::WaitingToSendToCompositor);
            }
            RunState::RunningOnCompositorButNeedsUpdate
            | RunState::RunningOnCompositorButNeedsAdjustment
            | RunState::WaitingToCancelOnCompositorButNewScroll => {
                self.abort_compositor_animation(ctx);
                let elapsed = ctx.now.saturating_sub(self.start_time);
                let current_offset = ctx.area.scroll_offset();
                if let Some(curve) = &mut self.curve {
                    match self.run_state {
                        RunState::RunningOnCompositorButNeedsUpdate => {
                            curve.update_target(elapsed, self.target_offset);
                        }
                        RunState::WaitingToCancelOnCompositorButNewScroll => {
                            curve.restart(elapsed, current_offset, self.target_offset);
                        }
                        // The adjustment was applied to the curve already.
                        _ => {}
                    }
                }
                self.set_run_state(RunState::WaitingToSendToCompositor);
            }
            _ => {}
        }

        if self.run_state != RunState::WaitingToSendToCompositor {
            return;
        }
        if self.curve.is_none() {
            let behavior = if self.last_granularity == ScrollGranularity::Pixel {
                DurationBehavior::InverseDelta
            } else {
                DurationBehavior::Constant
            };
            self.curve = Some(ScrollOffsetAnimationCurve::new(
                ctx.area.scroll_offset(),
                self.target_offset,
                behavior,
            ));
        }

        let sent_to_compositor = self.send_animation_to_compositor(ctx);
        let running_on_main_thread =
            !sent_to_compositor && self.register_and_schedule_animation(ctx);
        if running_on_main_thread {
            self.set_run_state(RunState::RunningOnMainThread);
        }
        // The main thread handles the scrolls of the animations it started.
        if sent_to_compositor || running_on_main_thread {
            if let Some(layer) = ctx.area.layer_for_scrolling() {
                ctx.compositor.add_main_thread_scrolling_reasons(
                    layer,
                    MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD,
                );
            }
        }
    }

    /// Advances a main-thread animation to `ctx.now`.
    pub(crate) fn tick_animation(&mut self, ctx: &mut AnimatorCtx<'_>) {
        if self.run_state != RunState::RunningOnMainThread {
            return;
        }
        let Some(curve) = &self.curve else {
            debug_panic!("Main thread scroll animation without a curve");
            return;
        };

        let elapsed = ctx.now.saturating_sub(self.start_time);
        let is_finished = elapsed >= curve.duration();
        let offset = if is_finished {
            curve.target_value()
        } else {
            curve.value(elapsed)
        };
        trace!(?elapsed, ?offset, is_finished, "Ticking scroll animation");

        if is_finished {
            self.set_run_state(RunState::PostAnimationCleanup);
            ctx.area.register_for_animation();
        } else {
            ctx.area.schedule_animation();
        }
        ctx.area.set_scroll_offset(offset, ScrollType::User);
    }

    /// Stops the animation where it is.
    ///
    /// Does nothing if there is no running animation.
    pub(crate) fn cancel_animation(&mut self, ctx: &mut AnimatorCtx<'_>) {
        match self.run_state {
            RunState::Idle
            | RunState::WaitingToCancelOnCompositor
            | RunState::PostAnimationCleanup => {}
            RunState::WaitingToSendToCompositor => {
                if self.compositor_animation.is_some() {
                    self.set_run_state(RunState::WaitingToCancelOnCompositor);
                    ctx.area.register_for_animation();
                } else {
                    self.reset_animation_state();
                }
            }
            RunState::RunningOnMainThread => {
                self.set_run_state(RunState::PostAnimationCleanup);
                ctx.area.register_for_animation();
            }
            RunState::RunningOnCompositor
            | RunState::RunningOnCompositorButNeedsUpdate
            | RunState::RunningOnCompositorButNeedsTakeover
            | RunState::RunningOnCompositorButNeedsAdjustment
            | RunState::WaitingToCancelOnCompositorButNewScroll => {
                self.set_run_state(RunState::WaitingToCancelOnCompositor);
                ctx.area.register_for_animation();
            }
        }
    }

    /// Moves a compositor animation to the main thread, e.g. because a main-thread
    /// scrolling reason was added.
    pub(crate) fn take_over_compositor_animation(&mut self, ctx: &mut AnimatorCtx<'_>) {
        match self.run_state {
            RunState::RunningOnCompositor
            | RunState::RunningOnCompositorButNeedsUpdate
            | RunState::RunningOnCompositorButNeedsAdjustment => {
                if matches!(
                    self.run_state,
                    RunState::RunningOnCompositor | RunState::RunningOnCompositorButNeedsUpdate
                ) {
                    self.remove_main_thread_scrolling_reason(ctx);
                }
                self.abort_compositor_animation(ctx);
                self.set_run_state(RunState::RunningOnCompositorButNeedsTakeover);
                ctx.area.register_for_animation();
            }
            _ => {}
        }
    }

    /// The compositor finished the animations of `group`.
    pub(crate) fn notify_compositor_animation_finished(
        &mut self,
        ctx: &mut AnimatorCtx<'_>,
        group: AnimationGroupId,
    ) {
        if self.compositor_animation.map(|ids| ids.group) != Some(group) {
            return;
        }
        self.compositor_animation = None;
        match self.run_state {
            RunState::RunningOnCompositor
            | RunState::RunningOnCompositorButNeedsUpdate
            | RunState::RunningOnCompositorButNeedsTakeover
            | RunState::RunningOnCompositorButNeedsAdjustment
            | RunState::WaitingToCancelOnCompositor => {
                self.set_run_state(RunState::PostAnimationCleanup);
                ctx.area.register_for_animation();
            }
            _ => {}
        }
    }

    /// The compositor aborted the animations of `group`.
    pub(crate) fn notify_compositor_animation_aborted(
        &mut self,
        ctx: &mut AnimatorCtx<'_>,
        group: AnimationGroupId,
    ) {
        // An abort we didn't ask for ends the animation where it is.
        self.notify_compositor_animation_finished(ctx, group);
    }

    /// Forgets the animation. The compositor side is left alone.
    pub(crate) fn reset_animation_state(&mut self) {
        self.set_run_state(RunState::Idle);
        self.curve = None;
        self.compositor_animation = None;
        self.start_time = Duration::ZERO;
    }
}

// --- MARK: HELPERS
impl ScrollAnimator {
    /// Registers the area for servicing and asks for a frame.
    ///
    /// If no frame can be scheduled the animation is abandoned and the offset jumps to the target.
    fn register_and_schedule_animation(&mut self, ctx: &mut AnimatorCtx<'_>) -> bool {
        ctx.area.register_for_animation();
        if ctx.area.schedule_animation() {
            return true;
        }
        debug!("Can't schedule a scroll animation, jumping to its target");
        self.abort_compositor_animation(ctx);
        self.remove_main_thread_scrolling_reason(ctx);
        self.scroll_to_offset_without_animation(ctx, self.target_offset);
        self.reset_animation_state();
        false
    }

    fn send_animation_to_compositor(&mut self, ctx: &mut AnimatorCtx<'_>) -> bool {
        let Some(layer) = ctx.area.layer_for_scrolling() else {
            return false;
        };
        if ctx.compositor.should_scroll_on_main_thread(layer) {
            return false;
        }
        let Some(curve) = &self.curve else {
            return false;
        };
        let Some(ids) = ctx
            .compositor
            .add_scroll_animation(layer, curve, self.start_time)
        else {
            return false;
        };
        self.compositor_animation = Some(ids);
        self.set_run_state(RunState::RunningOnCompositor);
        true
    }

    /// Aborts the compositor animation and forgets its ids, so its abort notification is ignored.
    fn abort_compositor_animation(&mut self, ctx: &mut AnimatorCtx<'_>) {
        if let Some(ids) = self.compositor_animation.take() {
            ctx.compositor.abort_animation(ids.animation);
        }
    }

    fn remove_main_thread_scrolling_reason(&self, ctx: &mut AnimatorCtx<'_>) {
        if let Some(layer) = ctx.area.layer_for_scrolling() {
            ctx.compositor.clear_main_thread_scrolling_reasons(
                layer,
                MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD,
            );
        }
    }

    fn post_animation_cleanup_and_reset(&mut self, ctx: &mut AnimatorCtx<'_>) {
        self.remove_main_thread_scrolling_reason(ctx);
        self.reset_animation_state();
    }
}

/// Applies as much of `delta` as fits, right away.
fn scroll_immediately(area: &mut dyn ScrollableArea, delta: Vec2) -> ScrollResult {
    let current = area.scroll_offset();
    let consumed = area.clamp_scroll_offset(current + delta) - current;
    if consumed == Vec2::ZERO {
        return ScrollResult {
            unused_scroll_delta: delta,
            ..ScrollResult::default()
        };
    }
    area.set_scroll_offset(current + consumed, ScrollType::User);
    ScrollResult {
        did_scroll_x: consumed.x != 0.0,
        did_scroll_y: consumed.y != 0.0,
        unused_scroll_delta: delta - consumed,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use kurbo::Size;

    use super::*;
    use crate::app::CompositorCommand;
    use crate::core::{LayerHandle, ScrollState};

    struct Fixture {
        animator: ScrollAnimator,
        state: ScrollState,
        proxy: CompositorProxy,
        commands: Rc<RefCell<Vec<CompositorCommand>>>,
        layer: LayerHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let commands = Rc::new(RefCell::new(Vec::new()));
            let sink = commands.clone();
            let mut proxy = CompositorProxy::new(move |command| sink.borrow_mut().push(command));
            let layer = proxy.create_layer();
            let mut state = ScrollState::new(Size::new(100., 100.), Size::new(100., 1000.));
            state.scroll_layer = Some(layer);
            Self {
                animator: ScrollAnimator::new(),
                state,
                proxy,
                commands,
                layer,
            }
        }

        fn run<R>(
            &mut self,
            now_ms: u64,
            f: impl FnOnce(&mut ScrollAnimator, &mut AnimatorCtx<'_>) -> R,
        ) -> R {
            let mut ctx = AnimatorCtx::new(
                &mut self.state,
                &mut self.proxy,
                Duration::from_millis(now_ms),
            );
            f(&mut self.animator, &mut ctx)
        }

        fn scroll(&mut self, now_ms: u64, dy: f64) -> ScrollResult {
            self.run(now_ms, |animator, ctx| {
                animator.user_scroll(ctx, ScrollGranularity::Pixel, Vec2::new(0., dy))
            })
        }

        fn update(&mut self, now_ms: u64) {
            self.run(now_ms, ScrollAnimator::update_compositor_animations);
        }

        fn reasons(&self) -> MainThreadScrollingReasons {
            self.proxy.main_thread_scrolling_reasons(self.layer)
        }

        fn apply(&mut self, event: Event) {
            const NOW: u64 = 16;
            match event {
                Event::Scroll => {
                    self.scroll(NOW, 40.);
                }
                Event::Update => self.update(NOW),
                Event::Tick => self.run(NOW, ScrollAnimator::tick_animation),
                Event::Done => {
                    let group = self
                        .animator
                        .compositor_animation
                        .map_or_else(AnimationGroupId::next, |ids| ids.group);
                    self.run(NOW, |animator, ctx| {
                        animator.notify_compositor_animation_finished(ctx, group);
                    });
                }
                Event::Cancel => self.run(NOW, ScrollAnimator::cancel_animation),
                Event::TakeOver => self.run(NOW, ScrollAnimator::take_over_compositor_animation),
                Event::Adjust => {
                    let offset = self.state.scroll_offset() + Vec2::new(0., 10.);
                    self.run(NOW, |animator, ctx| {
                        animator.adjust_animation_and_set_scroll_offset(
                            ctx,
                            offset,
                            ScrollType::Anchoring,
                        );
                    });
                }
            }
        }
    }

    #[derive(Clone, Copy, Debug)]
    enum Event {
        Scroll,
        Update,
        Tick,
        Done,
        Cancel,
        TakeOver,
        Adjust,
    }

    const EVENTS: [Event; 7] = [
        Event::Scroll,
        Event::Update,
        Event::Tick,
        Event::Done,
        Event::Cancel,
        Event::TakeOver,
        Event::Adjust,
    ];

    /// Drives a fresh fixture into `state`, at time zero.
    fn fixture_in(state: RunState) -> Fixture {
        let mut fx = Fixture::new();
        match state {
            RunState::Idle => {}
            RunState::WaitingToSendToCompositor => {
                fx.scroll(0, 100.);
            }
            RunState::RunningOnMainThread => {
                fx.proxy.set_accepts_animations(false);
                fx.scroll(0, 100.);
                fx.update(0);
                fx.proxy.set_accepts_animations(true);
            }
            RunState::RunningOnCompositor => {
                fx.scroll(0, 100.);
                fx.update(0);
            }
            RunState::RunningOnCompositorButNeedsUpdate => {
                fx = fixture_in(RunState::RunningOnCompositor);
                fx.scroll(0, 40.);
            }
            RunState::RunningOnCompositorButNeedsTakeover => {
                fx = fixture_in(RunState::RunningOnCompositor);
                fx.run(0, ScrollAnimator::take_over_compositor_animation);
            }
            RunState::RunningOnCompositorButNeedsAdjustment => {
                fx = fixture_in(RunState::RunningOnCompositor);
                fx.run(0, |animator, ctx| {
                    animator.adjust_animation_and_set_scroll_offset(
                        ctx,
                        Vec2::new(0., 10.),
                        ScrollType::Anchoring,
                    );
                });
            }
            RunState::WaitingToCancelOnCompositor => {
                fx = fixture_in(RunState::RunningOnCompositor);
                fx.run(0, ScrollAnimator::cancel_animation);
            }
            RunState::WaitingToCancelOnCompositorButNewScroll => {
                fx = fixture_in(RunState::WaitingToCancelOnCompositor);
                fx.scroll(0, 40.);
            }
            RunState::PostAnimationCleanup => {
                fx = fixture_in(RunState::RunningOnCompositor);
                fx.apply(Event::Done);
            }
        }
        assert_eq!(fx.animator.run_state(), state, "fixture didn't reach {state:?}");
        fx
    }

    #[test]
    fn transition_table() {
        use RunState::*;

        // Columns follow `EVENTS`.
        #[rustfmt::skip]
        let table: [(RunState, [RunState; 7]); 10] = [
            (Idle, [
                WaitingToSendToCompositor, Idle, Idle, Idle, Idle, Idle, Idle,
            ]),
            (WaitingToSendToCompositor, [
                WaitingToSendToCompositor, RunningOnCompositor, WaitingToSendToCompositor,
                WaitingToSendToCompositor, Idle, WaitingToSendToCompositor,
                WaitingToSendToCompositor,
            ]),
            (RunningOnMainThread, [
                RunningOnMainThread, RunningOnMainThread, RunningOnMainThread,
                RunningOnMainThread, PostAnimationCleanup, RunningOnMainThread, RunningOnMainThread,
            ]),
            (RunningOnCompositor, [
                RunningOnCompositorButNeedsUpdate, RunningOnCompositor, RunningOnCompositor,
                PostAnimationCleanup, WaitingToCancelOnCompositor,
                RunningOnCompositorButNeedsTakeover, RunningOnCompositorButNeedsAdjustment,
            ]),
            (RunningOnCompositorButNeedsUpdate, [
                RunningOnCompositorButNeedsUpdate, RunningOnCompositor,
                RunningOnCompositorButNeedsUpdate, PostAnimationCleanup,
                WaitingToCancelOnCompositor,
                RunningOnCompositorButNeedsTakeover, RunningOnCompositorButNeedsUpdate,
            ]),
            (RunningOnCompositorButNeedsTakeover, [
                RunningOnCompositorButNeedsUpdate, RunningOnCompositor,
                RunningOnCompositorButNeedsTakeover, RunningOnCompositorButNeedsTakeover,
                WaitingToCancelOnCompositor, RunningOnCompositorButNeedsTakeover,
                RunningOnCompositorButNeedsTakeover,
            ]),
            (RunningOnCompositorButNeedsAdjustment, [
                RunningOnCompositorButNeedsUpdate, RunningOnCompositor,
                RunningOnCompositorButNeedsAdjustment, PostAnimationCleanup,
                WaitingToCancelOnCompositor, RunningOnCompositorButNeedsTakeover,
                RunningOnCompositorButNeedsAdjustment,
            ]),
            (WaitingToCancelOnCompositor, [
                WaitingToCancelOnCompositorButNewScroll, Idle, WaitingToCancelOnCompositor,
                PostAnimationCleanup, WaitingToCancelOnCompositor, WaitingToCancelOnCompositor,
                WaitingToCancelOnCompositor,
            ]),
            (WaitingToCancelOnCompositorButNewScroll, [
                WaitingToCancelOnCompositorButNewScroll, RunningOnCompositor,
                WaitingToCancelOnCompositorButNewScroll, WaitingToCancelOnCompositorButNewScroll,
                WaitingToCancelOnCompositor, WaitingToCancelOnCompositorButNewScroll,
                WaitingToCancelOnCompositorButNewScroll,
            ]),
            (PostAnimationCleanup, [
                WaitingToSendToCompositor, Idle, PostAnimationCleanup, PostAnimationCleanup,
                PostAnimationCleanup, PostAnimationCleanup, PostAnimationCleanup,
            ]),
        ];

        for (from, expected) in table {
            for (event, to) in EVENTS.into_iter().zip(expected) {
                let mut fx = fixture_in(from);
                fx.apply(event);
                assert_eq!(
                    fx.animator.run_state(),
                    to,
                    "{from:?} x {event:?} should lead to {to:?}"
                );
            }
        }
    }

    #[test]
    fn cancel_always_stops_the_animation() {
        use RunState::*;
        for state in [
            Idle,
            WaitingToSendToCompositor,
            RunningOnMainThread,
            RunningOnCompositor,
            RunningOnCompositorButNeedsUpdate,
            RunningOnCompositorButNeedsTakeover,
            RunningOnCompositorButNeedsAdjustment,
            WaitingToCancelOnCompositor,
            WaitingToCancelOnCompositorButNewScroll,
            PostAnimationCleanup,
        ] {
            let mut fx = fixture_in(state);
            fx.apply(Event::Cancel);
            assert!(
                !fx.animator.has_running_animation(),
                "animation still running after cancelling in {state:?}"
            );
            fx.apply(Event::Cancel);
            assert!(
                !fx.animator.has_running_animation(),
                "second cancel restarted the animation in {state:?}"
            );
        }
    }

    #[test]
    fn successive_scrolls_compound_against_the_target() {
        let mut fx = Fixture::new();
        fx.scroll(0, 100.);
        fx.update(0);
        fx.scroll(5, 100.);
        assert_eq!(fx.animator.target_offset(), Vec2::new(0., 200.));
        // The offset on screen hasn't moved, the compositor owns the animation.
        assert_eq!(fx.state.scroll_offset(), Vec2::ZERO);

        fx.scroll(10, 2000.);
        assert_eq!(fx.animator.target_offset(), Vec2::new(0., 900.));
    }

    #[test]
    fn main_thread_animation_runs_to_completion() {
        let mut fx = Fixture::new();
        fx.proxy
            .add_main_thread_scrolling_reasons(fx.layer, MainThreadScrollingReasons::PAGE_OVERLAY);
        fx.scroll(0, 100.);
        fx.update(0);
        assert_eq!(fx.animator.run_state(), RunState::RunningOnMainThread);
        assert!(
            fx.reasons().contains(MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD)
        );

        fx.run(100, ScrollAnimator::tick_animation);
        let midway = fx.state.scroll_offset().y;
        assert!(midway > 0. && midway < 100., "offset {midway} should be midway");
        assert_eq!(fx.animator.run_state(), RunState::RunningOnMainThread);

        fx.run(1000, ScrollAnimator::tick_animation);
        assert_eq!(fx.state.scroll_offset(), Vec2::new(0., 100.));
        assert_eq!(fx.animator.run_state(), RunState::PostAnimationCleanup);
        assert!(fx.state.registered_for_animation);

        fx.update(1000);
        assert_eq!(fx.animator.run_state(), RunState::Idle);
        assert_eq!(fx.reasons(), MainThreadScrollingReasons::PAGE_OVERLAY);
    }

    #[test]
    fn compositor_animation_is_sent_with_its_start_time() {
        let mut fx = Fixture::new();
        fx.scroll(32, 100.);
        fx.update(48);
        let commands = fx.commands.borrow();
        let Some(CompositorCommand::AddScrollAnimation(request)) = commands
            .iter()
            .find(|command| matches!(command, CompositorCommand::AddScrollAnimation(_)))
        else {
            panic!("no animation was sent");
        };
        assert_eq!(request.layer, fx.layer);
        assert_eq!(request.start_time, Duration::from_millis(32));
        assert_eq!(request.curve.target_value(), Vec2::new(0., 100.));
        assert_eq!(request.curve.duration_behavior(), DurationBehavior::InverseDelta);
    }

    #[test]
    fn retargeting_replaces_the_compositor_animation() {
        let mut fx = fixture_in(RunState::RunningOnCompositor);
        let first = fx.animator.compositor_animation().map(|ids| ids.animation);
        fx.scroll(16, 40.);
        fx.update(16);
        let second = fx.animator.compositor_animation().map(|ids| ids.animation);
        assert_ne!(first, second);
        assert_eq!(fx.proxy.running_animation_count(), 1);
        assert_eq!(
            fx.animator.curve().map(ScrollOffsetAnimationCurve::target_value),
            Some(Vec2::new(0., 140.))
        );
    }

    #[test]
    fn takeover_continues_on_the_main_thread() {
        let mut fx = fixture_in(RunState::RunningOnCompositor);
        fx.proxy
            .add_main_thread_scrolling_reasons(fx.layer, MainThreadScrollingReasons::PAGE_OVERLAY);
        fx.run(16, ScrollAnimator::take_over_compositor_animation);
        assert!(
            !fx.reasons().contains(MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD)
        );
        assert_eq!(fx.proxy.running_animation_count(), 0);

        fx.update(16);
        assert_eq!(fx.animator.run_state(), RunState::RunningOnMainThread);
        assert!(
            fx.reasons().contains(MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD)
        );
        assert_eq!(fx.animator.compositor_animation(), None);
    }

    #[test]
    fn failed_scheduling_jumps_to_the_target() {
        let mut fx = Fixture::new();
        fx.state.can_schedule_animation = false;
        let result = fx.scroll(0, 100.);
        assert!(result.did_scroll());
        assert_eq!(fx.state.scroll_offset(), Vec2::new(0., 100.));
        assert_eq!(fx.animator.run_state(), RunState::Idle);
    }

    #[test]
    fn precise_scrolls_cancel_and_apply_immediately() {
        let mut fx = fixture_in(RunState::RunningOnCompositor);
        let result = fx.run(16, |animator, ctx| {
            animator.user_scroll(ctx, ScrollGranularity::PrecisePixel, Vec2::new(0., 30.))
        });
        assert_eq!(fx.state.scroll_offset(), Vec2::new(0., 30.));
        assert!(result.did_scroll_y);
        assert!(!fx.animator.has_running_animation());
        assert_eq!(fx.animator.run_state(), RunState::WaitingToCancelOnCompositor);
    }

    #[test]
    fn scrolling_past_the_end_reports_unused_delta() {
        let mut fx = Fixture::new();
        let result = fx.scroll(0, -50.);
        assert!(!result.did_scroll());
        assert_eq!(result.unused_scroll_delta, Vec2::new(0., -50.));
        assert_eq!(fx.animator.run_state(), RunState::Idle);
    }

    #[test]
    fn stale_group_notifications_are_ignored() {
        let mut fx = fixture_in(RunState::RunningOnCompositor);
        let stale = AnimationGroupId::next();
        fx.run(16, |animator, ctx| {
            animator.notify_compositor_animation_aborted(ctx, stale);
        });
        assert_eq!(fx.animator.run_state(), RunState::RunningOnCompositor);
    }
}
