// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Smooth user scrolls, on the compositor and on the main thread.

use assert_matches::assert_matches;
use float_cmp::assert_approx_eq;
use lamina_core::app::{CompositorCommand, PageOptions};
use lamina_core::core::{BoxKind, BoxStyle, FrameId, LayerId, Position, ScrollGranularity};
use lamina_core::kurbo::{Rect, Size, Vec2};
use lamina_core::scrolling::{MainThreadScrollingReasons, RunState};
use lamina_testing::{TestHarness, TestHarnessParams, assert_debug_panics};

fn root_layer(harness: &TestHarness) -> (FrameId, LayerId) {
    let main = harness.main_frame();
    (main, harness.page().frame(main).root_layer())
}

fn run_state(harness: &TestHarness) -> RunState {
    let (main, root) = root_layer(harness);
    harness
        .page()
        .scrollable_area(main, root)
        .and_then(|area| area.scroll_animator())
        .map_or(RunState::Idle, |animator| animator.run_state())
}

fn scroll_offset(harness: &TestHarness) -> Vec2 {
    let (main, root) = root_layer(harness);
    harness.page().scrollable_area(main, root).unwrap().scroll_offset()
}

fn scroll_lines(harness: &mut TestHarness, lines: f64) {
    let (main, root) = root_layer(harness);
    let result =
        harness
            .page_mut()
            .user_scroll(main, root, ScrollGranularity::Line, Vec2::new(0., lines));
    assert!(result.did_scroll());
    assert_eq!(result.unused_scroll_delta, Vec2::ZERO);
}

fn main_thread_harness() -> TestHarness {
    TestHarness::create_with(TestHarnessParams {
        options: PageOptions {
            animation_host: false,
            ..PageOptions::default()
        },
        ..TestHarnessParams::default()
    })
}

#[test]
fn line_scroll_runs_on_the_compositor() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    harness.update();
    harness.take_commands();

    scroll_lines(&mut harness, 3.);
    assert_eq!(run_state(&harness), RunState::WaitingToSendToCompositor);
    harness.update();

    assert_eq!(run_state(&harness), RunState::RunningOnCompositor);
    let (main, root) = root_layer(&harness);
    let scroll_layer = harness.scroll_layer_of(main, root).unwrap();
    let commands = harness.take_commands();
    let added = commands
        .iter()
        .find(|command| matches!(command, CompositorCommand::AddScrollAnimation(_)));
    assert_matches!(
        added,
        Some(CompositorCommand::AddScrollAnimation(request)) if request.layer == scroll_layer
    );
    let running = harness.running_compositor_animations();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].layer, scroll_layer);
    assert_eq!(running[0].curve.target_value(), Vec2::new(0., 120.));
    // The offset only moves when the compositor says so.
    assert_eq!(scroll_offset(&harness), Vec2::ZERO);
    assert!(
        harness
            .page()
            .compositor()
            .main_thread_scrolling_reasons(scroll_layer)
            .contains(MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD)
    );

    harness.compositor_scroll(scroll_layer, Vec2::new(0., 60.));
    assert_eq!(scroll_offset(&harness), Vec2::new(0., 60.));
    harness.update();
    let commands = harness.take_commands();
    assert!(
        !commands
            .iter()
            .any(|command| matches!(command, CompositorCommand::UpdateScrollOffset { .. })),
        "compositor scrolls aren't sent back"
    );

    let group = running[0].ids.group;
    harness.finish_animation(group);
    harness.compositor_scroll(scroll_layer, Vec2::new(0., 120.));
    harness.update();

    assert_eq!(run_state(&harness), RunState::Idle);
    assert_eq!(scroll_offset(&harness), Vec2::new(0., 120.));
    assert_eq!(
        harness
            .page()
            .compositor()
            .main_thread_scrolling_reasons(scroll_layer),
        MainThreadScrollingReasons::empty()
    );
    assert!(harness.running_compositor_animations().is_empty());
}

#[test]
fn second_scroll_retargets_the_animation() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    harness.update();
    scroll_lines(&mut harness, 3.);
    harness.update();
    let first = harness.running_compositor_animations()[0].ids;

    scroll_lines(&mut harness, 2.);
    assert_eq!(
        run_state(&harness),
        RunState::RunningOnCompositorButNeedsUpdate
    );
    harness.update();

    assert_eq!(run_state(&harness), RunState::RunningOnCompositor);
    let running = harness.running_compositor_animations();
    assert_eq!(running.len(), 1);
    assert_ne!(running[0].ids, first);
    assert_eq!(running[0].curve.target_value(), Vec2::new(0., 200.));
    assert!(
        harness
            .all_commands()
            .contains(&CompositorCommand::AbortAnimation(first.animation))
    );

    // The notification for the replaced animation is stale.
    harness.abort_animation(first.group);
    assert_eq!(run_state(&harness), RunState::RunningOnCompositor);
}

#[test]
fn animations_run_on_the_main_thread_without_an_animation_host() {
    let mut harness = main_thread_harness();
    harness.update();

    scroll_lines(&mut harness, 3.);
    harness.update();
    assert_eq!(run_state(&harness), RunState::RunningOnMainThread);
    assert!(harness.page().has_scheduled_animation());
    assert!(harness.running_compositor_animations().is_empty());

    harness.animate_ms(16);
    let offset = scroll_offset(&harness);
    assert!(offset.y > 0. && offset.y < 120., "{offset:?}");
    // The offset set by the main thread is pushed to the compositor.
    let (main, root) = root_layer(&harness);
    let scroll_layer = harness.scroll_layer_of(main, root).unwrap();
    let pushed = harness.take_commands().into_iter().rev().find_map(|command| match command {
        CompositorCommand::UpdateScrollOffset { layer, offset } if layer == scroll_layer => {
            Some(offset)
        }
        _ => None,
    });
    assert_eq!(pushed, Some(offset));

    harness.animate_ms(500);
    assert_approx_eq!(f64, scroll_offset(&harness).y, 120.);
    assert_eq!(run_state(&harness), RunState::Idle);
    assert!(!harness.page().has_scheduled_animation());
}

#[test]
fn without_animation_frames_scrolls_jump_to_their_target() {
    let mut harness = main_thread_harness();
    harness.update();
    harness.page_mut().set_can_schedule_animations(false);

    scroll_lines(&mut harness, 3.);
    assert_eq!(scroll_offset(&harness), Vec2::new(0., 120.));
    assert_eq!(run_state(&harness), RunState::Idle);

    harness.update();
    assert!(!harness.page().has_scheduled_animation());
}

#[test]
fn precise_scrolls_are_not_animated() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    harness.update();
    let (main, root) = root_layer(&harness);

    let result = harness.page_mut().user_scroll(
        main,
        root,
        ScrollGranularity::PrecisePixel,
        Vec2::new(0., 50.),
    );
    assert!(result.did_scroll_y);
    assert_eq!(scroll_offset(&harness), Vec2::new(0., 50.));
    assert_eq!(run_state(&harness), RunState::Idle);

    // Only the remainder is left when hitting the end.
    let result = harness.page_mut().user_scroll(
        main,
        root,
        ScrollGranularity::PrecisePixel,
        Vec2::new(0., 2000.),
    );
    assert_eq!(scroll_offset(&harness), Vec2::new(0., 1400.));
    assert_eq!(result.unused_scroll_delta, Vec2::new(0., 650.));
}

#[test]
fn main_thread_reason_takes_over_a_compositor_animation() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    harness.update();
    scroll_lines(&mut harness, 3.);
    harness.update();
    assert_eq!(run_state(&harness), RunState::RunningOnCompositor);

    let root = harness.root_box(main);
    harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 800., 400.),
        BoxStyle {
            background_attachment_fixed: true,
            ..BoxStyle::default()
        },
    );
    harness.update();
    assert!(harness.running_compositor_animations().is_empty());
    assert_eq!(
        run_state(&harness),
        RunState::RunningOnCompositorButNeedsTakeover
    );

    // The next update restarts it on the main thread.
    harness.update();
    assert_eq!(run_state(&harness), RunState::RunningOnMainThread);
    harness.animate_ms(500);
    assert_approx_eq!(f64, scroll_offset(&harness).y, 120.);
}

#[test]
fn scrolling_a_layer_that_cannot_scroll_is_a_bug() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let positioned = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 10., 10.),
        BoxStyle::positioned(Position::Relative),
    );
    harness.update();
    let layer = harness.layer_of(main, positioned);

    assert_debug_panics!(
        harness
            .page_mut()
            .user_scroll(main, layer, ScrollGranularity::Line, Vec2::new(0., 1.)),
        "can't scroll"
    );
}
