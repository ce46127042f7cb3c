// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use lamina_core::app::{CompositorCommand, PageOptions};
use lamina_core::core::{BoxKind, BoxStyle, LayerHandle, Overflow, Position};
use lamina_core::kurbo::{Rect, Size};
use lamina_core::scrolling::MainThreadScrollingReasons;
use lamina_testing::{TestHarness, TestHarnessParams};

fn root_scroll_layer(harness: &TestHarness) -> LayerHandle {
    let main = harness.main_frame();
    let root = harness.page().frame(main).root_layer();
    harness.scroll_layer_of(main, root).unwrap()
}

fn root_reasons(harness: &TestHarness) -> MainThreadScrollingReasons {
    harness
        .page()
        .compositor()
        .main_thread_scrolling_reasons(root_scroll_layer(harness))
}

#[test]
fn fixed_backgrounds_scroll_on_the_main_thread() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let background = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 800., 400.),
        BoxStyle {
            background_attachment_fixed: true,
            ..BoxStyle::default()
        },
    );
    harness.update();
    assert_eq!(
        root_reasons(&harness),
        MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS
    );

    harness.page_mut().set_style(main, background, BoxStyle::default());
    harness.update();
    assert_eq!(root_reasons(&harness), MainThreadScrollingReasons::empty());
    let layer = root_scroll_layer(&harness);
    assert!(
        harness
            .all_commands()
            .contains(&CompositorCommand::ClearMainThreadScrollingReasons {
                layer,
                reasons: MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS,
            })
    );
}

#[test]
fn disabled_threaded_scrolling_is_a_reason() {
    let mut harness = TestHarness::create_with(TestHarnessParams {
        options: PageOptions {
            threaded_scrolling_enabled: false,
            ..PageOptions::default()
        },
        ..TestHarnessParams::default()
    });
    harness.update();

    assert_eq!(
        root_reasons(&harness),
        MainThreadScrollingReasons::THREADED_SCROLLING_DISABLED
    );
    assert!(harness.page().compositor().should_scroll_on_main_thread(root_scroll_layer(&harness)));
}

#[test]
fn fixed_layers_without_backing_scroll_on_the_main_thread() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 800., 50.),
        BoxStyle::positioned(Position::Fixed),
    );
    harness.update();

    assert_eq!(
        root_reasons(&harness),
        MainThreadScrollingReasons::HAS_NON_LAYER_VIEWPORT_CONSTRAINED_OBJECTS
    );
}

#[test]
fn composited_fixed_layers_scroll_on_the_compositor() {
    let mut harness = TestHarness::create_with(TestHarnessParams {
        options: PageOptions {
            accelerated_compositing_for_fixed_position: true,
            ..PageOptions::default()
        },
        ..TestHarnessParams::default()
    });
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let fixed = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 800., 50.),
        BoxStyle {
            offsets: lamina_core::core::BoxOffsets {
                right: Some(0.),
                top: Some(0.),
                ..Default::default()
            },
            ..BoxStyle::positioned(Position::Fixed)
        },
    );
    harness.update();

    assert_eq!(root_reasons(&harness), MainThreadScrollingReasons::empty());

    let permit = harness.page().compositing_query_permit().unwrap();
    let layer = harness
        .page()
        .frame(main)
        .layers()
        .layer(harness.layer_of(main, fixed));
    let mapping = layer.composited_layer_mapping(permit).unwrap();
    let constrained = harness.all_commands().into_iter().any(|command| {
        matches!(
            command,
            CompositorCommand::SetPositionConstraint { layer, constraint: Some(constraint) }
                if layer == mapping.main && constraint.fixed_to_right && !constraint.fixed_to_bottom
        )
    });
    assert!(constrained);
}

#[test]
fn custom_scrollbars_scroll_on_the_main_thread() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let scroller = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 200., 200.),
        BoxStyle {
            custom_scrollbar: true,
            prefer_composited_scrolling: true,
            ..BoxStyle::scroller(Overflow::Scroll)
        },
    );
    harness
        .page_mut()
        .set_overflow_size(main, scroller, Size::new(200., 1000.));
    harness.update();

    let scroller_layer = harness.layer_of(main, scroller);
    let scroll_layer = harness.scroll_layer_of(main, scroller_layer).unwrap();
    assert_eq!(
        harness
            .page()
            .compositor()
            .main_thread_scrolling_reasons(scroll_layer),
        MainThreadScrollingReasons::CUSTOM_SCROLLBAR_SCROLLING
    );
    // The document itself doesn't have a custom scrollbar.
    assert_eq!(root_reasons(&harness), MainThreadScrollingReasons::empty());
}
