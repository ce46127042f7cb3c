// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Touch event target rects, and their projection onto compositor layers.

use lamina_core::app::CompositorCommand;
use lamina_core::core::{BoxKind, BoxStyle, LayerRef, Overflow};
use lamina_core::kurbo::{Rect, Size};
use lamina_core::scrolling::TouchTarget;
use lamina_testing::TestHarness;

fn sorted(mut rects: Vec<Rect>) -> Vec<Rect> {
    rects.sort_by(|a, b| a.x0.total_cmp(&b.x0).then(a.y0.total_cmp(&b.y0)));
    rects
}

#[test]
fn element_in_main_thread_scroller_blocks_the_whole_scroller() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let scroller = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(20., 30., 120., 130.),
        BoxStyle::scroller(Overflow::Scroll),
    );
    harness
        .page_mut()
        .set_overflow_size(main, scroller, Size::new(100., 300.));
    let child = harness.add_box(
        scroller,
        BoxKind::Block,
        Rect::new(10., 10., 60., 60.),
        BoxStyle::default(),
    );
    harness
        .page_mut()
        .add_touch_handler(main, TouchTarget::Element(child));
    harness.update();

    let root_layer = harness.page().frame(main).root_layer();
    let scroller_layer = harness.layer_of(main, scroller);
    let rects = harness.page().scrolling_coordinator().touch_event_target_rects();
    assert_eq!(
        rects.get(LayerRef::new(main, root_layer)),
        Some(&[Rect::new(20., 30., 120., 130.)][..])
    );
    assert_eq!(
        rects.get(LayerRef::new(main, scroller_layer)),
        Some(&[Rect::new(10., 10., 60., 60.)][..])
    );

    // The scroller isn't composited, so both end up in the document's scroll layer.
    let scroll_layer = harness
        .scroll_layer_of(main, root_layer)
        .expect("the main frame always scrolls on the compositor");
    let region = harness
        .page()
        .scrolling_coordinator()
        .touch_event_handler_region(scroll_layer)
        .expect("region was pushed")
        .to_vec();
    assert_eq!(
        sorted(region),
        vec![Rect::new(20., 30., 120., 130.), Rect::new(30., 40., 80., 90.)]
    );
    let pushed = harness.all_commands().into_iter().any(|command| {
        matches!(
            command,
            CompositorCommand::SetTouchEventHandlerRegion { layer, .. } if layer == scroll_layer
        )
    });
    assert!(pushed);
}

#[test]
fn document_listener_covers_the_whole_document() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let target = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 50., 50.),
        BoxStyle::default(),
    );
    let page = harness.page_mut();
    page.add_touch_handler(main, TouchTarget::Element(target));
    page.add_touch_handler(main, TouchTarget::Document);
    harness.update();

    let root_layer = harness.page().frame(main).root_layer();
    let rects = harness.page().scrolling_coordinator().touch_event_target_rects();
    assert_eq!(rects.len(), 1, "element listeners are subsumed");
    assert_eq!(
        rects.get(LayerRef::new(main, root_layer)),
        Some(&[Rect::new(0., 0., 800., 2000.)][..])
    );
}

#[test]
fn removing_the_last_listener_clears_the_region() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let target = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(100., 100., 150., 150.),
        BoxStyle::default(),
    );
    harness
        .page_mut()
        .add_touch_handler(main, TouchTarget::Element(target));
    harness.update();
    let root_layer = harness.page().frame(main).root_layer();
    let scroll_layer = harness.scroll_layer_of(main, root_layer).unwrap();
    assert_eq!(
        harness
            .page()
            .scrolling_coordinator()
            .touch_event_handler_region(scroll_layer),
        Some(&[Rect::new(100., 100., 150., 150.)][..])
    );
    harness.take_commands();

    harness
        .page_mut()
        .remove_touch_handler(main, TouchTarget::Element(target));
    harness.update();

    assert_eq!(
        harness
            .page()
            .scrolling_coordinator()
            .touch_event_handler_region(scroll_layer),
        None
    );
    let commands = harness.take_commands();
    assert!(commands.contains(&CompositorCommand::SetTouchEventHandlerRegion {
        layer: scroll_layer,
        rects: Vec::new(),
    }));
}

#[test]
fn removed_boxes_lose_their_listeners() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let target = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 10., 10.),
        BoxStyle::default(),
    );
    harness
        .page_mut()
        .add_touch_handler(main, TouchTarget::Element(target));
    harness.update();
    assert!(harness.page().event_handlers().has_touch_handlers());

    harness.page_mut().remove_box(main, target);
    harness.update();

    assert!(!harness.page().event_handlers().has_touch_handlers());
    assert!(
        harness
            .page()
            .scrolling_coordinator()
            .touch_event_target_rects()
            .is_empty()
    );
}
