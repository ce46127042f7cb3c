// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use lamina_core::app::DocumentLifecycle;
use lamina_core::core::{BoxKind, BoxStyle, Overflow, Position};
use lamina_core::core::LayerTree;
use lamina_core::kurbo::{Point, Rect, Size, Vec2};
use lamina_testing::TestHarness;

#[test]
fn empty_layers_get_a_unit_bounding_box() {
    let mut harness = TestHarness::create(Size::new(800., 600.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let empty = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(40., 50., 40., 50.),
        BoxStyle::positioned(Position::Absolute),
    );
    harness.update();

    let layer_id = harness.layer_of(main, empty);
    let layer = harness.page().frame(main).layers().layer(layer_id);
    assert_eq!(
        layer.unclipped_absolute_bounding_box(),
        Rect::new(40., 50., 41., 51.)
    );
    assert_eq!(
        layer.clipped_absolute_bounding_box(),
        Rect::new(40., 50., 41., 51.)
    );
}

#[test]
fn no_update_is_pending_after_a_lifecycle_update() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let outer = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 300., 300.),
        BoxStyle::positioned(Position::Relative),
    );
    harness.add_box(
        outer,
        BoxKind::Block,
        Rect::new(10., 10., 50., 50.),
        BoxStyle::positioned(Position::Absolute),
    );
    harness.update();

    assert_eq!(harness.page().lifecycle(), DocumentLifecycle::ScrollingClean);
    for layer in harness.page().frame(main).layers().iter() {
        assert!(!layer.needs_compositing_inputs_update(), "{}", layer.id());
        assert!(!layer.child_needs_compositing_inputs_update(), "{}", layer.id());
    }
}

#[test]
fn unchanged_geometry_changes_nothing() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let scroller = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(20., 20., 220., 220.),
        BoxStyle {
            prefer_composited_scrolling: true,
            ..BoxStyle::scroller(Overflow::Auto)
        },
    );
    harness
        .page_mut()
        .set_overflow_size(main, scroller, Size::new(200., 800.));
    let fixed = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 100., 40.),
        BoxStyle::positioned(Position::Fixed),
    );
    harness.update();
    harness.take_commands();

    let layers = harness.page().frame(main).layers();
    let before: Vec<_> = layers
        .iter()
        .map(|layer| layer.ancestor_dependent_compositing_inputs().clone())
        .collect();

    harness.page_mut().set_geometry(
        main,
        fixed,
        Point::new(0., 0.),
        Size::new(100., 40.),
    );
    harness.update();

    let layers = harness.page().frame(main).layers();
    let after: Vec<_> = layers
        .iter()
        .map(|layer| layer.ancestor_dependent_compositing_inputs().clone())
        .collect();
    assert_eq!(before, after);
    assert_eq!(harness.take_commands(), Vec::new());
}

#[test]
fn clipped_bounding_box_is_clipped_by_the_clipping_container() {
    let mut harness = TestHarness::create(Size::new(800., 600.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let clipper = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(100., 100., 200., 200.),
        BoxStyle {
            overflow_x: Overflow::Hidden,
            overflow_y: Overflow::Hidden,
            ..BoxStyle::positioned(Position::Relative)
        },
    );
    let child = harness.add_box(
        clipper,
        BoxKind::Block,
        Rect::new(50., 50., 250., 250.),
        BoxStyle::positioned(Position::Relative),
    );
    harness.update();

    let clipper_layer = harness.layer_of(main, clipper);
    let layer = harness
        .page()
        .frame(main)
        .layers()
        .layer(harness.layer_of(main, child));
    let inputs = layer.ancestor_dependent_compositing_inputs();
    assert_eq!(inputs.clipping_container, Some(clipper_layer));
    assert_eq!(
        inputs.unclipped_absolute_bounding_box,
        Rect::new(150., 150., 350., 350.)
    );
    assert_eq!(
        inputs.clipped_absolute_bounding_box,
        Rect::new(150., 150., 200., 200.)
    );
}

#[test]
fn opacity_and_transform_ancestors() {
    let mut harness = TestHarness::create(Size::new(800., 600.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let translucent = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(0., 0., 100., 100.),
        BoxStyle {
            opacity: 0.5,
            ..BoxStyle::default()
        },
    );
    let transformed = harness.add_box(
        translucent,
        BoxKind::Block,
        Rect::new(0., 0., 50., 50.),
        BoxStyle {
            will_change_transform: true,
            ..BoxStyle::default()
        },
    );
    let leaf = harness.add_box(
        transformed,
        BoxKind::Block,
        Rect::new(0., 0., 10., 10.),
        BoxStyle::positioned(Position::Relative),
    );
    harness.update();

    let translucent = harness.layer_of(main, translucent);
    let transformed = harness.layer_of(main, transformed);
    let layers = harness.page().frame(main).layers();
    let leaf = layers.layer(harness.layer_of(main, leaf));
    assert_eq!(leaf.opacity_ancestor(), Some(translucent));
    assert_eq!(leaf.transform_ancestor(), Some(transformed));
    assert_eq!(layers.layer(transformed).opacity_ancestor(), Some(translucent));
    assert_eq!(layers.layer(transformed).transform_ancestor(), None);
}

fn assert_dirty_bits_propagate(layers: &LayerTree) {
    for layer in layers.iter() {
        if !layer.needs_compositing_inputs_update() {
            continue;
        }
        for ancestor in layers.ancestors(layer.id()) {
            assert!(
                layers.layer(ancestor).child_needs_compositing_inputs_update(),
                "{} is dirty but its ancestor {ancestor} doesn't know",
                layer.id()
            );
        }
    }
}

#[test]
fn dirty_layers_are_known_to_every_ancestor() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let mut parent = harness.root_box(main);
    let mut chain = Vec::new();
    for _ in 0..6 {
        parent = harness.add_box(
            parent,
            BoxKind::Block,
            Rect::new(10., 10., 300., 300.),
            BoxStyle::positioned(Position::Relative),
        );
        chain.push(parent);
    }
    assert_dirty_bits_propagate(harness.page().frame(main).layers());
    harness.update();

    // Leaf first, so later marks find ancestors that already know.
    let mut offset = 20.;
    for &id in chain.iter().rev() {
        offset += 5.;
        harness
            .page_mut()
            .set_geometry(main, id, Point::new(offset, offset), Size::new(300., 300.));
        assert_dirty_bits_propagate(harness.page().frame(main).layers());
    }
    let layers = harness.page().frame(main).layers();
    assert!(layers.layer(layers.root()).child_needs_compositing_inputs_update());

    harness.update();
    // A second round, dirtying from the middle outwards.
    for &id in &[chain[3], chain[5], chain[0]] {
        harness
            .page_mut()
            .set_geometry(main, id, Point::new(5., 5.), Size::new(300., 300.));
        assert_dirty_bits_propagate(harness.page().frame(main).layers());
    }
}

#[test]
fn converting_coordinates_through_a_scroller_round_trips() {
    let mut harness = TestHarness::create(Size::new(800., 2000.));
    let main = harness.main_frame();
    let root = harness.root_box(main);
    let scroller = harness.add_box(
        root,
        BoxKind::Block,
        Rect::new(20., 30., 120., 130.),
        BoxStyle::scroller(Overflow::Auto),
    );
    harness
        .page_mut()
        .set_overflow_size(main, scroller, Size::new(100., 400.));
    let child = harness.add_box(
        scroller,
        BoxKind::Block,
        Rect::new(10., 100., 60., 150.),
        BoxStyle::positioned(Position::Relative),
    );
    let grandchild = harness.add_box(
        child,
        BoxKind::Block,
        Rect::new(5., 5., 15., 15.),
        BoxStyle::positioned(Position::Absolute),
    );
    harness.update();
    let scroller = harness.layer_of(main, scroller);
    harness
        .page_mut()
        .set_scroll_offset(main, scroller, Vec2::new(0., 50.));
    harness.update();

    let child = harness.layer_of(main, child);
    let grandchild = harness.layer_of(main, grandchild);
    let layers = harness.page().frame(main).layers();
    let p = Point::new(3., 4.);

    assert_eq!(
        layers.convert_to_layer_coords(grandchild, None, p),
        Point::new(38., 89.)
    );
    assert_eq!(
        layers.convert_to_layer_coords(grandchild, Some(scroller), p),
        Point::new(18., 59.)
    );
    for from in [grandchild, child, scroller] {
        for to in layers.ancestors(from) {
            let there = layers.convert_to_layer_coords(from, Some(to), p);
            // Converting to the document directly or through `to` agrees.
            assert_eq!(
                layers.convert_to_layer_coords(to, None, there),
                layers.convert_to_layer_coords(from, None, p)
            );
            // And the accumulated offset takes the point back.
            let offset = layers.convert_to_layer_coords(from, Some(to), Point::ORIGIN);
            assert_eq!(there - offset.to_vec2(), p);
        }
        assert_eq!(layers.convert_to_layer_coords(from, Some(from), p), p);
    }
}
