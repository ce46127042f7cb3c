// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Miscellaneous utility functions.

use kurbo::{Point, Rect, Size};

/// Panic in debug and `tracing::error` in release mode.
///
/// This macro is in some way a combination of `panic` and `debug_assert`,
/// but it will log the provided message instead of ignoring it in release builds.
///
/// It's useful when a backtrace would aid debugging but a crash can be avoided in release.
#[macro_export]
macro_rules! debug_panic {
    ($msg:expr$(,)?) => {
        if cfg!(debug_assertions) {
            panic!($msg);
        } else {
            tracing::error!($msg);
        }
    };
    ($fmt:expr, $($arg:tt)+) => {
        if cfg!(debug_assertions) {
            panic!($fmt, $($arg)*);
        } else {
            tracing::error!($fmt, $($arg)*);
        }
    };
}

pub use crate::debug_panic;

/// Returns `true` if `inner` lies entirely within `outer`, edges included.
///
/// Unlike [`Rect::contains`], which tests a point against a half-open rect,
/// this is closed on all four sides.
pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// A rect of the given size with its origin at zero.
pub(crate) fn size_rect(size: Size) -> Rect {
    Rect::from_origin_size(Point::ORIGIN, size)
}

/// Returns `true` if both rects have a non-empty intersection.
pub(crate) fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

/// Rounds a rect outwards to the enclosing integer grid.
pub(crate) fn enclosing_int_rect(rect: Rect) -> Rect {
    rect.expand()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_containment_is_closed() {
        let outer = Rect::new(0., 0., 100., 100.);
        assert!(rect_contains_rect(outer, outer));
        assert!(rect_contains_rect(outer, Rect::new(10., 10., 100., 50.)));
        assert!(!rect_contains_rect(outer, Rect::new(10., 10., 101., 50.)));
    }

    #[test]
    fn touching_rects_dont_intersect() {
        let a = Rect::new(0., 0., 10., 10.);
        assert!(!rects_intersect(a, Rect::new(10., 0., 20., 10.)));
        assert!(rects_intersect(a, Rect::new(9., 9., 20., 10.)));
    }
}
