// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Checks that the given expression panics in debug mode. No-op in release mode.
///
/// Lamina reports misuse, like scrolling a layer that can't scroll, with `debug_panic!`.
/// Use this to test those paths; pass a substring of the expected message as the second argument.
#[macro_export]
macro_rules! assert_debug_panics {
    ($expr:expr) => {
        $crate::assert_debug_panics_inner(
            || {
                $expr;
            },
            "",
        )
    };

    ($expr:expr, $needle:expr) => {
        $crate::assert_debug_panics_inner(
            || {
                $expr;
            },
            &($needle).to_string(),
        )
    };
}

#[track_caller]
#[doc(hidden)]
pub fn assert_debug_panics_inner(callback: impl FnOnce(), needle: &str) {
    if cfg!(not(debug_assertions)) {
        return;
    }

    // AssertUnwindSafe isn't a safety invariant: misuse can only cause functional bugs.
    let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) else {
        panic!("expression did not panic in debug mode");
    };
    let Some(message) = panic_message(payload.as_ref()) else {
        panic!("panic payload was neither a `&str` nor a `String`");
    };
    assert!(
        message.contains(needle),
        "panic did not contain expected string\n      \
         panic message: {message}\n \
         expected substring: {needle}",
    );
}

/// The message of a panic raised by `panic!` and friends.
fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}
