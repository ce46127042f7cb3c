// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! Internal passes run by Lamina on every lifecycle update.
//!
//! The passes run in the order of this module list, each on every frame of the page
//! that needs it. See [`Page::update_lifecycle`](crate::app::Page::update_lifecycle).
//!
//! This file includes utility functions used by multiple passes.

use tracing::span::EnteredSpan;
use tracing::trace_span;

use crate::core::PaintLayer;

pub(crate) mod assignment;
pub(crate) mod compositing_inputs;
pub(crate) mod hit_test;
pub(crate) mod layer_positions;

#[must_use = "Span will be immediately closed if dropped"]
pub(crate) fn enter_span_if(enabled: bool, layer: &PaintLayer) -> Option<EnteredSpan> {
    enabled.then(|| enter_span(layer))
}

#[must_use = "Span will be immediately closed if dropped"]
pub(crate) fn enter_span(layer: &PaintLayer) -> EnteredSpan {
    trace_span!("layer", id = layer.id().trace(), frame = layer.frame().trace()).entered()
}

/// Passes walk every layer of every frame, so per-layer spans are mostly noise.
///
/// The detailed traces for these passes therefore default to false, but can be enabled using the
/// `LAMINA_TRACE_PASSES` environment variable, as a comma-separated list of pass names or `all`.
///
/// Each pass always opens a single span of its own, regardless of this setting.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PassTracing {
    pub(crate) layer_positions: bool,
    pub(crate) compositing_inputs: bool,
    pub(crate) compositing_assignment: bool,
    /// The scrolling coordinator visits layers of every frame, including throttled ones.
    pub(crate) scrolling_coordinator: bool,
    /// Hit testing is run for every pointer move.
    pub(crate) hit_test: bool,
}

impl PassTracing {
    pub(crate) fn from_env() -> Self {
        let env_var = match std::env::var("LAMINA_TRACE_PASSES") {
            Ok(env_var) => env_var,
            // If it's not set, don't show any passes.
            Err(std::env::VarError::NotPresent) => return Self::unit(false),
            Err(std::env::VarError::NotUnicode(value)) => {
                tracing::error!(
                    ?value,
                    "Couldn't parse `LAMINA_TRACE_PASSES` environment variable: Not valid UTF-8",
                );
                return Self::unit(false);
            }
        };
        Self::parse(env_var.trim())
    }

    fn parse(passes: &str) -> Self {
        if passes.eq_ignore_ascii_case("all") {
            return Self::unit(true);
        }
        let mut result = Self::unit(false);
        let mut show_help = false;
        let mut supported_passes = [
            ("layer_positions", &mut result.layer_positions),
            ("compositing_inputs", &mut result.compositing_inputs),
            ("compositing_assignment", &mut result.compositing_assignment),
            ("scrolling_coordinator", &mut result.scrolling_coordinator),
            ("hit_test", &mut result.hit_test),
        ];
        for input_name in passes.split(',').map(str::trim) {
            if input_name.eq_ignore_ascii_case("all") {
                tracing::warn!(
                    "`LAMINA_TRACE_PASSES=all` cannot be meaningfully combined with other passes"
                );
                return Self::unit(true);
            }
            if let Some((_, value)) = supported_passes
                .iter_mut()
                .find(|(pass_name, _)| pass_name.eq_ignore_ascii_case(input_name))
            {
                if **value {
                    tracing::warn!(
                        pass = input_name,
                        "LAMINA_TRACE_PASSES: Enabled tracing for same pass twice"
                    );
                }
                **value = true;
            } else {
                tracing::warn!(pass = input_name, "LAMINA_TRACE_PASSES: Unknown pass");
                show_help = true;
            }
        }
        if show_help {
            let supported_str = supported_passes
                .iter()
                .map(|(name, _)| name)
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                "Supported passes for the `LAMINA_TRACE_PASSES` environment variable \
                 are {supported_str}"
            );
        }
        result
    }

    /// A `PassTracing` where all the fields have the same `value`.
    const fn unit(value: bool) -> Self {
        Self {
            layer_positions: value,
            compositing_inputs: value,
            compositing_assignment: value,
            scrolling_coordinator: value,
            hit_test: value,
        }
    }
}
