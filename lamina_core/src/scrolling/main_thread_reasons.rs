// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

use bitflags::bitflags;

bitflags! {
    /// Why a scroll layer can't be scrolled by the compositor alone.
    ///
    /// Reasons are set and cleared per compositor scroll layer, as a bitmask.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MainThreadScrollingReasons: u32 {
        /// The document has boxes with `background-attachment: fixed`.
        const HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS = 1 << 0;
        /// The document has fixed or sticky boxes that don't have their own backing.
        const HAS_NON_LAYER_VIEWPORT_CONSTRAINED_OBJECTS = 1 << 1;
        /// Threaded scrolling is disabled for the page.
        const THREADED_SCROLLING_DISABLED = 1 << 2;
        /// The user is dragging a scrollbar that is painted on the main thread.
        const SCROLLBAR_SCROLLING = 1 << 3;
        /// A page overlay covers the frame.
        const PAGE_OVERLAY = 1 << 4;
        /// A scroll animation started on the main thread is in flight.
        ///
        /// This reason is owned by the scroll animator. It is the only transient reason.
        const HANDLING_SCROLL_FROM_MAIN_THREAD = 1 << 5;
        /// The scroller uses custom scrollbars.
        const CUSTOM_SCROLLBAR_SCROLLING = 1 << 6;
        /// The scroll starts over the non-fast-scrollable region.
        const NON_FAST_SCROLLABLE_REGION = 1 << 7;
    }
}

impl MainThreadScrollingReasons {
    /// Reasons owned by running animations rather than by the page's structure.
    pub const TRANSIENT: Self = Self::HANDLING_SCROLL_FROM_MAIN_THREAD;

    /// The reasons that aren't transient.
    pub fn non_transient(self) -> Self {
        self.difference(Self::TRANSIENT)
    }

    /// Human readable names of the set reasons, for logging.
    pub fn as_text(self) -> String {
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_independent_bits() {
        let mut reasons = MainThreadScrollingReasons::empty();
        reasons |= MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS;
        reasons |= MainThreadScrollingReasons::THREADED_SCROLLING_DISABLED;
        reasons.remove(MainThreadScrollingReasons::HAS_BACKGROUND_ATTACHMENT_FIXED_OBJECTS);
        assert_eq!(reasons, MainThreadScrollingReasons::THREADED_SCROLLING_DISABLED);
    }

    #[test]
    fn transient_reason_is_not_structural() {
        let reasons = MainThreadScrollingReasons::HANDLING_SCROLL_FROM_MAIN_THREAD
            | MainThreadScrollingReasons::PAGE_OVERLAY;
        assert_eq!(reasons.non_transient(), MainThreadScrollingReasons::PAGE_OVERLAY);
        assert_eq!(reasons.as_text(), "PAGE_OVERLAY, HANDLING_SCROLL_FROM_MAIN_THREAD");
    }
}
