//! Choice of window view and routing of pointer input.

use crate::frame::{MultiTouchFrame, TouchTarget};
use crate::geometry::{Size, ViewGeometry};
use crate::translator::{PointerEvent, TouchTranslator};
use std::fmt;

/// Window content size in points; the window keeps this aspect ratio.
pub const WINDOW_CONTENT_SIZE: Size = Size {
    width: 1179.0,
    height: 2556.0,
};

/// How the window turns pointer input into guest touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStrategy {
    /// The host's own VM view delivers touches to the guest.
    Native,
    /// Pointer events are translated here and sent to the touch device.
    GestureTranslating,
}

impl ViewStrategy {
    /// Pick the strategy once, from whether the host view handles touch
    /// input itself.
    pub fn select(native_view_handles_touch: bool) -> Self {
        if native_view_handles_touch {
            Self::Native
        } else {
            Self::GestureTranslating
        }
    }
}

impl fmt::Display for ViewStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewStrategy::Native => write!(f, "native"),
            ViewStrategy::GestureTranslating => write!(f, "gesture-translating"),
        }
    }
}

/// Entry point for pointer events coming from the windowing layer.
#[derive(Debug)]
pub struct PointerRouter {
    strategy: ViewStrategy,
    translator: Option<TouchTranslator>,
}

impl PointerRouter {
    pub fn new(strategy: ViewStrategy) -> Self {
        let translator = match strategy {
            ViewStrategy::Native => None,
            ViewStrategy::GestureTranslating => Some(TouchTranslator::new()),
        };
        tracing::debug!(%strategy, "Pointer routing configured");
        Self {
            strategy,
            translator,
        }
    }

    pub fn strategy(&self) -> ViewStrategy {
        self.strategy
    }

    /// Forward an event to the guest. Under [`ViewStrategy::Native`] the
    /// host view has already handled it and this does nothing.
    pub fn route<T: TouchTarget + ?Sized>(
        &mut self,
        event: &PointerEvent,
        view: &ViewGeometry,
        target: &T,
    ) -> Option<MultiTouchFrame> {
        self.translator.as_mut()?.handle(event, view, target)
    }
}
