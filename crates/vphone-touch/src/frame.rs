//! Multi-touch protocol frames and the devices that accept them.

use crate::edge::SwipeAim;
use crate::geometry::NormalizedPoint;
use std::sync::Arc;
use std::time::Duration;

/// Phase of a single contact. Discriminants are the guest's phase codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TouchPhase {
    Began = 0,
    Moved = 1,
    Ended = 3,
}

impl TouchPhase {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One contact within a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchRecord {
    /// Contact slot: 0 for the primary finger, 1 for the secondary.
    pub index: u8,
    pub phase: TouchPhase,
    pub location: NormalizedPoint,
    pub swipe_aim: SwipeAim,
    /// Monotonic timestamp of the host event.
    pub timestamp: Duration,
}

/// One timestamped batch of touch records sent to a touch device.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTouchFrame {
    touches: Vec<TouchRecord>,
}

impl MultiTouchFrame {
    pub fn new(touches: Vec<TouchRecord>) -> Self {
        Self { touches }
    }

    pub fn touches(&self) -> &[TouchRecord] {
        &self.touches
    }
}

/// A guest touch device that accepts multi-touch frames.
pub trait MultiTouchDevice: Send + Sync {
    /// Deliver frames to the guest, in order.
    fn send_multi_touch_events(&self, frames: &[MultiTouchFrame]);
}

/// Something that may have touch devices attached, typically a running guest.
///
/// The list is empty until the guest has registered its touch hardware.
pub trait TouchTarget {
    fn multi_touch_devices(&self) -> Vec<Arc<dyn MultiTouchDevice>>;
}

impl<T: TouchTarget + ?Sized> TouchTarget for Arc<T> {
    fn multi_touch_devices(&self) -> Vec<Arc<dyn MultiTouchDevice>> {
        (**self).multi_touch_devices()
    }
}
