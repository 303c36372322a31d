//! Stateful pointer-to-touch translation.

use crate::edge::{classify_edge, SwipeAim};
use crate::frame::{MultiTouchFrame, TouchPhase, TouchRecord, TouchTarget};
use crate::geometry::{normalize, NormalizedPoint, Point, ViewGeometry};
use std::time::Duration;

/// Kind of host pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    PrimaryDown,
    PrimaryDrag,
    PrimaryUp,
    SecondaryDown,
    SecondaryUp,
}

/// A host pointer event in view-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub location: Point,
    pub timestamp: Duration,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, location: Point, timestamp: Duration) -> Self {
        Self {
            kind,
            location,
            timestamp,
        }
    }
}

/// Maps host pointer events onto multi-touch frames.
///
/// The primary button drives a single finger (slot 0). The secondary button
/// drives two fingers at the same location (slots 0 and 1), which the guest
/// reads as a two-finger system gesture.
///
/// The swipe aim is classified when a gesture begins and then reused,
/// unchanged, for every later frame of that gesture.
#[derive(Debug, Default)]
pub struct TouchTranslator {
    swipe_aim: SwipeAim,
}

impl TouchTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aim of the gesture in progress (or of the last one).
    pub fn swipe_aim(&self) -> SwipeAim {
        self.swipe_aim
    }

    /// Translate one pointer event into at most one frame.
    ///
    /// Secondary events with degenerate view bounds produce nothing. Primary
    /// events with degenerate bounds are still reported, at the origin.
    pub fn translate(
        &mut self,
        event: &PointerEvent,
        view: &ViewGeometry,
    ) -> Option<MultiTouchFrame> {
        let normalized = normalize(event.location, view.bounds, view.flipped);

        match event.kind {
            PointerKind::PrimaryDown => {
                self.swipe_aim = classify_edge(event.location, view.bounds, view.flipped);
                let location = normalized.unwrap_or(NormalizedPoint::ORIGIN);
                Some(self.single(TouchPhase::Began, location, event.timestamp))
            }
            PointerKind::PrimaryDrag => {
                let location = normalized.unwrap_or(NormalizedPoint::ORIGIN);
                Some(self.single(TouchPhase::Moved, location, event.timestamp))
            }
            PointerKind::PrimaryUp => {
                let location = normalized.unwrap_or(NormalizedPoint::ORIGIN);
                Some(self.single(TouchPhase::Ended, location, event.timestamp))
            }
            PointerKind::SecondaryDown => {
                let location = normalized?;
                self.swipe_aim = classify_edge(event.location, view.bounds, view.flipped);
                Some(self.pair(TouchPhase::Began, location, event.timestamp))
            }
            PointerKind::SecondaryUp => {
                let location = normalized?;
                Some(self.pair(TouchPhase::Ended, location, event.timestamp))
            }
        }
    }

    /// Translate an event and deliver the frame to the target's first touch
    /// device.
    ///
    /// A target without touch devices is left alone: nothing is sent and the
    /// gesture state is not updated. Returns the frame that was sent.
    pub fn handle<T: TouchTarget + ?Sized>(
        &mut self,
        event: &PointerEvent,
        view: &ViewGeometry,
        target: &T,
    ) -> Option<MultiTouchFrame> {
        let devices = target.multi_touch_devices();
        let device = devices.first()?;

        let frame = self.translate(event, view)?;
        tracing::trace!(
            kind = ?event.kind,
            aim = %self.swipe_aim,
            touches = frame.touches().len(),
            "Sending multi-touch frame"
        );
        device.send_multi_touch_events(std::slice::from_ref(&frame));
        Some(frame)
    }

    fn record(
        &self,
        index: u8,
        phase: TouchPhase,
        location: NormalizedPoint,
        timestamp: Duration,
    ) -> TouchRecord {
        TouchRecord {
            index,
            phase,
            location,
            swipe_aim: self.swipe_aim,
            timestamp,
        }
    }

    fn single(
        &self,
        phase: TouchPhase,
        location: NormalizedPoint,
        timestamp: Duration,
    ) -> MultiTouchFrame {
        MultiTouchFrame::new(vec![self.record(0, phase, location, timestamp)])
    }

    fn pair(
        &self,
        phase: TouchPhase,
        location: NormalizedPoint,
        timestamp: Duration,
    ) -> MultiTouchFrame {
        MultiTouchFrame::new(vec![
            self.record(0, phase, location, timestamp),
            self.record(1, phase, location, timestamp),
        ])
    }
}
