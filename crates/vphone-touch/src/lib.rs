//! # vphone-touch
//!
//! Translates host pointer input into the guest's multi-touch protocol.
//!
//! ## Quick Start
//!
//! ```
//! use vphone_touch::{PointerEvent, PointerKind, Point, TouchTranslator, ViewGeometry};
//! use std::time::Duration;
//!
//! let view = ViewGeometry::new(390.0, 844.0, false);
//! let mut translator = TouchTranslator::new();
//!
//! let down = PointerEvent::new(PointerKind::PrimaryDown, Point::new(195.0, 10.0), Duration::ZERO);
//! let frame = translator.translate(&down, &view).unwrap();
//!
//! assert_eq!(frame.touches().len(), 1);
//! ```
//!
//! ## Features
//!
//! - **Coordinate Normalization**: view-local points mapped into the unit square
//! - **Edge Classification**: swipe aim captured when a gesture begins
//! - **Two-Finger Gestures**: secondary button emits paired contacts
//! - **View Strategy**: native touch view or gesture-translating view, chosen once

mod edge;
mod frame;
mod geometry;
mod translator;
mod view;

pub use edge::{classify_edge, SwipeAim, EDGE_THRESHOLD};
pub use frame::{MultiTouchDevice, MultiTouchFrame, TouchPhase, TouchRecord, TouchTarget};
pub use geometry::{normalize, NormalizedPoint, Point, Size, ViewGeometry};
pub use translator::{PointerEvent, PointerKind, TouchTranslator};
pub use view::{PointerRouter, ViewStrategy, WINDOW_CONTENT_SIZE};
