//! Pure device-state logic with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! The protocol module tells us what the bytes mean.  This module decides
//! what an application should actually see: which axes survive a mask,
//! whether a tiny jitter counts as motion, and whether a new record differs
//! from the last one a client was shown.  None of it touches threads, I/O or
//! the driver, so all of it is tested on plain values.

/// Axis values and their transforms.
pub mod axes;

/// Per-client change detection.
pub mod edges;
