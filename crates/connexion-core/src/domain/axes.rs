//! Six-axis values and the pure transforms applied to them before delivery.
//!
//! # Axis order (for beginners)
//!
//! A 6-DoF controller reports three translations followed by three rotations:
//!
//! ```text
//!  index:  0    1    2    3    4    5
//!  axis:   TX   TY   TZ   RX   RY   RZ
//! ```
//!
//! Every helper in this module works on that fixed order and returns a new
//! value; nothing is mutated in place.

use serde::{Deserialize, Serialize};

use crate::protocol::messages::CapabilityMask;

/// Number of axes on every supported device.
pub const AXIS_COUNT: usize = 6;

/// One named axis, usable as an index into [`AxisValues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Tx = 0,
    Ty = 1,
    Tz = 2,
    Rx = 3,
    Ry = 4,
    Rz = 5,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::Tx, Axis::Ty, Axis::Tz, Axis::Rx, Axis::Ry, Axis::Rz];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Short display label, e.g. `"TX"`.
    pub fn label(self) -> &'static str {
        match self {
            Axis::Tx => "TX",
            Axis::Ty => "TY",
            Axis::Tz => "TZ",
            Axis::Rx => "RX",
            Axis::Ry => "RY",
            Axis::Rz => "RZ",
        }
    }
}

/// Signed values of all six axes, TX through RZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct AxisValues(pub [i16; AXIS_COUNT]);

impl AxisValues {
    pub fn get(&self, axis: Axis) -> i16 {
        self.0[axis.index()]
    }

    pub fn translation(&self) -> [i16; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn rotation(&self) -> [i16; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// Keeps only the axis with the largest magnitude and zeroes the others.
    ///
    /// Ties go to the lowest index.  All-zero input comes back unchanged.
    ///
    /// ```rust
    /// use connexion_core::domain::axes::AxisValues;
    ///
    /// let out = AxisValues([3, -50, 2, 1, 0, 0]).dominant();
    /// assert_eq!(out, AxisValues([0, -50, 0, 0, 0, 0]));
    /// ```
    pub fn dominant(&self) -> AxisValues {
        let mut best = 0usize;
        for index in 1..AXIS_COUNT {
            if self.0[index].unsigned_abs() > self.0[best].unsigned_abs() {
                best = index;
            }
        }
        let mut out = [0i16; AXIS_COUNT];
        out[best] = self.0[best];
        AxisValues(out)
    }

    /// Zeroes every axis whose magnitude is at or below `threshold`.
    ///
    /// Resting devices jitter by ±1; a threshold of 1 hides that noise.
    pub fn filter_drift(&self, threshold: u16) -> AxisValues {
        AxisValues(self.0.map(|v| if v.unsigned_abs() <= threshold { 0 } else { v }))
    }

    /// Zeroes the axes not present in `mask`.
    pub fn masked(&self, mask: CapabilityMask) -> AxisValues {
        let mut out = self.0;
        for (index, value) in out.iter_mut().enumerate() {
            if !mask.has_axis(index) {
                *value = 0;
            }
        }
        AxisValues(out)
    }
}

impl From<[i16; AXIS_COUNT]> for AxisValues {
    fn from(values: [i16; AXIS_COUNT]) -> Self {
        AxisValues(values)
    }
}
