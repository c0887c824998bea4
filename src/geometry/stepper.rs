//! The two step-locator engines consumed by the transport driver and the
//! anchor computation that sizes them.

use crate::constants::{BOUNDARY_TOL_M, EPS_FLT, ZMAX, ZMIN};
use crate::geo::{ecef_to_geodetic, enu_basis, Ecef};
use crate::geometry::layer::Layer;

/// Cached vertical anchors derived from the topmost layer height and the
/// reference flux's altitude support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchors {
    pub zmax: f64,
    pub ztop: f64,
    pub zref: f64,
    pub zref_min: f64,
    pub zref_max: f64,
}

/// Computes (ztop, zref) from the topographic column height `zmax` and the
/// reference support [`zref_min`, `zref_max`] (swapped if reversed).
pub fn compute_anchors(zmax: f64, zref_min: f64, zref_max: f64) -> Anchors {
    let (zref_min, zref_max) = if zref_min <= zref_max {
        (zref_min, zref_max)
    } else {
        (zref_max, zref_min)
    };
    let (ztop, zref) = if zmax <= zref_min {
        (zref_min, zref_min)
    } else if zmax <= zref_max {
        (zmax, zmax)
    } else {
        (zmax, zref_max)
    };
    Anchors {
        zmax,
        ztop,
        zref,
        zref_min,
        zref_max,
    }
}

/// Component of `direction` along the local vertical (up) at `position`.
fn vertical_rate(position: &Ecef, direction: &Ecef) -> f64 {
    let (lat, lon, _h) = ecef_to_geodetic(position);
    let (_, _, up) = enu_basis(lat, lon);
    direction.dot(&up)
}

/// Distance along `direction` from altitude `h` to `boundary`, given the
/// local vertical rate of `direction`. `f64::INFINITY` when the ray never
/// crosses (purely horizontal, to floating-point precision).
fn distance_to_altitude(h: f64, boundary: f64, vertical_rate: f64) -> f64 {
    if vertical_rate.abs() < 1.0e-12 {
        f64::INFINITY
    } else {
        ((boundary - h) / vertical_rate).max(0.0)
    }
}

/// Full-column stepper: floor at ZMIN, one boundary surface per user layer,
/// a surface at `ztop`, and a ceiling at ZMAX.
#[derive(Debug, Clone, Copy)]
pub struct LayeredStepper {
    ztop: f64,
}

impl LayeredStepper {
    pub fn new(ztop: f64) -> Self {
        LayeredStepper { ztop }
    }

    pub fn ztop(&self) -> f64 {
        self.ztop
    }

    /// step(ecef_position) -> (distance_to_next_boundary, layer_index).
    ///
    /// Each user layer's boundary surface is evaluated locally (at the
    /// ray's current horizontal position) and treated as flat for the
    /// purposes of this single step, matching how the driver re-queries the
    /// locator after every returned distance.
    pub fn step(&self, layers: &[Layer], position: &Ecef, direction: &Ecef, use_external_layer: bool) -> (f64, usize) {
        let (lat, lon, h) = ecef_to_geodetic(position);
        let n = layers.len();

        let mut boundaries = Vec::with_capacity(n + 3);
        boundaries.push(ZMIN);
        for layer in layers {
            let (x, y) = layer.project(lat, lon);
            boundaries.push(layer.height(x, y));
        }
        boundaries.push(self.ztop);
        boundaries.push(ZMAX);

        if h < ZMIN - BOUNDARY_TOL_M || h > ZMAX + BOUNDARY_TOL_M {
            return (EPS_FLT, 0);
        }

        let mut k = 0usize;
        for (i, &b) in boundaries.iter().enumerate() {
            if h >= b {
                k = i;
            } else {
                break;
            }
        }
        if k >= boundaries.len() - 1 {
            k = boundaries.len() - 2;
        }

        let top_region = boundaries.len() - 2; // [ztop, ZMAX]
        let atmosphere_region = boundaries.len() - 3; // [topmost layer surface, ztop]

        let medium_index = if k == top_region {
            if use_external_layer {
                n + 2
            } else {
                return (EPS_FLT, 0);
            }
        } else if k == atmosphere_region {
            n + 1
        } else {
            k + 1
        };

        let vr = vertical_rate(position, direction);
        let distance = if vr >= 0.0 {
            distance_to_altitude(h, boundaries[k + 1], vr)
        } else {
            distance_to_altitude(h, boundaries[k], vr)
        };

        (distance.max(EPS_FLT).min(1.0e9), medium_index)
    }
}

/// Atmosphere-only stepper: a flat floor at `zref` and a flat ceiling at
/// ZMAX. Used for the forward CSDA Jacobian step and for the opensky
/// reference path above the topographic column.
#[derive(Debug, Clone, Copy)]
pub struct OpenskyStepper {
    zref: f64,
}

impl OpenskyStepper {
    pub fn new(zref: f64) -> Self {
        OpenskyStepper { zref }
    }

    pub fn zref(&self) -> f64 {
        self.zref
    }

    /// step(ecef_position) -> (distance_to_next_boundary, layer_index).
    /// Index 1 means "inside the atmosphere slab"; 0 means outside.
    pub fn step(&self, position: &Ecef, direction: &Ecef) -> (f64, usize) {
        let (_, _, h) = ecef_to_geodetic(position);
        if h < self.zref - BOUNDARY_TOL_M || h > ZMAX + BOUNDARY_TOL_M {
            return (EPS_FLT, 0);
        }

        let vr = vertical_rate(position, direction);
        let distance = if vr >= 0.0 {
            distance_to_altitude(h, ZMAX, vr)
        } else {
            distance_to_altitude(h, self.zref, vr)
        };

        (distance.max(EPS_FLT).min(1.0e9), 1)
    }
}
