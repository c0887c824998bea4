//! Physical and geometric constants used throughout the fluxmeter.
//!
//! These values are load-bearing and reproduced bit for bit rather than
//! re-derived.

/// Muon rest mass, in GeV/c^2.
pub const MUON_MASS_GEV: f64 = 0.10566;

/// c * tau for the muon, in meters.
pub const MUON_C_TAU_M: f64 = 658.654;

/// Sentinel floor altitude, in meters. Also the lowest valid reference
/// support boundary.
pub const ZMIN: f64 = -11_000.0;

/// Highest altitude considered by the geometry, in meters.
pub const ZMAX: f64 = 120_000.0;

/// Minimum step length handed to the transport driver, avoiding degenerate
/// zero-length steps at boundaries.
pub const EPS_FLT: f64 = 1.0e-5;

/// Tolerance used to check that backward/forward transport landed on the
/// expected boundary altitude.
pub const BOUNDARY_TOL_M: f64 = 1.0e-4;

/// Regime switch points for Detailed mode, in GeV.
pub const DETAILED_LOW_CAP_GEV: f64 = 10.0;
pub const DETAILED_MID_CAP_GEV: f64 = 100.0;

/// CMS charge ratio r = mu+ / mu- used by the default reference flux.
pub const CMS_CHARGE_RATIO: f64 = 1.2766;

/// US-standard atmosphere shell boundary altitudes, in meters (CORSIKA values).
pub const ATM_SHELL_ALTITUDES_M: [f64; 4] = [4.0e3, 1.0e4, 4.0e4, 1.0e5];

/// CORSIKA b_i parameters for each shell (units such that rho comes out in
/// kg/m^3 once combined with lambda_i below).
pub const ATM_SHELL_B: [f64; 4] = [1222.6562, 1144.9069, 1305.5948, 540.1778];

/// CORSIKA c_i parameters for each shell, in cm.
pub const ATM_SHELL_C: [f64; 4] = [994_186.38, 878_153.55, 636_143.04, 772_170.16];

/// Floor on |sin(elevation)| used when computing the atmosphere's
/// recommended step length, so grazing rays don't produce an unbounded step.
pub const MIN_SIN_ELEVATION: f64 = 0.1;

/// WGS-84 semi-major axis, in meters.
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS-84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
