//! The built-in Gaisser x Guan (Volkova) parameterised opensky flux.

use crate::constants::{CMS_CHARGE_RATIO, MUON_MASS_GEV, ZMAX, ZMIN};

/// (value, asymmetry) at the given altitude (m), elevation (deg) and
/// kinetic energy (GeV). Zero value/asymmetry when cos(zenith) < 0 or the
/// altitude falls outside [ZMIN, ZMAX].
pub fn flux(height_m: f64, elevation_deg: f64, kinetic_energy_gev: f64) -> (f64, f64) {
    if height_m < ZMIN || height_m > ZMAX {
        return (0.0, 0.0);
    }

    let c = ((90.0 - elevation_deg) * std::f64::consts::PI / 180.0).cos();
    if c < 0.0 {
        return (0.0, 0.0);
    }

    let e = kinetic_energy_gev + MUON_MASS_GEV;
    let c_star = volkova_c_star(c);
    if c_star <= 0.0 {
        return (0.0, asymmetry());
    }

    let value = (1.0 + 3.64 / (e * c_star.powf(1.29))).powf(-2.7) * gaisser_core(c_star, e);
    (value, asymmetry())
}

fn gaisser_core(c: f64, e: f64) -> f64 {
    1.4e3
        * e.powf(-2.7)
        * (1.0 / (1.0 + 1.1 * e * c / 115.0) + 0.054 / (1.0 + 1.1 * e * c / 850.0))
}

/// The Volkova curvature correction c*, zero when the radicand is
/// non-positive.
fn volkova_c_star(c: f64) -> f64 {
    const P1: f64 = 0.102573;
    const P2: f64 = -0.068287;
    const P3: f64 = 0.0407253;

    let numerator = c * c + P1 * P1 + P2 * c.powf(0.958633) + P3 * c.powf(0.817285);
    let denominator = 1.0 + P1 * P1 + P2 + P3;
    let radicand = numerator / denominator;
    if radicand <= 0.0 {
        0.0
    } else {
        radicand.sqrt()
    }
}

/// Constant charge asymmetry 2f - 1 with f = r / (1 + r), r the CMS charge
/// ratio. Independent of (h, elevation, K).
pub fn asymmetry() -> f64 {
    let f = CMS_CHARGE_RATIO / (1.0 + CMS_CHARGE_RATIO);
    2.0 * f - 1.0
}
