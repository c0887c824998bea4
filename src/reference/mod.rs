//! Reference (opensky) flux: either the built-in [`default`] parameterisation
//! or a [`table`]-backed interpolated flux.

pub mod default;
pub mod table;

use table::TabulatedReference;

/// The default parameterisation's energy support is not bounded by a grid;
/// these are the practical limits the orchestrator caps backward transport
/// at when no table is loaded. An implementation choice, recorded in
/// DESIGN.md.
const DEFAULT_ENERGY_MIN_GEV: f64 = 1.0e-1;
const DEFAULT_ENERGY_MAX_GEV: f64 = 1.0e12;

/// The default parameterisation has no altitude dependence of its own (it
/// only validates the input altitude falls within an atmosphere-wide
/// range); the orchestrator needs a single altitude to anchor the forward
/// CSDA Jacobian step against, so this reports the conventional ground
/// reference altitude the parameterisation is quoted at, not the
/// atmosphere's full vertical extent. An implementation choice, recorded in
/// DESIGN.md.
const DEFAULT_REFERENCE_HEIGHT_M: f64 = 0.0;

/// A reference flux: the analytic default, or a loaded table.
#[derive(Debug, Clone)]
pub enum Reference {
    Default,
    Tabulated(TabulatedReference),
}

impl Reference {
    /// (value, asymmetry) at the given altitude (m), elevation (deg) and
    /// kinetic energy (GeV).
    pub fn flux(&self, height_m: f64, elevation_deg: f64, kinetic_energy_gev: f64) -> (f64, f64) {
        match self {
            Reference::Default => default::flux(height_m, elevation_deg, kinetic_energy_gev),
            Reference::Tabulated(table) => table.flux(height_m, elevation_deg, kinetic_energy_gev),
        }
    }

    pub fn energy_min(&self) -> f64 {
        match self {
            Reference::Default => DEFAULT_ENERGY_MIN_GEV,
            Reference::Tabulated(table) => table.energy_min(),
        }
    }

    pub fn energy_max(&self) -> f64 {
        match self {
            Reference::Default => DEFAULT_ENERGY_MAX_GEV,
            Reference::Tabulated(table) => table.energy_max(),
        }
    }

    pub fn height_min(&self) -> f64 {
        match self {
            Reference::Default => DEFAULT_REFERENCE_HEIGHT_M,
            Reference::Tabulated(table) => table.height_min(),
        }
    }

    pub fn height_max(&self) -> f64 {
        match self {
            Reference::Default => DEFAULT_REFERENCE_HEIGHT_M,
            Reference::Tabulated(table) => table.height_max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reference_support_is_a_single_ground_altitude() {
        let reference = Reference::Default;
        assert_eq!(reference.height_min(), DEFAULT_REFERENCE_HEIGHT_M);
        assert_eq!(reference.height_max(), DEFAULT_REFERENCE_HEIGHT_M);
    }
}
