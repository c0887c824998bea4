//! Observer state and particle identity.

use crate::errors::FluxmeterError;
use crate::geo::{azel_to_ecef_direction, ecef_direction_to_azel, geodetic_to_ecef, Ecef};

/// Particle identity reported by or requested of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pid {
    Muon,
    AntiMuon,
    Untagged,
}

impl Pid {
    /// The transport charge associated with this PID, or `None` for
    /// `Untagged` (the orchestrator decides the charge(s) to run itself).
    pub fn charge(self) -> Option<f64> {
        match self {
            Pid::Muon => Some(-1.0),
            Pid::AntiMuon => Some(1.0),
            Pid::Untagged => None,
        }
    }
}

/// An observer state as handed to [`crate::fluxmeter::Fluxmeter::flux`].
///
/// `direction` is the *observation* direction (where the observer looks),
/// not the propagation direction.
#[derive(Debug, Clone, Copy)]
pub struct ObservationState {
    pub pid: Pid,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub height_m: f64,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub kinetic_energy_gev: f64,
    /// Transport weight. Irrelevant on input; meaningful only on output.
    pub weight: f64,
}

impl ObservationState {
    pub fn new(
        pid: Pid,
        latitude_deg: f64,
        longitude_deg: f64,
        height_m: f64,
        azimuth_deg: f64,
        elevation_deg: f64,
        kinetic_energy_gev: f64,
    ) -> Self {
        ObservationState {
            pid,
            latitude_deg,
            longitude_deg,
            height_m,
            azimuth_deg,
            elevation_deg,
            kinetic_energy_gev,
            weight: 0.0,
        }
    }

    /// Rejects non-physical kinetic energy. Callers signal this through the
    /// installed error handler and treat the call as having produced zero
    /// flux.
    pub fn validate(&self) -> Result<(), FluxmeterError> {
        if self.kinetic_energy_gev <= 0.0 {
            return Err(FluxmeterError::BadInput(format!(
                "bad kinetic energy ({})",
                self.kinetic_energy_gev
            )));
        }
        Ok(())
    }

    /// Observer position in ECEF, meters.
    pub fn ecef_position(&self) -> Ecef {
        geodetic_to_ecef(self.latitude_deg, self.longitude_deg, self.height_m)
    }

    /// ECEF unit vector the observer is looking along.
    pub fn ecef_observation_direction(&self) -> Ecef {
        azel_to_ecef_direction(
            self.latitude_deg,
            self.longitude_deg,
            self.azimuth_deg,
            self.elevation_deg,
        )
    }

    /// ECEF unit vector the muon propagates along: the negation of the
    /// observation direction.
    pub fn ecef_propagation_direction(&self) -> Ecef {
        -self.ecef_observation_direction()
    }
}

/// Recovers (azimuth, elevation) of the *observation* direction at `lat,lon`
/// from an ECEF *propagation* direction, undoing the negation in
/// [`ObservationState::ecef_propagation_direction`]. Used when reporting the
/// direction at the reference altitude after transport.
pub fn propagation_to_observation_azel(lat_deg: f64, lon_deg: f64, propagation: &Ecef) -> (f64, f64) {
    ecef_direction_to_azel(lat_deg, lon_deg, &(-propagation))
}
