//! [`StraightLineDriver`]: a reference [`super::TransportDriver`] adapter.
//!
//! Stopping power follows the textbook a(E) + b(E)*E parameterisation (PDG
//! muon energy-loss review); multiple scattering uses the Highland
//! approximation for the Gaussian core width. Neither aims for
//! production accuracy — this back-end exists so the orchestrator, CLI and
//! test suite have a fully-working driver to run against without linking an
//! external physics-table library.

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::constants::MUON_MASS_GEV;
use crate::errors::FluxmeterError;
use crate::geo::Ecef;

use super::{
    Direction, EnergyLossMode, MediumLocator, MediumProperties, MediumPropertiesProvider,
    MediumTransition, ParticleState, ScatteringMode, TransportContext, TransportDriver, TransportEvent,
};

/// Highland formula constant, GeV.
const HIGHLAND_K_GEV: f64 = 0.0136;

/// Radiation-length surrogate, kg/m^2. Not material-specific: this driver
/// doesn't model radiation length per material, only ionization-like
/// stopping power, so the scattering width is deliberately generic.
const RADIATION_LENGTH_KG_M2: f64 = 1.0e3;

/// A registered material's mass stopping power parameters: s(E) =
/// `ionization` + `radiative` * E, in GeV*cm^2/g.
#[derive(Debug, Clone, Copy)]
struct MaterialParams {
    ionization_gev_cm2_g: f64,
    radiative_gev_cm2_g: f64,
}

#[derive(Debug, Clone)]
pub struct StraightLineDriver {
    materials: Vec<(String, MaterialParams)>,
}

impl Default for StraightLineDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StraightLineDriver {
    /// A driver pre-populated with a handful of common materials.
    pub fn new() -> Self {
        let mut driver = StraightLineDriver { materials: Vec::new() };
        driver.register_material("Rock", 0.00220, 3.0e-6);
        driver.register_material("StandardRock", 0.00221, 3.0e-6);
        driver.register_material("Water", 0.00194, 2.5e-6);
        driver.register_material("Air", 0.00194, 1.5e-6);
        driver
    }

    /// Registers (or replaces) a material's mass stopping power parameters.
    pub fn register_material(
        &mut self,
        name: impl Into<String>,
        ionization_gev_cm2_g: f64,
        radiative_gev_cm2_g: f64,
    ) {
        let name = name.into();
        let params = MaterialParams {
            ionization_gev_cm2_g,
            radiative_gev_cm2_g,
        };
        match self.materials.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = params,
            None => self.materials.push((name, params)),
        }
    }

    fn momentum_gev(kinetic_energy_gev: f64) -> f64 {
        let total_energy = kinetic_energy_gev + MUON_MASS_GEV;
        (total_energy * total_energy - MUON_MASS_GEV * MUON_MASS_GEV).max(1.0e-12).sqrt()
    }

    fn apply_scattering_kick(state: &mut ParticleState, rng: &mut dyn rand::RngCore, step_m: f64, density_kg_m3: f64) {
        let grammage_kg_m2 = step_m * density_kg_m3;
        if grammage_kg_m2 <= 0.0 {
            return;
        }
        let x_over_x0 = grammage_kg_m2 / RADIATION_LENGTH_KG_M2;
        let momentum = Self::momentum_gev(state.kinetic_energy_gev);
        let sigma = HIGHLAND_K_GEV / momentum * x_over_x0.sqrt();
        if !sigma.is_finite() || sigma <= 0.0 {
            return;
        }

        let normal = match Normal::new(0.0, sigma) {
            Ok(n) => n,
            Err(_) => return,
        };
        let theta: f64 = normal.sample(rng);
        let phi: f64 = rng.gen::<f64>() * std::f64::consts::TAU;

        let dir = state.direction;
        let helper = if dir.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        let e1 = dir.cross(&helper).normalize();
        let e2 = dir.cross(&e1).normalize();
        let tilted = dir * theta.cos() + (e1 * phi.cos() + e2 * phi.sin()) * theta.sin();
        state.direction = tilted.normalize();
    }
}

impl TransportDriver for StraightLineDriver {
    fn material_index(&self, name: &str) -> Result<usize, FluxmeterError> {
        self.materials
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| FluxmeterError::PhysicsSetup(format!("unknown material \"{}\"", name)))
    }

    fn property_stopping_power(
        &self,
        mode: EnergyLossMode,
        material_index: usize,
        kinetic_energy_gev: f64,
    ) -> Option<f64> {
        if mode == EnergyLossMode::Disabled {
            return None;
        }
        let (_, params) = self.materials.get(material_index)?;
        let s_gev_cm2_g = params.ionization_gev_cm2_g + params.radiative_gev_cm2_g * kinetic_energy_gev;
        // 1 cm^2/g = 0.1 m^2/kg.
        Some(s_gev_cm2_g * 0.1)
    }

    fn transport(
        &self,
        state: &mut ParticleState,
        context: &TransportContext,
        locator: &dyn MediumLocator,
        properties: &dyn MediumPropertiesProvider,
        rng: &mut dyn rand::RngCore,
    ) -> (TransportEvent, MediumTransition) {
        let (_, entry_medium) = locator.locate(&state.position, &state.direction);
        if entry_medium == 0 {
            return (
                TransportEvent::Aborted,
                MediumTransition {
                    entry_medium: 0,
                    exit_medium: 0,
                },
            );
        }

        loop {
            let (distance, medium_index) = locator.locate(&state.position, &state.direction);
            if medium_index == 0 {
                return (
                    TransportEvent::Aborted,
                    MediumTransition {
                        entry_medium,
                        exit_medium: 0,
                    },
                );
            }

            let material_index = match context.medium_materials.get(medium_index) {
                Some(&m) => m,
                None => {
                    return (
                        TransportEvent::Aborted,
                        MediumTransition {
                            entry_medium,
                            exit_medium: medium_index,
                        },
                    )
                }
            };

            if context.energy_loss == EnergyLossMode::Disabled {
                state.position += state.direction * distance;
                state.proper_time_m += distance * MUON_MASS_GEV / Self::momentum_gev(state.kinetic_energy_gev);
                let (_, exit_medium) = locator.locate(&state.position, &state.direction);
                return (
                    TransportEvent::MediumChanged,
                    MediumTransition { entry_medium, exit_medium },
                );
            }

            let props = properties.properties(medium_index, &state.position, &state.direction);
            let s = match self.property_stopping_power(context.energy_loss, material_index, state.kinetic_energy_gev) {
                Some(s) if s > 0.0 => s,
                _ => {
                    return (
                        TransportEvent::Aborted,
                        MediumTransition {
                            entry_medium,
                            exit_medium: medium_index,
                        },
                    )
                }
            };
            let dedx_gev_per_m = s * props.density_kg_m3;

            let mut step = props
                .recommended_step_m
                .unwrap_or(distance)
                .min(distance)
                .max(f64::MIN_POSITIVE);

            let mut hit_energy_limit = false;
            if context.event_mask.energy_limit && dedx_gev_per_m > 0.0 {
                let budget = match context.direction {
                    Direction::Forward => state.kinetic_energy_gev,
                    Direction::Backward => (context.energy_limit_gev - state.kinetic_energy_gev).max(0.0),
                };
                let limited_step = budget / dedx_gev_per_m;
                if limited_step <= step {
                    step = limited_step.max(0.0);
                    hit_energy_limit = true;
                }
            }

            let sign = match context.direction {
                Direction::Forward => -1.0,
                Direction::Backward => 1.0,
            };
            let delta_e = sign * dedx_gev_per_m * step;
            let new_energy = state.kinetic_energy_gev + delta_e;
            state.kinetic_energy_gev = match context.direction {
                Direction::Forward => new_energy.max(0.0),
                Direction::Backward => new_energy.min(context.energy_limit_gev),
            };

            state.position += state.direction * step;
            state.proper_time_m += step * MUON_MASS_GEV / Self::momentum_gev(state.kinetic_energy_gev);

            if context.scattering == ScatteringMode::Mixed {
                Self::apply_scattering_kick(state, rng, step, props.density_kg_m3);
            }

            if hit_energy_limit {
                return (
                    TransportEvent::EnergyLimit,
                    MediumTransition {
                        entry_medium,
                        exit_medium: medium_index,
                    },
                );
            }

            if (step - distance).abs() < 1.0e-9 {
                let (_, exit_medium) = locator.locate(&state.position, &state.direction);
                return (
                    TransportEvent::MediumChanged,
                    MediumTransition { entry_medium, exit_medium },
                );
            }
            // Sub-stepped because of a recommended step shorter than the
            // boundary distance; loop again from the advanced position.
        }
    }
}
