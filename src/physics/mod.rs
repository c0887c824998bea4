//! The physics and Monte Carlo driver contract: a black-box muon transport
//! engine, expressed as a trait rather than baking a single implementation
//! into the orchestrator.
//!
//! One concrete, fully-working adapter ships in [`simple`]: a reference
//! back-end, not a production-accuracy one. A real deployment links PUMAS
//! (or an equivalent) through the same trait.

pub mod simple;

use rand::RngCore;

use crate::errors::FluxmeterError;
use crate::geo::Ecef;

/// Time-reversal sense of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Energy-loss treatment (CSDA / Mixed / Detailed all ultimately select one
/// of these per sub-step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyLossMode {
    Disabled,
    Csda,
    Mixed,
    Straggled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatteringMode {
    Disabled,
    Mixed,
}

/// Which optional stop conditions the driver should watch for, beyond the
/// medium boundary it always detects.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMask {
    pub energy_limit: bool,
}

impl EventMask {
    pub fn energy_limit() -> Self {
        EventMask { energy_limit: true }
    }

    pub fn none() -> Self {
        EventMask { energy_limit: false }
    }
}

/// Mutable transport configuration, rebuilt by the orchestrator before each
/// regime.
#[derive(Debug, Clone)]
pub struct TransportContext {
    pub direction: Direction,
    pub energy_loss: EnergyLossMode,
    pub scattering: ScatteringMode,
    pub event_mask: EventMask,
    pub energy_limit_gev: f64,
    /// material_index per medium_index (1-based; index 0 is the unused
    /// "outside" sentinel), set up by the fluxmeter from its layer
    /// materials plus one atmosphere entry.
    pub medium_materials: Vec<usize>,
}

/// The particle state threaded through successive `transport` calls.
#[derive(Debug, Clone, Copy)]
pub struct ParticleState {
    pub position: Ecef,
    /// Fixed spatial propagation direction (unit vector). Unlike
    /// [`Direction`], this never flips between the backward ascent and the
    /// forward Jacobian step — both walk the same physical ray outward from
    /// the observer; only the sign of the energy-loss integral changes.
    pub direction: Ecef,
    pub kinetic_energy_gev: f64,
    pub charge: f64,
    /// Accumulated proper time times c, in meters (c * tau).
    pub proper_time_m: f64,
}

/// What stopped a [`TransportDriver::transport`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The particle crossed into a new medium index.
    MediumChanged,
    /// The configured energy limit was reached (only possible when
    /// `event_mask.energy_limit` is set).
    EnergyLimit,
    /// Any other terminal condition: left the geometry, a non-positive
    /// stopping power, or a host callback abort.
    Aborted,
}

/// entry/exit medium indices for a completed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumTransition {
    pub entry_medium: usize,
    pub exit_medium: usize,
}

/// A locator callback resolving (distance to next boundary, medium index)
/// from a position and propagation direction.
pub trait MediumLocator {
    fn locate(&self, position: &Ecef, direction: &Ecef) -> (f64, usize);
}

/// Local properties of a medium at a position: density, and optionally a
/// magnetic field and a recommended sub-step length.
#[derive(Debug, Clone, Copy)]
pub struct MediumProperties {
    pub density_kg_m3: f64,
    pub magnetic_field: Option<Ecef>,
    pub recommended_step_m: Option<f64>,
}

pub trait MediumPropertiesProvider {
    fn properties(&self, medium_index: usize, position: &Ecef, direction: &Ecef) -> MediumProperties;
}

/// The black-box muon transport engine.
pub trait TransportDriver {
    /// Resolves a material name to a driver-internal index, failing with
    /// `PhysicsSetup` if the physics tables carry no such material.
    fn material_index(&self, name: &str) -> Result<usize, FluxmeterError>;

    /// Mass stopping power s(E) for Jacobian reweighting, in GeV*m^2/kg
    /// (multiply by local density to get dE/dX in GeV/m). `None` or a
    /// non-positive return means the lookup failed or is out of range.
    fn property_stopping_power(
        &self,
        mode: EnergyLossMode,
        material_index: usize,
        kinetic_energy_gev: f64,
    ) -> Option<f64>;

    /// Advances `state` until the first stop cause, one of three
    /// termination branches.
    fn transport(
        &self,
        state: &mut ParticleState,
        context: &TransportContext,
        locator: &dyn MediumLocator,
        properties: &dyn MediumPropertiesProvider,
        rng: &mut dyn RngCore,
    ) -> (TransportEvent, MediumTransition);
}
