//! The central state machine: builds steppers, drives
//! backward transport to a reference altitude, applies Jacobian
//! reweighting, computes decay probability, and maps reference states to
//! fluxes.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::constants::{BOUNDARY_TOL_M, DETAILED_LOW_CAP_GEV, DETAILED_MID_CAP_GEV, EPS_FLT};
use crate::errors::{self, FluxmeterError};
use crate::geo::{ecef_to_geodetic, Ecef};
use crate::geomagnet::{Geomagnet, GeomagnetCache};
use crate::geometry::atmosphere;
use crate::geometry::layer::Layer;
use crate::geometry::stepper::{compute_anchors, Anchors, LayeredStepper, OpenskyStepper};
use crate::geometry::Geometry;
use crate::observation::{propagation_to_observation_azel, ObservationState, Pid};
use crate::physics::{
    Direction, EnergyLossMode, EventMask, MediumLocator, MediumProperties, MediumPropertiesProvider,
    ParticleState, ScatteringMode, TransportContext, TransportDriver, TransportEvent,
};
use crate::reference::Reference;

/// Backward-transport physics regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Csda,
    Mixed,
    Detailed,
}

/// The outcome of [`Fluxmeter::flux`]: a value, its charge asymmetry, and
/// the transport weight that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluxResult {
    pub value: f64,
    pub asymmetry: f64,
    pub weight: f64,
}

impl FluxResult {
    pub fn zero() -> Self {
        FluxResult {
            value: 0.0,
            asymmetry: 0.0,
            weight: 0.0,
        }
    }
}

/// Per-medium accumulated column depth from [`Fluxmeter::grammage`].
#[derive(Debug, Clone, Default)]
pub struct GrammageResult {
    pub total_kg_m2: f64,
    pub per_medium_kg_m2: HashMap<usize, f64>,
}

struct LayeredLocator<'a> {
    stepper: &'a LayeredStepper,
    layers: &'a [Layer],
    use_external_layer: bool,
}

impl<'a> MediumLocator for LayeredLocator<'a> {
    fn locate(&self, position: &Ecef, direction: &Ecef) -> (f64, usize) {
        self.stepper.step(self.layers, position, direction, self.use_external_layer)
    }
}

struct OpenskyLocator<'a> {
    stepper: &'a OpenskyStepper,
}

impl<'a> MediumLocator for OpenskyLocator<'a> {
    fn locate(&self, position: &Ecef, direction: &Ecef) -> (f64, usize) {
        self.stepper.step(position, direction)
    }
}

/// Supplies density (and, for the atmosphere, a recommended step length) to
/// the driver from the layer stack. Magnetic field is never populated here:
/// this reference driver doesn't act on it, and geomagnetic deflection is
/// explicitly suppressed for [`Fluxmeter::intersect`]/[`Fluxmeter::grammage`]
/// regardless.
struct GeometryProperties<'a> {
    layers: &'a [Layer],
}

impl<'a> MediumPropertiesProvider for GeometryProperties<'a> {
    fn properties(&self, medium_index: usize, position: &Ecef, direction: &Ecef) -> MediumProperties {
        let n = self.layers.len();
        if medium_index >= 1 && medium_index <= n {
            MediumProperties {
                density_kg_m3: self.layers[medium_index - 1].density_kg_m3(),
                magnetic_field: None,
                recommended_step_m: None,
            }
        } else {
            let (lat, lon, h) = ecef_to_geodetic(position);
            let (_, _, up) = crate::geo::enu_basis(lat, lon);
            let elevation_deg = direction.dot(&up).clamp(-1.0, 1.0).asin().to_degrees();
            MediumProperties {
                density_kg_m3: atmosphere::density_kg_m3(h),
                magnetic_field: None,
                recommended_step_m: Some(atmosphere::recommended_step_m(h, elevation_deg)),
            }
        }
    }
}

/// The result of one backward-ascent-plus-forward-Jacobian sample.
struct Sample {
    phi0: f64,
    asymmetry0: f64,
    p_dec: f64,
    weight: f64,
}

/// Regime parameters for one pass through the backward ascent loop.
struct Regime {
    energy_loss: EnergyLossMode,
    scattering: ScatteringMode,
    energy_cap_gev: f64,
}

pub struct Fluxmeter {
    driver: Box<dyn TransportDriver>,
    geometry: Geometry,
    /// material_index per medium_index (1-based; 0 is an unused sentinel).
    medium_materials: Vec<usize>,
    atmosphere_material_index: usize,
    layered_stepper: LayeredStepper,
    opensky_stepper: OpenskyStepper,
    anchors: Anchors,
    mode: Mode,
    reference: Reference,
    rng: StdRng,
    geomagnet: Option<Box<dyn Geomagnet>>,
    geomagnet_cache: GeomagnetCache,
}

impl Fluxmeter {
    /// Builds a fluxmeter. `atmosphere_material` must already be known to
    /// `driver` (registered before construction); unknown materials among
    /// `geometry`'s layers are signalled as `PhysicsSetup` through the
    /// installed error handler and fall back to medium index 0 for that
    /// layer (which disables it rather than panicking).
    pub fn new(
        driver: Box<dyn TransportDriver>,
        geometry: Geometry,
        atmosphere_material: &str,
        mode: Mode,
        reference: Reference,
    ) -> Result<Self, FluxmeterError> {
        let atmosphere_material_index = driver.material_index(atmosphere_material)?;

        let mut medium_materials = vec![0usize; geometry.len() + 3];
        for (i, layer) in geometry.layers().iter().enumerate() {
            match driver.material_index(layer.material()) {
                Ok(material_index) => medium_materials[i + 1] = material_index,
                Err(e) => {
                    errors::signal(e);
                    medium_materials[i + 1] = atmosphere_material_index;
                }
            }
        }
        let n = geometry.len();
        medium_materials[n + 1] = atmosphere_material_index;
        medium_materials[n + 2] = atmosphere_material_index;

        let zmax = geometry.zmax();
        let anchors = compute_anchors(zmax, reference.height_min(), reference.height_max());

        Ok(Fluxmeter {
            driver,
            geometry,
            medium_materials,
            atmosphere_material_index,
            layered_stepper: LayeredStepper::new(anchors.ztop),
            opensky_stepper: OpenskyStepper::new(anchors.zref),
            anchors,
            mode,
            reference,
            rng: StdRng::from_entropy(),
            geomagnet: None,
            geomagnet_cache: GeomagnetCache::new(),
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_reference(&mut self, reference: Reference) {
        self.reference = reference;
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn set_geomagnet(&mut self, geomagnet: Option<Box<dyn Geomagnet>>) {
        self.geomagnet = geomagnet;
        self.geomagnet_cache.invalidate();
    }

    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Field at `position`, or `None` when no geomagnet is installed.
    /// Exercises the fluxmeter's geomagnetic cache; not otherwise consulted
    /// by this crate's reference transport driver.
    pub fn geomagnetic_field_at(&mut self, position_ecef: Ecef) -> Option<Ecef> {
        let geomagnet = self.geomagnet.as_deref()?;
        Some(self.geomagnet_cache.field_at(geomagnet, &position_ecef))
    }

    /// Rebuilds the steppers when the reference's altitude support has
    /// changed since the last call.
    fn maybe_rebuild_steppers(&mut self) {
        let zref_min = self.reference.height_min();
        let zref_max = self.reference.height_max();
        if zref_min == self.anchors.zref_min && zref_max == self.anchors.zref_max {
            return;
        }
        log::debug!("reference altitude support changed, rebuilding steppers");
        let zmax = self.geometry.zmax();
        self.anchors = compute_anchors(zmax, zref_min, zref_max);
        self.layered_stepper = LayeredStepper::new(self.anchors.ztop);
        self.opensky_stepper = OpenskyStepper::new(self.anchors.zref);
    }

    fn regime(&self, kinetic_energy_gev: f64) -> Regime {
        match self.mode {
            Mode::Csda => Regime {
                energy_loss: EnergyLossMode::Csda,
                scattering: ScatteringMode::Disabled,
                energy_cap_gev: self.reference.energy_max(),
            },
            Mode::Mixed => Regime {
                energy_loss: EnergyLossMode::Mixed,
                scattering: ScatteringMode::Disabled,
                energy_cap_gev: self.reference.energy_max(),
            },
            Mode::Detailed => {
                if kinetic_energy_gev <= DETAILED_LOW_CAP_GEV - EPS_FLT {
                    Regime {
                        energy_loss: EnergyLossMode::Straggled,
                        scattering: ScatteringMode::Mixed,
                        energy_cap_gev: DETAILED_LOW_CAP_GEV,
                    }
                } else if kinetic_energy_gev <= DETAILED_MID_CAP_GEV - EPS_FLT {
                    Regime {
                        energy_loss: EnergyLossMode::Mixed,
                        scattering: ScatteringMode::Mixed,
                        energy_cap_gev: DETAILED_MID_CAP_GEV,
                    }
                } else {
                    Regime {
                        energy_loss: EnergyLossMode::Mixed,
                        scattering: ScatteringMode::Disabled,
                        energy_cap_gev: self.reference.energy_max(),
                    }
                }
            }
        }
    }

    /// Runs one full backward-ascent-plus-forward-Jacobian sample for the
    /// given charge. `None` means "abandon" (flux = 0).
    fn run_once(&mut self, observation: &ObservationState, charge: f64) -> Option<Sample> {
        let position = observation.ecef_position();
        let direction = observation.ecef_propagation_direction();
        let use_external_layer = observation.height_m >= self.anchors.ztop + EPS_FLT;
        let needs_ascent = observation.height_m < self.anchors.ztop - EPS_FLT;

        let mut state = ParticleState {
            position,
            direction,
            kinetic_energy_gev: observation.kinetic_energy_gev,
            charge,
            proper_time_m: 0.0,
        };
        let mut weight = 1.0;
        let e0_ascent = state.kinetic_energy_gev;
        let mut ascent_exit_medium: Option<usize> = None;

        if needs_ascent {
            loop {
                let regime = self.regime(state.kinetic_energy_gev);
                log::debug!(
                    "ascend: loss={:?} scattering={:?} cap={}",
                    regime.energy_loss,
                    regime.scattering,
                    regime.energy_cap_gev
                );
                let context = TransportContext {
                    direction: Direction::Backward,
                    energy_loss: regime.energy_loss,
                    scattering: regime.scattering,
                    event_mask: EventMask::energy_limit(),
                    energy_limit_gev: regime.energy_cap_gev,
                    medium_materials: self.medium_materials.clone(),
                };
                let locator = LayeredLocator {
                    stepper: &self.layered_stepper,
                    layers: self.geometry.layers(),
                    use_external_layer,
                };
                let properties = GeometryProperties {
                    layers: self.geometry.layers(),
                };

                let (event, transition) =
                    self.driver.transport(&mut state, &context, &locator, &properties, &mut self.rng);

                match event {
                    TransportEvent::MediumChanged => {
                        ascent_exit_medium = Some(transition.entry_medium);
                        break;
                    }
                    TransportEvent::EnergyLimit => {
                        if self.mode != Mode::Detailed {
                            return None;
                        }
                        if regime.energy_cap_gev >= self.reference.energy_max() {
                            return None;
                        }
                        continue;
                    }
                    TransportEvent::Aborted => return None,
                }
            }

            let (_, _, h) = ecef_to_geodetic(&state.position);
            if (h - self.anchors.ztop).abs() > BOUNDARY_TOL_M {
                return None;
            }

            // CSDA backward transport is deterministic; the ascent leg needs
            // the same stopping-power Jacobian as the atmosphere leg below,
            // evaluated over the medium the particle leaves (scenario A).
            if self.mode == Mode::Csda {
                let medium_index = ascent_exit_medium.unwrap_or(0);
                let material_index = self
                    .medium_materials
                    .get(medium_index)
                    .copied()
                    .unwrap_or(self.atmosphere_material_index);
                let s0 = self
                    .driver
                    .property_stopping_power(EnergyLossMode::Csda, material_index, e0_ascent);
                let s1 = self.driver.property_stopping_power(
                    EnergyLossMode::Csda,
                    material_index,
                    state.kinetic_energy_gev,
                );
                let (s0, s1) = match (s0, s1) {
                    (Some(s0), Some(s1)) if s0 > 0.0 && s1 > 0.0 => (s0, s1),
                    _ => return None,
                };
                weight *= s1 / s0;
            }
        }

        let (_, _, mut h) = ecef_to_geodetic(&state.position);

        if h > self.reference.height_max() + EPS_FLT {
            let t0 = state.proper_time_m;
            let e0 = state.kinetic_energy_gev;
            state.proper_time_m = 0.0;

            let context = TransportContext {
                direction: Direction::Forward,
                energy_loss: EnergyLossMode::Csda,
                scattering: ScatteringMode::Disabled,
                event_mask: EventMask::energy_limit(),
                energy_limit_gev: self.reference.energy_min(),
                medium_materials: self.medium_materials.clone(),
            };
            let locator = OpenskyLocator {
                stepper: &self.opensky_stepper,
            };
            let properties = GeometryProperties {
                layers: self.geometry.layers(),
            };

            let (event, _transition) =
                self.driver.transport(&mut state, &context, &locator, &properties, &mut self.rng);
            if event != TransportEvent::MediumChanged {
                return None;
            }

            let (_, _, h_end) = ecef_to_geodetic(&state.position);
            if (h_end - self.anchors.zref).abs() > BOUNDARY_TOL_M {
                return None;
            }
            h = h_end;

            let t_step = state.proper_time_m;
            state.proper_time_m = t0 - t_step;

            let s0 = self
                .driver
                .property_stopping_power(EnergyLossMode::Csda, self.atmosphere_material_index, e0);
            let s1 = self.driver.property_stopping_power(
                EnergyLossMode::Csda,
                self.atmosphere_material_index,
                state.kinetic_energy_gev,
            );
            let (s0, s1) = match (s0, s1) {
                (Some(s0), Some(s1)) if s0 > 0.0 && s1 > 0.0 => (s0, s1),
                _ => return None,
            };
            weight *= s1 / s0;
        }

        let (lat, lon, _) = ecef_to_geodetic(&state.position);
        let (_, elevation_final) = propagation_to_observation_azel(lat, lon, &state.direction);

        let (phi0, asymmetry0) = self.reference.flux(h, elevation_final, state.kinetic_energy_gev);
        let p_dec = (-state.proper_time_m / crate::constants::MUON_C_TAU_M).exp();

        Some(Sample {
            phi0,
            asymmetry0,
            p_dec,
            weight,
        })
    }

    /// The state-machine entry point.
    pub fn flux(&mut self, observation: &ObservationState) -> FluxResult {
        if let Err(e) = observation.validate() {
            errors::signal(e);
            return FluxResult::zero();
        }
        self.maybe_rebuild_steppers();

        match observation.pid {
            Pid::Untagged => match self.geomagnet {
                None => match self.run_once(observation, -1.0) {
                    Some(sample) => FluxResult {
                        value: sample.phi0 * sample.p_dec * sample.weight,
                        asymmetry: sample.asymmetry0,
                        weight: sample.weight,
                    },
                    None => FluxResult::zero(),
                },
                Some(_) => {
                    let r0 = self.run_once(observation, -1.0);
                    let r1 = self.run_once(observation, 1.0);
                    match (r0, r1) {
                        (Some(muon), Some(anti_muon)) => {
                            let v0 = muon.phi0 * muon.p_dec * muon.weight * 0.5 * (1.0 - muon.asymmetry0);
                            let v1 = anti_muon.phi0
                                * anti_muon.p_dec
                                * anti_muon.weight
                                * 0.5
                                * (1.0 + anti_muon.asymmetry0);
                            let sum = v0 + v1;
                            let asymmetry = if sum > 0.0 { (v1 - v0) / sum } else { 0.0 };
                            FluxResult {
                                value: sum,
                                asymmetry,
                                weight: 0.5 * (muon.weight + anti_muon.weight),
                            }
                        }
                        _ => FluxResult::zero(),
                    }
                }
            },
            Pid::Muon | Pid::AntiMuon => {
                let charge = observation.pid.charge().unwrap();
                match self.run_once(observation, charge) {
                    Some(sample) => {
                        let value = sample.phi0 * sample.p_dec * sample.weight * 0.5 * (1.0 + charge * sample.asymmetry0);
                        FluxResult {
                            value,
                            asymmetry: charge,
                            weight: sample.weight,
                        }
                    }
                    None => FluxResult::zero(),
                }
            }
        }
    }

    /// intersect(position, direction): forward transport with energy-loss
    /// disabled, returning the medium entered at the first boundary
    /// crossing and the geographic position there.
    pub fn intersect(&mut self, position_ecef: Ecef, direction_ecef: Ecef) -> Option<(usize, (f64, f64, f64))> {
        self.maybe_rebuild_steppers();
        let use_external_layer = {
            let (_, _, h) = ecef_to_geodetic(&position_ecef);
            h >= self.anchors.ztop + EPS_FLT
        };
        let (distance, entry_medium) =
            self.layered_stepper
                .step(self.geometry.layers(), &position_ecef, &direction_ecef, use_external_layer);
        if entry_medium == 0 {
            return None;
        }
        let crossing = position_ecef + direction_ecef * distance;
        let (_, exit_medium) =
            self.layered_stepper
                .step(self.geometry.layers(), &crossing, &direction_ecef, use_external_layer);
        Some((exit_medium, ecef_to_geodetic(&crossing)))
    }

    /// whereami(position): the layer index minus one, or -1 when outside
    /// the geometry.
    pub fn whereami(&mut self, position_ecef: Ecef) -> i64 {
        self.maybe_rebuild_steppers();
        let use_external_layer = {
            let (_, _, h) = ecef_to_geodetic(&position_ecef);
            h >= self.anchors.ztop + EPS_FLT
        };
        let probe_direction = Ecef::new(0.0, 0.0, 1.0);
        let (_, medium_index) =
            self.layered_stepper
                .step(self.geometry.layers(), &position_ecef, &probe_direction, use_external_layer);
        medium_index as i64 - 1
    }

    fn density_for_medium(&self, medium_index: usize, position: &Ecef) -> f64 {
        let n = self.geometry.len();
        if medium_index >= 1 && medium_index <= n {
            self.geometry.layer(medium_index - 1).unwrap().density_kg_m3()
        } else {
            let (_, _, h) = ecef_to_geodetic(position);
            atmosphere::density_kg_m3(h)
        }
    }

    /// grammage(position, direction): forward transport accumulating column
    /// depth into the current-medium bucket until the ray leaves the
    /// geometry.
    pub fn grammage(&mut self, position_ecef: Ecef, direction_ecef: Ecef) -> GrammageResult {
        self.maybe_rebuild_steppers();
        let use_external_layer = {
            let (_, _, h) = ecef_to_geodetic(&position_ecef);
            h >= self.anchors.ztop + EPS_FLT
        };

        let mut pos = position_ecef;
        let mut result = GrammageResult::default();
        loop {
            let (distance, medium_index) =
                self.layered_stepper
                    .step(self.geometry.layers(), &pos, &direction_ecef, use_external_layer);
            if medium_index == 0 || !distance.is_finite() || distance > 1.0e8 {
                break;
            }
            let density = self.density_for_medium(medium_index, &pos);
            let contribution = density * distance;
            result.total_kg_m2 += contribution;
            *result.per_medium_kg_m2.entry(medium_index).or_insert(0.0) += contribution;
            pos += direction_ecef * distance;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::geodetic_to_ecef;
    use crate::geometry::elevation::GridElevationMap;
    use crate::physics::simple::StraightLineDriver;
    use approx::assert_relative_eq;

    fn driver() -> Box<dyn TransportDriver> {
        Box::new(StraightLineDriver::new())
    }

    #[test]
    fn no_layers_weight_one() {
        let geometry = Geometry::new(Vec::new());
        let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

        let observation = ObservationState::new(Pid::Untagged, 45.0, 10.0, 0.0, 0.0, 90.0, 1.0);
        let result = fluxmeter.flux(&observation);
        let (expected_value, expected_asymmetry) = Reference::Default.flux(0.0, 90.0, 1.0);

        assert_relative_eq!(result.value, expected_value, max_relative = 1.0e-9);
        assert_relative_eq!(result.asymmetry, expected_asymmetry, max_relative = 1.0e-9);
        assert_relative_eq!(result.weight, 1.0, max_relative = 1.0e-9);
    }

    #[test]
    fn high_observer_triggers_jacobian_step() {
        let geometry = Geometry::new(Vec::new());
        let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

        let observation = ObservationState::new(Pid::Untagged, 45.0, 10.0, 100_000.0, 0.0, 90.0, 1.0);
        let result = fluxmeter.flux(&observation);

        assert!(result.value.is_finite());
        assert!((result.weight - 1.0).abs() > 1.0e-12);
    }

    #[test]
    fn zero_energy_returns_zero_and_signals() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let geometry = Geometry::new(Vec::new());
        let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

        let signalled = Arc::new(AtomicBool::new(false));
        let flag = signalled.clone();
        let previous = errors::set_error_handler(move |e| {
            if let FluxmeterError::BadInput(msg) = e {
                if msg == "bad kinetic energy (0)" {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        });

        let observation = ObservationState::new(Pid::Untagged, 45.0, 10.0, 0.0, 0.0, 90.0, 0.0);
        let result = fluxmeter.flux(&observation);

        errors::restore_error_handler(previous);
        errors::clear_error_handler();

        assert_eq!(result.value, 0.0);
        assert!(signalled.load(Ordering::SeqCst));
    }

    #[test]
    fn vertical_grammage_through_rock_slab() {
        let layer = Layer::new("Rock", None, 100.0, 2650.0).unwrap();
        let geometry = Geometry::new(vec![layer]);
        let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

        let bottom = geodetic_to_ecef(0.0, 0.0, 0.0);
        let up = Ecef::new(0.0, 0.0, 1.0);
        let result = fluxmeter.grammage(bottom, up);

        assert_relative_eq!(result.per_medium_kg_m2[&1], 2650.0 * 100.0, max_relative = 1.0e-3);
    }

    #[test]
    fn whereami_reports_outside_below_floor() {
        let geometry = Geometry::new(Vec::new());
        let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();
        let below = geodetic_to_ecef(0.0, 0.0, -20_000.0);
        assert_eq!(fluxmeter.whereami(below), -1);
    }

    #[test]
    fn stepper_rebuilds_only_when_reference_support_changes() {
        let geometry = Geometry::new(Vec::new());
        let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();
        let before = fluxmeter.anchors;

        fluxmeter.maybe_rebuild_steppers();
        assert_eq!(fluxmeter.anchors, before);
    }

    #[test]
    fn unknown_elevation_map_path_surfaces_as_io_error() {
        let result = GridElevationMap::load("/nonexistent/path/does-not-exist.bin");
        assert!(matches!(result, Err(FluxmeterError::Io(_))));
    }
}
