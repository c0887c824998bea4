//! Scenario-file configuration: a TOML file describing a fluxmeter's
//! geometry, materials, transport mode and reference flux, loaded with the
//! `config` crate and deserialized with `serde`.

use std::path::Path;

use config::{Config, File};
use serde_derive::Deserialize;

use crate::errors::FluxmeterError;
use crate::fluxmeter::{Fluxmeter, Mode};
use crate::geometry::elevation::GridElevationMap;
use crate::geometry::layer::Layer;
use crate::geometry::Geometry;
use crate::physics::simple::StraightLineDriver;
use crate::physics::TransportDriver;
use crate::reference::table::TabulatedReference;
use crate::reference::Reference;

#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    pub material: String,
    #[serde(default)]
    pub dem_path: Option<String>,
    #[serde(default)]
    pub offset_m: f64,
    pub density_kg_m3: f64,
}

/// A custom material's mass stopping power parameters, registered into the
/// built-in reference driver alongside its four defaults (Rock,
/// StandardRock, Water, Air).
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialConfig {
    pub name: String,
    pub ionization_gev_cm2_g: f64,
    pub radiative_gev_cm2_g: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModeConfig {
    Csda,
    Mixed,
    Detailed,
}

impl From<ModeConfig> for Mode {
    fn from(mode: ModeConfig) -> Self {
        match mode {
            ModeConfig::Csda => Mode::Csda,
            ModeConfig::Mixed => Mode::Mixed,
            ModeConfig::Detailed => Mode::Detailed,
        }
    }
}

fn default_mode() -> ModeConfig {
    ModeConfig::Csda
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceConfig {
    /// Path to a tabulated reference file; `None` selects the built-in
    /// default parameterisation.
    pub table_path: Option<String>,
}

/// A complete fluxmeter scenario, as loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FluxmeterConfig {
    pub atmosphere_material: String,
    #[serde(default)]
    pub materials: Vec<MaterialConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default = "default_mode")]
    pub mode: ModeConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
}

impl FluxmeterConfig {
    /// Loads a scenario from a TOML file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FluxmeterError> {
        let path = path.as_ref();
        let mut raw = Config::new();
        raw.merge(File::with_name(&path.to_string_lossy()))
            .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))?;
        raw.try_into()
            .map_err(|e| FluxmeterError::Format(format!("{}: {}", path.display(), e)))
    }

    /// Builds a ready-to-use fluxmeter from this scenario, using the
    /// reference `StraightLineDriver` back-end.
    pub fn build(&self) -> Result<Fluxmeter, FluxmeterError> {
        let mut driver = StraightLineDriver::new();
        for material in &self.materials {
            driver.register_material(
                material.name.clone(),
                material.ionization_gev_cm2_g,
                material.radiative_gev_cm2_g,
            );
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        for layer_config in &self.layers {
            let elevation_map = match &layer_config.dem_path {
                Some(path) => Some(Box::new(GridElevationMap::load(path)?) as Box<dyn crate::geometry::elevation::ElevationMap>),
                None => None,
            };
            layers.push(Layer::new(
                layer_config.material.clone(),
                elevation_map,
                layer_config.offset_m,
                layer_config.density_kg_m3,
            )?);
        }
        let geometry = Geometry::new(layers);

        let reference = match &self.reference.table_path {
            Some(path) => Reference::Tabulated(TabulatedReference::load(path)?),
            None => Reference::Default,
        };

        Fluxmeter::new(
            Box::new(driver) as Box<dyn TransportDriver>,
            geometry,
            &self.atmosphere_material,
            self.mode.into(),
            reference,
        )
    }
}
