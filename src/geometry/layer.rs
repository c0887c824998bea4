//! The topographic layer.

use crate::constants::ZMIN;
use crate::errors::FluxmeterError;
use crate::geometry::elevation::ElevationMap;

/// An indexed stratum: a material, an optional elevation map, a constant
/// vertical offset, and a mutable bulk density.
///
/// Immutable after construction except for `density_kg_m3`, which may be
/// edited at any time between fluxmeter calls.
#[derive(Debug)]
pub struct Layer {
    material: String,
    elevation_map: Option<Box<dyn ElevationMap>>,
    offset_m: f64,
    density_kg_m3: f64,
}

impl Layer {
    /// Constructs a layer. `elevation_map` is `None` for a flat layer at
    /// `offset_m`. Construction itself cannot fail here — any IO needed to
    /// build the map happens in the map's own loader (e.g.
    /// [`crate::geometry::elevation::GridElevationMap::load`]) before this
    /// is called.
    pub fn new(
        material: impl Into<String>,
        elevation_map: Option<Box<dyn ElevationMap>>,
        offset_m: f64,
        density_kg_m3: f64,
    ) -> Result<Self, FluxmeterError> {
        if density_kg_m3 < 0.0 {
            return Err(FluxmeterError::BadInput(format!(
                "negative layer density ({})",
                density_kg_m3
            )));
        }
        Ok(Layer {
            material: material.into(),
            elevation_map,
            offset_m,
            density_kg_m3,
        })
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn offset_m(&self) -> f64 {
        self.offset_m
    }

    pub fn density_kg_m3(&self) -> f64 {
        self.density_kg_m3
    }

    /// Density mutation never fails.
    pub fn set_density_kg_m3(&mut self, density_kg_m3: f64) {
        self.density_kg_m3 = density_kg_m3;
    }

    /// height(x, y) -> z.
    pub fn height(&self, x: f64, y: f64) -> f64 {
        match &self.elevation_map {
            None => self.offset_m,
            Some(map) => match map.height(x, y) {
                Some(z) => z + self.offset_m,
                None => ZMIN,
            },
        }
    }

    /// gradient(x, y) -> (dz/dx, dz/dy), zero outside the domain.
    pub fn gradient(&self, x: f64, y: f64) -> (f64, f64) {
        match &self.elevation_map {
            None => (0.0, 0.0),
            Some(map) => map.gradient(x, y).unwrap_or((0.0, 0.0)),
        }
    }

    /// coordinates(x, y) -> (lat, lon); identity (x -> lon, y -> lat) when
    /// there is no map.
    pub fn coordinates(&self, x: f64, y: f64) -> (f64, f64) {
        match &self.elevation_map {
            None => (y, x),
            Some(map) => map.unproject(x, y),
        }
    }

    /// project(lat, lon) -> (x, y); inverse of [`Layer::coordinates`].
    pub fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        match &self.elevation_map {
            None => (lon, lat),
            Some(map) => map.project(lat, lon),
        }
    }

    /// The layer's vertical domain [zmin, zmax] including the offset. For a
    /// map-less layer both bounds equal the offset.
    pub fn z_bounds(&self) -> (f64, f64) {
        match &self.elevation_map {
            None => (self.offset_m, self.offset_m),
            Some(map) => {
                let (zmin, zmax) = map.height_bounds();
                (zmin + self.offset_m, zmax + self.offset_m)
            }
        }
    }

    /// The horizontal domain (xmin, xmax, ymin, ymax), or unbounded for a
    /// map-less layer.
    pub fn xy_domain(&self) -> (f64, f64, f64, f64) {
        match &self.elevation_map {
            None => (f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY),
            Some(map) => map.domain(),
        }
    }
}
