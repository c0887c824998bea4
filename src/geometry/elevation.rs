//! The elevation-map collaborator and a small concrete adapter for it.
//!
//! Production DEM decoding (GeoTIFF, SRTM HGT, etc.) is out of scope;
//! [`ElevationMap`] is the seam a host crate plugs a real raster reader
//! into. The one adapter shipped here, [`GridElevationMap`], reads a
//! minimal self describing little-endian grid format so the rest of the
//! crate — and its tests — have something real to run against without
//! pulling in a raster library.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::errors::FluxmeterError;

/// A queryable elevation surface over a rectangular (x, y) domain, in the
/// map's native projected coordinates.
pub trait ElevationMap: fmt::Debug {
    /// (xmin, xmax, ymin, ymax) of the map's domain.
    fn domain(&self) -> (f64, f64, f64, f64);

    /// (nx, ny) grid sample counts.
    fn grid_counts(&self) -> (usize, usize);

    /// (zmin, zmax) of the raw height samples, before any layer offset.
    fn height_bounds(&self) -> (f64, f64);

    /// Height at (x, y), or `None` if (x, y) falls outside the domain.
    fn height(&self, x: f64, y: f64) -> Option<f64>;

    /// (dz/dx, dz/dy) at (x, y), or `None` if (x, y) falls outside the domain.
    fn gradient(&self, x: f64, y: f64) -> Option<(f64, f64)>;

    /// Unprojects map coordinates to (lat, lon) in degrees.
    fn unproject(&self, x: f64, y: f64) -> (f64, f64);

    /// Projects (lat, lon) in degrees to map coordinates.
    fn project(&self, lat: f64, lon: f64) -> (f64, f64);
}

/// A regular grid of single-precision height samples with an identity
/// (unprojected) lat/lon mapping: x is longitude, y is latitude, both in
/// degrees. Real deployments with a projected DEM implement [`ElevationMap`]
/// directly instead.
#[derive(Debug, Clone)]
pub struct GridElevationMap {
    nx: usize,
    ny: usize,
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    zmin: f64,
    zmax: f64,
    samples: Vec<f32>,
}

impl GridElevationMap {
    /// Loads a grid from the little-endian binary format:
    /// header = (nx: i64, ny: i64, xmin: f64, xmax: f64, ymin: f64, ymax: f64),
    /// body = nx * ny f32 samples, row-major with x varying fastest.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FluxmeterError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let nx = reader
            .read_i64::<LittleEndian>()
            .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))?;
        let ny = reader
            .read_i64::<LittleEndian>()
            .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))?;
        if nx <= 0 || ny <= 0 {
            return Err(FluxmeterError::Format(format!(
                "{}: non-positive grid dimensions ({}, {})",
                path.display(),
                nx,
                ny
            )));
        }
        let (nx, ny) = (nx as usize, ny as usize);

        let mut header = [0.0f64; 4];
        for slot in header.iter_mut() {
            *slot = reader
                .read_f64::<LittleEndian>()
                .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))?;
        }
        let [xmin, xmax, ymin, ymax] = header;

        let count = nx
            .checked_mul(ny)
            .ok_or_else(|| FluxmeterError::Resource(format!("{}: grid too large", path.display())))?;
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let v = reader
                .read_f32::<LittleEndian>()
                .map_err(|e| FluxmeterError::Format(format!("{}: short read: {}", path.display(), e)))?;
            samples.push(v);
        }

        let mut rest = [0u8; 1];
        if reader.read(&mut rest).unwrap_or(0) != 0 {
            return Err(FluxmeterError::Format(format!(
                "{}: trailing bytes after grid body",
                path.display()
            )));
        }

        let zmin = samples.iter().cloned().fold(f32::INFINITY, f32::min) as f64;
        let zmax = samples.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;

        Ok(GridElevationMap {
            nx,
            ny,
            xmin,
            xmax,
            ymin,
            ymax,
            zmin,
            zmax,
            samples,
        })
    }

    fn cell(&self, x: f64, y: f64) -> Option<(usize, usize, f64, f64)> {
        if x < self.xmin || x > self.xmax || y < self.ymin || y > self.ymax {
            return None;
        }
        let fx = if self.nx > 1 {
            (x - self.xmin) / (self.xmax - self.xmin) * (self.nx - 1) as f64
        } else {
            0.0
        };
        let fy = if self.ny > 1 {
            (y - self.ymin) / (self.ymax - self.ymin) * (self.ny - 1) as f64
        } else {
            0.0
        };
        let ix = (fx.floor() as usize).min(self.nx.saturating_sub(2).max(0));
        let iy = (fy.floor() as usize).min(self.ny.saturating_sub(2).max(0));
        Some((ix, iy, fx - ix as f64, fy - iy as f64))
    }

    fn sample(&self, ix: usize, iy: usize) -> f64 {
        self.samples[iy * self.nx + ix] as f64
    }
}

impl ElevationMap for GridElevationMap {
    fn domain(&self) -> (f64, f64, f64, f64) {
        (self.xmin, self.xmax, self.ymin, self.ymax)
    }

    fn grid_counts(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    fn height_bounds(&self) -> (f64, f64) {
        (self.zmin, self.zmax)
    }

    fn height(&self, x: f64, y: f64) -> Option<f64> {
        let (ix, iy, tx, ty) = self.cell(x, y)?;
        let ix1 = (ix + 1).min(self.nx - 1);
        let iy1 = (iy + 1).min(self.ny - 1);
        let z00 = self.sample(ix, iy);
        let z10 = self.sample(ix1, iy);
        let z01 = self.sample(ix, iy1);
        let z11 = self.sample(ix1, iy1);
        let z0 = z00 * (1.0 - tx) + z10 * tx;
        let z1 = z01 * (1.0 - tx) + z11 * tx;
        Some(z0 * (1.0 - ty) + z1 * ty)
    }

    fn gradient(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (ix, iy, _, _) = self.cell(x, y)?;
        let ix1 = (ix + 1).min(self.nx - 1);
        let iy1 = (iy + 1).min(self.ny - 1);
        let dx = if self.nx > 1 {
            (self.xmax - self.xmin) / (self.nx - 1) as f64
        } else {
            1.0
        };
        let dy = if self.ny > 1 {
            (self.ymax - self.ymin) / (self.ny - 1) as f64
        } else {
            1.0
        };
        let dzdx = if ix1 != ix {
            (self.sample(ix1, iy) - self.sample(ix, iy)) / dx
        } else {
            0.0
        };
        let dzdy = if iy1 != iy {
            (self.sample(ix, iy1) - self.sample(ix, iy)) / dy
        } else {
            0.0
        };
        Some((dzdx, dzdy))
    }

    fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        (y, x)
    }

    fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        (lon, lat)
    }
}
