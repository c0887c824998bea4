//! Tabulated reference flux: a tri-linear interpolation over a packed
//! (energy, cos-elevation, altitude) table.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::errors::FluxmeterError;

/// A table-backed reference flux. Energy is log-spaced, cos-elevation and
/// altitude are linearly spaced (altitude may collapse to a single slab,
/// `n_h == 1`).
#[derive(Debug, Clone)]
pub struct TabulatedReference {
    n_k: usize,
    n_c: usize,
    n_h: usize,
    k_min: f64,
    k_max: f64,
    c_min: f64,
    c_max: f64,
    h_min: f64,
    h_max: f64,
    data: Vec<f32>,
}

impl TabulatedReference {
    /// Loads a table from a little-endian binary format: header of three
    /// i64 shape values then six f64 grid bounds, body of
    /// `2 * n_k * n_c * n_h` f32 values with energy as the fastest axis,
    /// then cos-elevation, then altitude; within each cell, element 0 is
    /// the muon flux and element 1 is the anti-muon flux.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FluxmeterError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);

        let n_k = read_i64(&mut reader, path)?;
        let n_c = read_i64(&mut reader, path)?;
        let n_h = read_i64(&mut reader, path)?;
        if n_k <= 0 || n_c <= 0 || n_h <= 0 {
            return Err(FluxmeterError::Format(format!(
                "{}: non-positive table shape ({}, {}, {})",
                path.display(),
                n_k,
                n_c,
                n_h
            )));
        }
        let (n_k, n_c, n_h) = (n_k as usize, n_c as usize, n_h as usize);

        let k_min = read_f64(&mut reader, path)?;
        let k_max = read_f64(&mut reader, path)?;
        let c_min = read_f64(&mut reader, path)?;
        let c_max = read_f64(&mut reader, path)?;
        let h_min = read_f64(&mut reader, path)?;
        let h_max = read_f64(&mut reader, path)?;

        let count = n_k
            .checked_mul(n_c)
            .and_then(|v| v.checked_mul(n_h))
            .and_then(|v| v.checked_mul(2))
            .ok_or_else(|| FluxmeterError::Resource(format!("{}: table too large", path.display())))?;

        let mut data = Vec::with_capacity(count);
        for _ in 0..count {
            let v = reader
                .read_f32::<LittleEndian>()
                .map_err(|e| FluxmeterError::Format(format!("{}: short read: {}", path.display(), e)))?;
            data.push(v);
        }

        let mut rest = [0u8; 1];
        if reader.read(&mut rest).unwrap_or(0) != 0 {
            return Err(FluxmeterError::Format(format!(
                "{}: trailing bytes after table body",
                path.display()
            )));
        }

        Ok(TabulatedReference {
            n_k,
            n_c,
            n_h,
            k_min,
            k_max,
            c_min,
            c_max,
            h_min,
            h_max,
            data,
        })
    }

    pub fn energy_min(&self) -> f64 {
        self.k_min
    }

    pub fn energy_max(&self) -> f64 {
        self.k_max
    }

    pub fn height_min(&self) -> f64 {
        self.h_min
    }

    pub fn height_max(&self) -> f64 {
        self.h_max
    }

    fn cell(&self, ik: usize, ic: usize, ih: usize, channel: usize) -> f64 {
        let idx = ((ih * self.n_c + ic) * self.n_k + ik) * 2 + channel;
        self.data[idx] as f64
    }

    /// (value, asymmetry) at the given altitude (m), elevation (deg) and
    /// kinetic energy (GeV).
    pub fn flux(&self, height_m: f64, elevation_deg: f64, kinetic_energy_gev: f64) -> (f64, f64) {
        let c = ((90.0 - elevation_deg) * std::f64::consts::PI / 180.0).cos();

        let (ik0, ik1, tk) = locate(self.k_min, self.k_max, self.n_k, kinetic_energy_gev, log_mode(self.k_min, self.k_max));
        let (ic0, ic1, tc) = locate(self.c_min, self.c_max, self.n_c, c, false);
        let (ih0, ih1, th) = if self.n_h > 1 {
            locate(self.h_min, self.h_max, self.n_h, height_m, log_mode(self.h_min, self.h_max))
        } else {
            (0, 0, 0.0)
        };

        let mut channels = [0.0f64; 2];
        for (channel, slot) in channels.iter_mut().enumerate() {
            let v000 = self.cell(ik0, ic0, ih0, channel);
            let v100 = self.cell(ik1, ic0, ih0, channel);
            let v010 = self.cell(ik0, ic1, ih0, channel);
            let v110 = self.cell(ik1, ic1, ih0, channel);
            let v00 = v000 * (1.0 - tk) + v100 * tk;
            let v10 = v010 * (1.0 - tk) + v110 * tk;
            let lower = v00 * (1.0 - tc) + v10 * tc;

            *slot = if self.n_h > 1 {
                let v001 = self.cell(ik0, ic0, ih1, channel);
                let v101 = self.cell(ik1, ic0, ih1, channel);
                let v011 = self.cell(ik0, ic1, ih1, channel);
                let v111 = self.cell(ik1, ic1, ih1, channel);
                let v01 = v001 * (1.0 - tk) + v101 * tk;
                let v11 = v011 * (1.0 - tk) + v111 * tk;
                let upper = v01 * (1.0 - tc) + v11 * tc;
                lower * (1.0 - th) + upper * th
            } else {
                lower
            };
        }

        let sum = channels[0] + channels[1];
        if sum <= 0.0 {
            (sum.max(0.0), 0.0)
        } else {
            (sum, (channels[0] - channels[1]) / sum)
        }
    }
}

fn read_i64<R: Read>(reader: &mut R, path: &Path) -> Result<i64, FluxmeterError> {
    reader
        .read_i64::<LittleEndian>()
        .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))
}

fn read_f64<R: Read>(reader: &mut R, path: &Path) -> Result<f64, FluxmeterError> {
    reader
        .read_f64::<LittleEndian>()
        .map_err(|e| FluxmeterError::Io(format!("{}: {}", path.display(), e)))
}

fn log_mode(min: f64, max: f64) -> bool {
    min > 0.0 && max > 0.0
}

/// Fractional bracketing along a uniformly (log- or linearly-) spaced axis
/// of `n` points spanning [min, max], clamped to the grid's extent.
/// Returns (index0, index1, fraction).
fn locate(min: f64, max: f64, n: usize, value: f64, log_mode: bool) -> (usize, usize, f64) {
    if n <= 1 || max <= min {
        return (0, 0, 0.0);
    }

    let fi = if log_mode && value > 0.0 {
        (value.ln() - min.ln()) / (max.ln() - min.ln()) * (n - 1) as f64
    } else {
        (value - min) / (max - min) * (n - 1) as f64
    };
    let fi = fi.max(0.0).min((n - 1) as f64);

    let i0 = (fi.floor() as usize).min(n - 2);
    let t = fi - i0 as f64;
    (i0, i0 + 1, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    /// A 2x2x1 table: energy in {1, 100} GeV, cos in {0, 1}, single altitude
    /// slab. Muon channel is k*10+c*1, anti-muon is half that, for easy
    /// hand-checking of interpolation weights.
    fn write_test_table(path: &Path) {
        let mut buf = Vec::new();
        buf.write_i64::<LittleEndian>(2).unwrap();
        buf.write_i64::<LittleEndian>(2).unwrap();
        buf.write_i64::<LittleEndian>(1).unwrap();
        buf.write_f64::<LittleEndian>(1.0).unwrap();
        buf.write_f64::<LittleEndian>(100.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f64::<LittleEndian>(1.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();

        // energy fastest, then cos: (k=0,c=0), (k=1,c=0), (k=0,c=1), (k=1,c=1)
        let cells: [(f32, f32); 4] = [(0.0, 0.0), (10.0, 5.0), (1.0, 0.5), (11.0, 5.5)];
        for (mu, amu) in &cells {
            buf.write_f32::<LittleEndian>(*mu).unwrap();
            buf.write_f32::<LittleEndian>(*amu).unwrap();
        }

        let mut f = File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn grid_vertex_is_exact() {
        let path = std::env::temp_dir().join("fluxmeter_test_table.bin");
        write_test_table(&path);
        let table = TabulatedReference::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        // c_max = 1.0 -> elevation 90 deg (c = cos(0) = 1); k_min = 1.0 GeV.
        let (value, asymmetry) = table.flux(0.0, 90.0, 1.0);
        assert_relative_eq!(value, 1.0 + 0.5, max_relative = 1.0e-9);
        assert_relative_eq!(asymmetry, (1.0 - 0.5) / 1.5, max_relative = 1.0e-9);
    }

    #[test]
    fn support_matches_header() {
        let path = std::env::temp_dir().join("fluxmeter_test_table2.bin");
        write_test_table(&path);
        let table = TabulatedReference::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.energy_min(), 1.0);
        assert_eq!(table.energy_max(), 100.0);
        assert_eq!(table.height_min(), 0.0);
        assert_eq!(table.height_max(), 0.0);
    }

    #[test]
    fn zero_sum_gives_zero_asymmetry() {
        let path = std::env::temp_dir().join("fluxmeter_test_table3.bin");
        let mut buf = Vec::new();
        buf.write_i64::<LittleEndian>(1).unwrap();
        buf.write_i64::<LittleEndian>(1).unwrap();
        buf.write_i64::<LittleEndian>(1).unwrap();
        buf.write_f64::<LittleEndian>(1.0).unwrap();
        buf.write_f64::<LittleEndian>(1.0).unwrap();
        buf.write_f64::<LittleEndian>(1.0).unwrap();
        buf.write_f64::<LittleEndian>(1.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f64::<LittleEndian>(0.0).unwrap();
        buf.write_f32::<LittleEndian>(0.0).unwrap();
        buf.write_f32::<LittleEndian>(0.0).unwrap();
        std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();

        let table = TabulatedReference::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let (value, asymmetry) = table.flux(0.0, 90.0, 1.0);
        assert_eq!(value, 0.0);
        assert_eq!(asymmetry, 0.0);
    }
}
