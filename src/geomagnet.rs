//! The geomagnetic field collaborator: coefficient parsing and evaluation
//! are delegated to a host-supplied model, and the fluxmeter keeps only an
//! optional snapshot plus a transient cache of the last query.
//!
//! Spherical-harmonic coefficient parsing and evaluation live outside this
//! crate; [`Geomagnet`] is the seam a host plugs a real model (e.g. IGRF)
//! into. The fluxmeter caches the last (position, field) pair so repeated
//! queries at the same ECEF point within a call don't re-evaluate the model.

use crate::geo::Ecef;

/// A queryable geomagnetic field model, evaluated at an ECEF position and
/// epoch.
pub trait Geomagnet: std::fmt::Debug {
    /// The field vector (Tesla) in ECEF at `position`, for an implementation
    /// that evaluates a fixed epoch (or otherwise ignores time).
    fn field_at(&self, position: &Ecef) -> Ecef;
}

/// The fluxmeter's transient cache of the last geomagnetic query, avoiding
/// repeat evaluation of an expensive spherical-harmonic sum when the
/// transport driver polls the same point multiple times in a row.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeomagnetCache {
    last_position: Option<Ecef>,
    last_field: Ecef,
}

impl GeomagnetCache {
    pub fn new() -> Self {
        GeomagnetCache {
            last_position: None,
            last_field: Ecef::new(0.0, 0.0, 0.0),
        }
    }

    /// Returns the field at `position`, using the cached value when
    /// `position` is unchanged from the last query (bit-for-bit, as the
    /// driver re-queries the same point across sub-steps).
    pub fn field_at(&mut self, geomagnet: &dyn Geomagnet, position: &Ecef) -> Ecef {
        if let Some(last) = self.last_position {
            if last == *position {
                return self.last_field;
            }
        }
        let field = geomagnet.field_at(position);
        self.last_position = Some(*position);
        self.last_field = field;
        field
    }

    pub fn invalidate(&mut self) {
        self.last_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct CountingGeomagnet {
        calls: Cell<usize>,
    }
    impl Geomagnet for CountingGeomagnet {
        fn field_at(&self, _position: &Ecef) -> Ecef {
            self.calls.set(self.calls.get() + 1);
            Ecef::new(0.0, 0.0, 5.0e-5)
        }
    }

    #[test]
    fn cache_avoids_repeat_evaluation_at_same_point() {
        let geomagnet = CountingGeomagnet { calls: Cell::new(0) };
        let mut cache = GeomagnetCache::new();
        let position = Ecef::new(1.0, 2.0, 3.0);

        cache.field_at(&geomagnet, &position);
        cache.field_at(&geomagnet, &position);
        assert_eq!(geomagnet.calls.get(), 1);

        cache.field_at(&geomagnet, &Ecef::new(4.0, 5.0, 6.0));
        assert_eq!(geomagnet.calls.get(), 2);
    }

    #[test]
    fn invalidate_forces_re_evaluation() {
        let geomagnet = CountingGeomagnet { calls: Cell::new(0) };
        let mut cache = GeomagnetCache::new();
        let position = Ecef::new(1.0, 2.0, 3.0);

        cache.field_at(&geomagnet, &position);
        cache.invalidate();
        cache.field_at(&geomagnet, &position);
        assert_eq!(geomagnet.calls.get(), 2);
    }
}
