//! Stratified geometry: an ordered sequence of [`layer::Layer`]s plus the
//! two step-locator engines in [`stepper`].

pub mod atmosphere;
pub mod elevation;
pub mod layer;
pub mod stepper;

use crate::constants::ZMIN;
use layer::Layer;

/// An ordered sequence of layers, index 0 the bottommost stratum. The
/// sequence itself is structurally immutable once bound to a fluxmeter;
/// individual layers' densities remain editable.
#[derive(Debug)]
pub struct Geometry {
    layers: Vec<Layer>,
}

impl Geometry {
    pub fn new(layers: Vec<Layer>) -> Self {
        Geometry { layers }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// max over user layers of that layer's zmax. ZMIN when there are no
    /// layers, which latches ztop = zref_min in
    /// [`stepper::compute_anchors`].
    pub fn zmax(&self) -> f64 {
        self.layers
            .iter()
            .map(|l| l.z_bounds().1)
            .fold(ZMIN, f64::max)
    }
}
