//! Cross-module scenario and property tests that exercise a full
//! [`Fluxmeter`] rather than a single collaborator in isolation, covering
//! the scenarios and testable properties that the in-module unit tests
//! don't already reach end to end.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use fluxmeter::geo::{geodetic_to_ecef, Ecef};
use fluxmeter::geometry::elevation::{ElevationMap, GridElevationMap};
use fluxmeter::geometry::layer::Layer;
use fluxmeter::geometry::Geometry;
use fluxmeter::observation::{ObservationState, Pid};
use fluxmeter::physics::simple::StraightLineDriver;
use fluxmeter::physics::TransportDriver;
use fluxmeter::reference::table::TabulatedReference;
use fluxmeter::reference::Reference;
use fluxmeter::{Fluxmeter, Mode};

/// Writes a flat GridElevationMap test fixture and returns its path. The
/// caller is responsible for removing the file.
fn write_flat_grid(name: &str, xmin: f64, xmax: f64, ymin: f64, ymax: f64, height: f32) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    let mut buf = Vec::new();
    buf.write_i64::<LittleEndian>(2).unwrap();
    buf.write_i64::<LittleEndian>(2).unwrap();
    buf.write_f64::<LittleEndian>(xmin).unwrap();
    buf.write_f64::<LittleEndian>(xmax).unwrap();
    buf.write_f64::<LittleEndian>(ymin).unwrap();
    buf.write_f64::<LittleEndian>(ymax).unwrap();
    for _ in 0..4 {
        buf.write_f32::<LittleEndian>(height).unwrap();
    }
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(&buf).unwrap();
    path
}

fn driver() -> Box<dyn TransportDriver> {
    Box::new(StraightLineDriver::new())
}

/// One mapped Rock layer, observer 30 m below ground, CSDA mode. Expects a
/// positive finite value, positive asymmetry and a weight reweighted away
/// from 1 by the rock column's Jacobian.
#[test]
fn mapped_rock_layer_reweights_observer_below_ground() {
    let path = write_flat_grid("fluxmeter_scenario_a.bin", -1.0, 1.0, -1.0, 1.0, 500.0);
    let map = GridElevationMap::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let layer = Layer::new("Rock", Some(Box::new(map)), 0.0, 2650.0).unwrap();
    let geometry = Geometry::new(vec![layer]);
    let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

    let observation = ObservationState::new(Pid::Untagged, 0.0, 0.0, 500.0 - 30.0, 0.0, 90.0, 10.0);
    let result = fluxmeter.flux(&observation);

    assert!(result.value.is_finite() && result.value > 0.0);
    assert!(result.asymmetry > 0.0);
    assert!((result.weight - 1.0).abs() > 1.0e-9);
}

/// A point off the map's domain reports no height sample, so the layer
/// falls back to the ZMIN sentinel.
#[test]
fn altitude_outside_map_domain_falls_back_to_zmin() {
    let path = write_flat_grid("fluxmeter_altitude_zmin.bin", -1.0, 1.0, -1.0, 1.0, 500.0);
    let map = GridElevationMap::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(map.height(10.0, 10.0), None);

    let layer = Layer::new("Rock", Some(Box::new(map)), 0.0, 2650.0).unwrap();
    assert_eq!(layer.height(10.0, 10.0), fluxmeter::constants::ZMIN);
}

/// Property 3: changing the reference's altitude support moves the next
/// call's ztop anchor (observed through `whereami`, since the anchors
/// themselves are private); leaving it unchanged leaves `whereami` answers
/// unchanged too.
#[test]
fn stepper_rebuild_tracks_reference_support_changes() {
    let geometry = Geometry::new(Vec::new());
    let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

    let probe = geodetic_to_ecef(0.0, 0.0, -6_000.0);
    let before = fluxmeter.whereami(probe);

    fluxmeter.set_reference(Reference::Default);
    assert_eq!(fluxmeter.whereami(probe), before, "unchanged support must not move ztop");

    let table = tabulated_reference_with_height_min(-5_000.0);
    fluxmeter.set_reference(Reference::Tabulated(table));
    assert_ne!(
        fluxmeter.whereami(probe),
        before,
        "narrower height_min must rebuild ztop and change which side of it -6000 m falls on"
    );
}

fn tabulated_reference_with_height_min(h_min: f64) -> TabulatedReference {
    let path = std::env::temp_dir().join(format!("fluxmeter_support_{}.bin", h_min as i64));
    let mut buf = Vec::new();
    buf.write_i64::<LittleEndian>(1).unwrap(); // n_k
    buf.write_i64::<LittleEndian>(1).unwrap(); // n_c
    buf.write_i64::<LittleEndian>(1).unwrap(); // n_h
    buf.write_f64::<LittleEndian>(1.0).unwrap(); // k_min
    buf.write_f64::<LittleEndian>(1.0).unwrap(); // k_max
    buf.write_f64::<LittleEndian>(0.0).unwrap(); // c_min
    buf.write_f64::<LittleEndian>(1.0).unwrap(); // c_max
    buf.write_f64::<LittleEndian>(h_min).unwrap(); // h_min
    buf.write_f64::<LittleEndian>(120_000.0).unwrap(); // h_max
    buf.write_f32::<LittleEndian>(1.0).unwrap();
    buf.write_f32::<LittleEndian>(0.5).unwrap();
    std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();
    let table = TabulatedReference::load(&path).unwrap();
    std::fs::remove_file(&path).ok();
    table
}

/// Property 7: grammage decomposes additively across a two-layer column
/// and the per-medium buckets sum to the reported total.
#[test]
fn grammage_decomposes_across_layers_and_sums_to_total() {
    let water = Layer::new("Water", None, 50.0, 1000.0).unwrap();
    let rock = Layer::new("Rock", None, 100.0, 2650.0).unwrap();
    let geometry = Geometry::new(vec![water, rock]);
    let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

    let bottom = geodetic_to_ecef(0.0, 0.0, 0.0);
    let up = Ecef::new(0.0, 0.0, 1.0);
    let result = fluxmeter.grammage(bottom, up);

    let water_expected = 1000.0 * 50.0;
    let rock_expected = 2650.0 * 50.0;
    assert!((result.per_medium_kg_m2[&1] - water_expected).abs() / water_expected < 1.0e-3);
    assert!((result.per_medium_kg_m2[&2] - rock_expected).abs() / rock_expected < 1.0e-3);

    let sum: f64 = result.per_medium_kg_m2.values().sum();
    assert!((sum - result.total_kg_m2).abs() < 1.0e-6);
    assert!((result.total_kg_m2 - (water_expected + rock_expected)).abs() / result.total_kg_m2 < 1.0e-3);
}

/// Property 8: intersect and whereami bracket the same boundary from
/// either side.
#[test]
fn intersect_and_whereami_bracket_the_boundary() {
    let layer = Layer::new("Rock", None, 1_000.0, 2650.0).unwrap();
    let geometry = Geometry::new(vec![layer]);
    let mut fluxmeter = Fluxmeter::new(driver(), geometry, "Air", Mode::Csda, Reference::Default).unwrap();

    let below = geodetic_to_ecef(0.0, 0.0, 0.0);
    let up = Ecef::new(0.0, 0.0, 1.0);
    let (exit_medium, (_, _, crossing_h)) = fluxmeter.intersect(below, up).unwrap();
    assert!((crossing_h - 1_000.0).abs() < 1.0);
    assert_ne!(exit_medium, 1, "crossing must leave the Rock layer's own medium index");

    let just_below = geodetic_to_ecef(0.0, 0.0, 999.0);
    let just_above = geodetic_to_ecef(0.0, 0.0, 1_001.0);
    assert_eq!(fluxmeter.whereami(just_below), 0); // inside layer index 0 (Rock)
    assert_ne!(fluxmeter.whereami(just_above), 0);
}

/// Property 10: extra depth in the same material below the observer costs
/// proper time without changing the transported material column's
/// character, so the surviving flux cannot increase with added depth.
#[test]
fn decay_weight_sanity_extra_depth_does_not_increase_flux() {
    let shallow = Layer::new("StandardRock", None, 10.0, 2650.0).unwrap();
    let deep = Layer::new("StandardRock", None, 10.0 + 1.0, 2650.0).unwrap();

    let mut shallow_fm =
        Fluxmeter::new(driver(), Geometry::new(vec![shallow]), "Air", Mode::Csda, Reference::Default).unwrap();
    let mut deep_fm =
        Fluxmeter::new(driver(), Geometry::new(vec![deep]), "Air", Mode::Csda, Reference::Default).unwrap();

    let obs_shallow = ObservationState::new(Pid::Muon, 0.0, 0.0, -5.0, 0.0, 90.0, 5.0);
    let obs_deep = ObservationState::new(Pid::Muon, 0.0, 0.0, -5.0 - 1.0, 0.0, 90.0, 5.0);

    let shallow_result = shallow_fm.flux(&obs_shallow);
    let deep_result = deep_fm.flux(&obs_deep);

    assert!(shallow_result.value > 0.0 && deep_result.value > 0.0);
    assert!(deep_result.value <= shallow_result.value);
}

/// Exercises the library-level `TabulatedReference` against a known grid
/// vertex, with the table's documented axis order (energy fastest, then
/// cos-elevation, then altitude).
#[test]
fn tabulated_reference_matches_value_at_grid_vertex() {
    let path = std::env::temp_dir().join("fluxmeter_scenario_d.bin");
    let mut buf = Vec::new();
    buf.write_i64::<LittleEndian>(2).unwrap(); // n_k
    buf.write_i64::<LittleEndian>(2).unwrap(); // n_c
    buf.write_i64::<LittleEndian>(1).unwrap(); // n_h
    buf.write_f64::<LittleEndian>(1.0).unwrap(); // k_min
    buf.write_f64::<LittleEndian>(10.0).unwrap(); // k_max
    buf.write_f64::<LittleEndian>(0.0).unwrap(); // c_min
    buf.write_f64::<LittleEndian>(1.0).unwrap(); // c_max
    buf.write_f64::<LittleEndian>(0.0).unwrap(); // h_min
    buf.write_f64::<LittleEndian>(0.0).unwrap(); // h_max
    // energy fastest, then cos: (k=0,c=0), (k=1,c=0), (k=0,c=1), (k=1,c=1)
    let cells: [(f32, f32); 4] = [(1.0, 0.5), (3.0, 1.5), (2.0, 1.0), (4.0, 2.0)];
    for (mu, amu) in &cells {
        buf.write_f32::<LittleEndian>(*mu).unwrap();
        buf.write_f32::<LittleEndian>(*amu).unwrap();
    }
    std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();

    let table = TabulatedReference::load(&path);
    std::fs::remove_file(&path).ok();
    let table = table.unwrap();

    // c_max = 1.0 -> elevation 90 deg; k_min = 1.0 GeV: vertex (k_min, c_max, h_min).
    let (value, asymmetry) = table.flux(0.0, 90.0, 1.0);
    assert!((value - 3.0).abs() < 1.0e-5);
    assert!((asymmetry - (2.0f64 - 1.0) / 3.0).abs() < 1.0e-5);
}
