//! Four-shell analytic US-standard atmosphere, a CORSIKA-style exponential
//! density model.

use crate::constants::{ATM_SHELL_ALTITUDES_M, ATM_SHELL_B, ATM_SHELL_C, MIN_SIN_ELEVATION};

/// Density (kg/m^3) at altitude `h` (meters), per the CORSIKA four-shell
/// exponential parameterisation.
pub fn density_kg_m3(h_m: f64) -> f64 {
    let shell = shell_index(h_m);
    let lambda_m = ATM_SHELL_C[shell] * 1.0e-2;
    10.0 * ATM_SHELL_B[shell] / lambda_m * (-h_m / lambda_m).exp()
}

/// Returns the index of the first shell whose boundary altitude exceeds
/// `h`, or the last shell if `h` is above all boundaries (density is then
/// pinned at the top shell's own formula).
fn shell_index(h_m: f64) -> usize {
    for (i, &boundary) in ATM_SHELL_ALTITUDES_M.iter().enumerate() {
        if h_m < boundary {
            return i;
        }
    }
    ATM_SHELL_ALTITUDES_M.len() - 1
}

/// Recommended step length (meters) at altitude `h` and local elevation
/// angle `elevation_deg`: lambda / |sin(elevation)|, floored at lambda / 0.1
/// so grazing rays don't produce an unbounded step.
pub fn recommended_step_m(h_m: f64, elevation_deg: f64) -> f64 {
    let shell = shell_index(h_m);
    let lambda_m = ATM_SHELL_C[shell] * 1.0e-2;
    let sin_e = elevation_deg.to_radians().sin().abs().max(MIN_SIN_ELEVATION);
    lambda_m / sin_e
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn density_decreases_with_altitude_within_a_shell() {
        assert!(density_kg_m3(0.0) > density_kg_m3(3000.0));
        assert!(density_kg_m3(5000.0) > density_kg_m3(9000.0));
    }

    #[test]
    fn density_is_continuous_at_sea_level() {
        let rho0 = density_kg_m3(0.0);
        let lambda0 = ATM_SHELL_C[0] * 1.0e-2;
        let expected = 10.0 * ATM_SHELL_B[0] / lambda0;
        assert_relative_eq!(rho0, expected, max_relative = 1.0e-12);
    }

    #[test]
    fn density_above_top_shell_uses_top_shell_formula() {
        let h = 2.0e5;
        let lambda3 = ATM_SHELL_C[3] * 1.0e-2;
        let expected = 10.0 * ATM_SHELL_B[3] / lambda3 * (-h / lambda3).exp();
        assert_relative_eq!(density_kg_m3(h), expected, max_relative = 1.0e-12);
    }

    #[test]
    fn recommended_step_is_floored_at_grazing_incidence() {
        let shallow = recommended_step_m(1000.0, 0.01);
        let floor = recommended_step_m(1000.0, 5.739); // asin(0.1) in degrees
        assert!(shallow <= floor * 1.0 + 1.0e-6);
    }

    #[test]
    fn recommended_step_shrinks_towards_zenith() {
        let grazing = recommended_step_m(1000.0, 5.0);
        let zenith = recommended_step_m(1000.0, 90.0);
        assert!(zenith < grazing);
    }
}
