//! Angular kinematics: pseudorapidity, azimuth and the distances between them

use crate::numeric::{
    floats::consts::{PI, TAU},
    functions::*,
    Float,
};
use nalgebra::Vector3;

/// Position or direction in the detector frame (cm for positions)
pub type Position = Vector3<Float>;

/// Convenience const for accessing the X coordinate of a 3-vector
pub const X: usize = 0;

/// Convenience const for accessing the Y coordinate of a 3-vector
pub const Y: usize = 1;

/// Convenience const for accessing the Z coordinate of a 3-vector
pub const Z: usize = 2;

/// Anything which points somewhere in (eta, phi) space
///
/// This is what deltaR-style matching operates on, so tracks, jets, generator
/// particles and calorimeter cell positions all implement it.
///
pub trait Direction {
    /// Pseudorapidity
    fn eta(&self) -> Float;

    /// Azimuthal angle in (-𝜋, 𝜋]
    fn phi(&self) -> Float;
}

impl Direction for Position {
    fn eta(&self) -> Float {
        let rho = self[X].hypot(self[Y]);
        if rho > 0. {
            (self[Z] / rho).asinh()
        } else if self[Z] == 0. {
            0.
        } else {
            // Infinitely forward, use a large but finite value like ROOT does
            self[Z].signum() * 1e10
        }
    }

    fn phi(&self) -> Float {
        if self[X] == 0. && self[Y] == 0. {
            0.
        } else {
            self[Y].atan2(self[X])
        }
    }
}

/// Plain (eta, phi) pair
impl Direction for (Float, Float) {
    fn eta(&self) -> Float {
        self.0
    }

    fn phi(&self) -> Float {
        self.1
    }
}

/// Polar angle of a position vector, in [0, 𝜋]
pub fn theta(p: &Position) -> Float {
    let rho = p[X].hypot(p[Y]);
    if rho == 0. && p[Z] == 0. {
        0.
    } else {
        rho.atan2(p[Z])
    }
}

/// Difference between two azimuthal angles, wrapped to (-𝜋, 𝜋]
pub fn delta_phi(phi1: Float, phi2: Float) -> Float {
    let mut result = (phi1 - phi2) % TAU;
    if result > PI {
        result -= TAU;
    } else if result <= -PI {
        result += TAU;
    }
    result
}

/// Angular distance between two directions
pub fn delta_r(a: &impl Direction, b: &impl Direction) -> Float {
    sqrt(delta_r2(a, b))
}

/// Squared angular distance, for comparisons which can skip the square root
pub fn delta_r2(a: &impl Direction, b: &impl Direction) -> Float {
    sqr(a.eta() - b.eta()) + sqr(delta_phi(a.phi(), b.phi()))
}

/// Build a position vector from cylindrical coordinates (rho, eta, phi)
pub fn from_rho_eta_phi(rho: Float, eta: Float, phi: Float) -> Position {
    Position::new(rho * phi.cos(), rho * phi.sin(), rho * eta.sinh())
}

/// Build a position vector on a plane of constant z from (z, eta, phi)
pub fn from_z_eta_phi(z: Float, eta: Float, phi: Float) -> Position {
    let rho = z / eta.sinh();
    Position::new(rho * phi.cos(), rho * phi.sin(), z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::TOLERANCE;

    #[test]
    fn delta_phi_wraps_around() {
        let dphi = delta_phi(PI - 0.1, -PI + 0.1);
        assert!((dphi + 0.2).abs() < TOLERANCE);
        assert!((delta_phi(0.3, 0.1) - 0.2).abs() < TOLERANCE);
        assert!((delta_phi(PI, -PI)).abs() < TOLERANCE);
    }

    #[test]
    fn position_angles() {
        let p = from_rho_eta_phi(129., 1.2, -2.5);
        assert!((p.eta() - 1.2).abs() < TOLERANCE);
        assert!((p.phi() + 2.5).abs() < TOLERANCE);
        let t = theta(&p);
        assert!((-(t / 2.).tan().ln() - 1.2).abs() < TOLERANCE);

        let q = from_z_eta_phi(-317., -2.0, 0.7);
        assert!((q.eta() + 2.0).abs() < TOLERANCE);
        assert!((q.phi() - 0.7).abs() < TOLERANCE);
    }

    #[test]
    fn delta_r_is_symmetric() {
        let a = (0.5, 3.0);
        let b = (-0.1, -3.1);
        assert_eq!(delta_r(&a, &b), delta_r(&b, &a));
        let expected = (0.36 as Float + sqr(TAU - 6.1)).sqrt();
        assert!((delta_r(&a, &b) - expected).abs() < TOLERANCE);
    }
}
