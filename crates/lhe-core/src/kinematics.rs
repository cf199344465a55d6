//! Four-momentum value type.
//!
//! Conventions follow the usual collider ones: `z` is the beam axis,
//! `phi` is measured in the transverse plane and lies in `(-pi, pi]`.
//! Degenerate directions (zero transverse momentum, zero momentum) return
//! finite sentinels instead of NaN so that selection code never sees NaN
//! from a well-formed particle.

use std::ops::{Add, Neg, Sub};

/// Pseudorapidity reported for particles travelling exactly along the beam.
pub const BEAM_AXIS_ETA: f64 = 1e11;

/// A Lorentz four-vector `(px, py, pz, E)` in GeV.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FourVector {
    /// Momentum along x.
    pub px: f64,
    /// Momentum along y.
    pub py: f64,
    /// Momentum along the beam axis.
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl FourVector {
    /// Construct from Cartesian components.
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// `true` if all four components are finite.
    pub fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }

    /// Squared transverse momentum.
    pub fn pt2(&self) -> f64 {
        self.px * self.px + self.py * self.py
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.pt2().sqrt()
    }

    /// Squared magnitude of the three-momentum.
    pub fn p2(&self) -> f64 {
        self.pt2() + self.pz * self.pz
    }

    /// Magnitude of the three-momentum.
    pub fn p(&self) -> f64 {
        self.p2().sqrt()
    }

    /// Invariant mass squared, `E^2 - |p|^2`, without clamping.
    pub fn m2(&self) -> f64 {
        self.e * self.e - self.p2()
    }

    /// Invariant mass.
    ///
    /// Small negative `m2` values from floating-point cancellation (massless
    /// particles, nearly collinear pairs) are clamped to zero.
    pub fn mass(&self) -> f64 {
        self.m2().max(0.0).sqrt()
    }

    /// Squared transverse mass `E^2 - pz^2`, without clamping.
    pub fn mt2(&self) -> f64 {
        self.e * self.e - self.pz * self.pz
    }

    /// Transverse mass `sqrt(E^2 - pz^2)`, clamped at zero like [`Self::mass`].
    pub fn mt(&self) -> f64 {
        self.mt2().max(0.0).sqrt()
    }

    /// Spatial part.
    pub fn vect(&self) -> ThreeVector {
        ThreeVector::new(self.px, self.py, self.pz)
    }

    /// Transverse energy `E * pt / |p|`.
    pub fn et(&self) -> f64 {
        let p = self.p();
        if p == 0.0 { 0.0 } else { self.e * self.pt() / p }
    }

    /// Azimuthal angle in `(-pi, pi]`; zero for vanishing transverse momentum.
    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 { 0.0 } else { self.py.atan2(self.px) }
    }

    /// Polar angle with respect to the beam axis.
    pub fn theta(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 && self.pz == 0.0 {
            0.0
        } else {
            self.pt().atan2(self.pz)
        }
    }

    /// Cosine of the polar angle; 1 for a null three-momentum.
    pub fn cos_theta(&self) -> f64 {
        let p = self.p();
        if p == 0.0 { 1.0 } else { self.pz / p }
    }

    /// Pseudorapidity.
    ///
    /// Returns `±BEAM_AXIS_ETA` for particles along the beam and 0 for a null
    /// three-momentum.
    pub fn eta(&self) -> f64 {
        let c = self.cos_theta();
        if c * c < 1.0 {
            return -0.5 * ((1.0 - c) / (1.0 + c)).ln();
        }
        if self.pz == 0.0 {
            0.0
        } else if self.pz > 0.0 {
            BEAM_AXIS_ETA
        } else {
            -BEAM_AXIS_ETA
        }
    }

    /// Rapidity `0.5 * ln((E + pz) / (E - pz))`.
    pub fn rapidity(&self) -> f64 {
        0.5 * ((self.e + self.pz) / (self.e - self.pz)).ln()
    }

    /// Velocity `|p| / E`.
    pub fn beta(&self) -> f64 {
        self.p() / self.e
    }

    /// Lorentz factor `1 / sqrt(1 - beta^2)`.
    pub fn gamma(&self) -> f64 {
        let b = self.beta();
        1.0 / (1.0 - b * b).sqrt()
    }

    /// Minkowski product with metric `(+, -, -, -)`.
    pub fn dot(&self, other: &FourVector) -> f64 {
        self.e * other.e - self.px * other.px - self.py * other.py - self.pz * other.pz
    }

    /// Azimuthal separation wrapped into `[-pi, pi)`.
    pub fn delta_phi(&self, other: &FourVector) -> f64 {
        wrap_phi(self.phi() - other.phi())
    }

    /// Separation in the (eta, phi) plane.
    pub fn delta_r(&self, other: &FourVector) -> f64 {
        let deta = self.eta() - other.eta();
        let dphi = self.delta_phi(other);
        (deta * deta + dphi * dphi).sqrt()
    }

    /// Opening angle between the two three-momenta; zero if either is null.
    pub fn angle(&self, other: &FourVector) -> f64 {
        let norm = (self.p2() * other.p2()).sqrt();
        if norm <= 0.0 {
            return 0.0;
        }
        let cos = (self.px * other.px + self.py * other.py + self.pz * other.pz) / norm;
        cos.clamp(-1.0, 1.0).acos()
    }
}

/// A spatial three-vector, as returned by [`FourVector::vect`].
///
/// Angular quantities share the [`FourVector`] conventions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThreeVector {
    /// x component.
    pub x: f64,
    /// y component.
    pub y: f64,
    /// z (beam axis) component.
    pub z: f64,
}

impl ThreeVector {
    /// Construct from Cartesian components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    // Zero energy; only the momentum-based accessors are meaningful.
    fn spatial(&self) -> FourVector {
        FourVector::new(self.x, self.y, self.z, 0.0)
    }

    /// Squared magnitude.
    pub fn mag2(&self) -> f64 {
        self.spatial().p2()
    }

    /// Magnitude.
    pub fn mag(&self) -> f64 {
        self.spatial().p()
    }

    /// Squared transverse component.
    pub fn perp2(&self) -> f64 {
        self.spatial().pt2()
    }

    /// Transverse component.
    pub fn perp(&self) -> f64 {
        self.spatial().pt()
    }

    /// Azimuthal angle.
    pub fn phi(&self) -> f64 {
        self.spatial().phi()
    }

    /// Polar angle.
    pub fn theta(&self) -> f64 {
        self.spatial().theta()
    }

    /// Cosine of the polar angle.
    pub fn cos_theta(&self) -> f64 {
        self.spatial().cos_theta()
    }

    /// Pseudorapidity.
    pub fn eta(&self) -> f64 {
        self.spatial().eta()
    }

    /// Euclidean dot product.
    pub fn dot(&self, other: &ThreeVector) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Opening angle; zero if either vector is null.
    pub fn angle(&self, other: &ThreeVector) -> f64 {
        self.spatial().angle(&other.spatial())
    }

    /// Azimuthal separation wrapped into `[-pi, pi)`.
    pub fn delta_phi(&self, other: &ThreeVector) -> f64 {
        self.spatial().delta_phi(&other.spatial())
    }

    /// Separation in the (eta, phi) plane.
    pub fn delta_r(&self, other: &ThreeVector) -> f64 {
        self.spatial().delta_r(&other.spatial())
    }
}

impl Add for ThreeVector {
    type Output = ThreeVector;

    fn add(self, rhs: ThreeVector) -> ThreeVector {
        ThreeVector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for ThreeVector {
    type Output = ThreeVector;

    fn sub(self, rhs: ThreeVector) -> ThreeVector {
        ThreeVector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for ThreeVector {
    type Output = ThreeVector;

    fn neg(self) -> ThreeVector {
        ThreeVector::new(-self.x, -self.y, -self.z)
    }
}

fn wrap_phi(mut dphi: f64) -> f64 {
    use std::f64::consts::PI;
    if !dphi.is_finite() {
        return dphi;
    }
    while dphi >= PI {
        dphi -= 2.0 * PI;
    }
    while dphi < -PI {
        dphi += 2.0 * PI;
    }
    dphi
}

impl Add for FourVector {
    type Output = FourVector;

    fn add(self, rhs: FourVector) -> FourVector {
        FourVector::new(self.px + rhs.px, self.py + rhs.py, self.pz + rhs.pz, self.e + rhs.e)
    }
}

impl Sub for FourVector {
    type Output = FourVector;

    fn sub(self, rhs: FourVector) -> FourVector {
        FourVector::new(self.px - rhs.px, self.py - rhs.py, self.pz - rhs.pz, self.e - rhs.e)
    }
}

impl Neg for FourVector {
    type Output = FourVector;

    fn neg(self) -> FourVector {
        FourVector::new(-self.px, -self.py, -self.pz, -self.e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn back_to_back_muons_have_mass_twenty() {
        let a = FourVector::new(10.0, 0.0, 0.0, 10.0);
        let b = FourVector::new(-10.0, 0.0, 0.0, 10.0);
        assert_relative_eq!((a + b).mass(), 20.0, epsilon = 1e-12);
        assert_relative_eq!(a.pt(), 10.0, epsilon = 1e-12);
        assert_eq!(a.mass(), 0.0);
    }

    #[test]
    fn negative_mass_squared_is_clamped() {
        let v = FourVector::new(3.0, 4.0, 0.0, 5.0 - 1e-9);
        assert!(v.m2() < 0.0);
        assert_eq!(v.mass(), 0.0);
    }

    #[test]
    fn eta_and_rapidity_of_massless_particle_agree() {
        let v = FourVector::new(1.0, 2.0, 3.0, (1.0f64 + 4.0 + 9.0).sqrt());
        assert_relative_eq!(v.eta(), v.rapidity(), epsilon = 1e-9);
        assert_relative_eq!(v.eta(), (3.0 / 14f64.sqrt()).atanh(), epsilon = 1e-9);
    }

    #[test]
    fn eta_along_beam_is_sentinel() {
        assert_eq!(FourVector::new(0.0, 0.0, 5.0, 5.0).eta(), BEAM_AXIS_ETA);
        assert_eq!(FourVector::new(0.0, 0.0, -5.0, 5.0).eta(), -BEAM_AXIS_ETA);
        assert_eq!(FourVector::new(0.0, 0.0, 0.0, 1.0).eta(), 0.0);
    }

    #[test]
    fn phi_conventions() {
        assert_eq!(FourVector::new(0.0, 0.0, 1.0, 1.0).phi(), 0.0);
        assert_relative_eq!(FourVector::new(0.0, 1.0, 0.0, 1.0).phi(), PI / 2.0);
        assert_relative_eq!(FourVector::new(-1.0, 0.0, 0.0, 1.0).phi(), PI);
    }

    #[test]
    fn delta_phi_wraps() {
        let a = FourVector::new((3.0f64).cos(), (3.0f64).sin(), 0.0, 1.0);
        let b = FourVector::new((-3.0f64).cos(), (-3.0f64).sin(), 0.0, 1.0);
        assert_relative_eq!(a.delta_phi(&b), 6.0 - 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(a.delta_r(&b), (2.0 * PI - 6.0), epsilon = 1e-9);
    }

    #[test]
    fn dot_is_mass_squared_for_self() {
        let v = FourVector::new(1.0, -2.0, 3.0, 10.0);
        assert_relative_eq!(v.dot(&v), v.m2(), epsilon = 1e-12);
        assert_relative_eq!(v.angle(&v), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn spatial_part() {
        let v = FourVector::new(3.0, 4.0, 12.0, 20.0);
        let p = v.vect();
        assert_eq!(p, ThreeVector::new(3.0, 4.0, 12.0));
        assert_relative_eq!(p.mag(), 13.0);
        assert_relative_eq!(p.perp2(), 25.0);
        assert_relative_eq!(p.eta(), v.eta());
        assert_relative_eq!(v.mt2(), 400.0 - 144.0);
        assert_relative_eq!(p.dot(&p), p.mag2());
    }
}
