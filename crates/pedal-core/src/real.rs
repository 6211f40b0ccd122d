use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::fixed::Fixed;
use crate::precision::Precision;

/// Scalar arithmetic shared by `f64` and [`Fixed`].
///
/// The elliptic kernels and the closed-form trajectory are written once
/// against this trait: `f64` drives the finite-horizon optimizer, `Fixed`
/// drives everything that must be certified to many digits. Constants are
/// produced from an existing value so they inherit its precision.
pub trait Real:
    Clone
    + Debug
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn precision(&self) -> Precision;

    /// The integer `n` at this value's precision.
    fn integer(&self, n: i64) -> Self;

    /// `self · 2^k`.
    fn scale2(&self, k: i32) -> Self;

    fn pi(&self) -> Self;
    fn sqrt(&self) -> Self;
    fn sin(&self) -> Self;
    fn cos(&self) -> Self;
    fn asin(&self) -> Self;
    fn abs(&self) -> Self;

    /// Convergence tolerance at this precision.
    fn epsilon(&self) -> Self;

    fn to_f64(&self) -> f64;
    fn is_finite(&self) -> bool;

    fn zero(&self) -> Self {
        self.integer(0)
    }

    fn one(&self) -> Self {
        self.integer(1)
    }
}

impl Real for f64 {
    fn precision(&self) -> Precision {
        Precision::DOUBLE
    }

    fn integer(&self, n: i64) -> Self {
        n as f64
    }

    fn scale2(&self, k: i32) -> Self {
        self * 2f64.powi(k)
    }

    fn pi(&self) -> Self {
        std::f64::consts::PI
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(self.max(0.0))
    }

    fn sin(&self) -> Self {
        f64::sin(*self)
    }

    fn cos(&self) -> Self {
        f64::cos(*self)
    }

    fn asin(&self) -> Self {
        f64::asin(self.clamp(-1.0, 1.0))
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn epsilon(&self) -> Self {
        f64::EPSILON
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }
}

impl Real for Fixed {
    fn precision(&self) -> Precision {
        Fixed::precision(self)
    }

    fn integer(&self, n: i64) -> Self {
        Fixed::from_int(n, Fixed::precision(self))
    }

    fn scale2(&self, k: i32) -> Self {
        Fixed::scale2(self, k)
    }

    fn pi(&self) -> Self {
        Fixed::pi(Fixed::precision(self))
    }

    fn sqrt(&self) -> Self {
        Fixed::sqrt(self)
    }

    fn sin(&self) -> Self {
        Fixed::sin(self)
    }

    fn cos(&self) -> Self {
        Fixed::cos(self)
    }

    fn asin(&self) -> Self {
        Fixed::asin(self)
    }

    fn abs(&self) -> Self {
        Fixed::abs(self)
    }

    fn epsilon(&self) -> Self {
        Fixed::epsilon(Fixed::precision(self))
    }

    fn to_f64(&self) -> f64 {
        Fixed::to_f64(self)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_turn<R: Real>(x: &R) -> R {
        x.pi().scale2(-1).sin()
    }

    #[test]
    fn test_generic_over_both_backends() {
        assert!((half_turn(&0.0f64) - 1.0).abs() < 1e-15);

        let p = Precision::new(40);
        let one = half_turn(&Fixed::zero(p));
        assert!((&one - &Fixed::from_int(1, p)).abs() < Fixed::epsilon(p));
    }

    #[test]
    fn test_f64_asin_clamps() {
        assert_eq!(Real::asin(&1.0000001f64), std::f64::consts::FRAC_PI_2);
        assert!(Real::sqrt(&-1e-18f64) == 0.0);
    }

    #[test]
    fn test_constants_inherit_precision() {
        let p = Precision::new(25);
        let x = Fixed::from_int(3, p);
        assert_eq!(Real::precision(&x.one()), p);
        assert_eq!(Real::precision(&1.5f64), Precision::DOUBLE);
    }
}
