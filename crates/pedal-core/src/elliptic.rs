use crate::constants::MAX_AGM_STEPS;
use crate::error::{PedalError, Result};
use crate::real::Real;

/// One AGM run from (1, √(1−m)).
/// Holds a_n and c_n for n = 0..=N, with c_0 = √m and c_N below epsilon.
struct AgmDescent<R> {
    a: Vec<R>,
    c: Vec<R>,
}

fn check_parameter<R: Real>(m: &R) -> Result<()> {
    let zero = m.zero();
    let one = m.one();
    if !m.is_finite() || *m < zero || *m >= one {
        return Err(PedalError::Domain(format!(
            "elliptic parameter m = {} outside [0, 1)",
            m.to_f64()
        )));
    }
    if one - m.clone() <= m.epsilon() {
        return Err(PedalError::Divergence(format!(
            "K(m) diverges: m = {} is indistinguishable from 1 at {} digits",
            m.to_f64(),
            m.precision().digits()
        )));
    }
    Ok(())
}

fn agm_descent<R: Real>(m: &R) -> Result<AgmDescent<R>> {
    check_parameter(m)?;
    let eps = m.epsilon();
    let mut a = m.one();
    let mut g = (m.one() - m.clone()).sqrt();
    let mut c = m.sqrt();
    let mut descent = AgmDescent {
        a: vec![a.clone()],
        c: vec![c.clone()],
    };
    while c.abs() > eps {
        if descent.a.len() > MAX_AGM_STEPS {
            return Err(PedalError::ConvergenceFailure(format!(
                "AGM for m = {} did not converge in {MAX_AGM_STEPS} steps",
                m.to_f64()
            )));
        }
        let next_a = (a.clone() + g.clone()).scale2(-1);
        c = (a.clone() - g.clone()).scale2(-1);
        g = (a * g).sqrt();
        a = next_a;
        descent.a.push(a.clone());
        descent.c.push(c.clone());
    }
    Ok(descent)
}

impl<R: Real> AgmDescent<R> {
    fn limit(&self) -> &R {
        &self.a[self.a.len() - 1]
    }

    /// K = π / (2·a_N).
    fn k(&self) -> R {
        let a_n = self.limit();
        a_n.pi() / a_n.scale2(1)
    }
}

/// Complete elliptic integral of the first kind, K(m) = ∫₀^{π/2} dθ/√(1 − m sin²θ).
///
/// Computed by the arithmetic-geometric mean at the precision carried by `m`.
/// Fails with `Domain` for m ∉ [0, 1) and `Divergence` when 1 − m is below the
/// working epsilon.
pub fn elliptic_k<R: Real>(m: &R) -> Result<R> {
    Ok(agm_descent(m)?.k())
}

/// K(m) and E(m) from a single AGM run:
/// `E = K·(1 − Σ_{n≥0} 2^{n−1} c_n²)` with `c_0² = m`.
pub fn complete_integrals<R: Real>(m: &R) -> Result<(R, R)> {
    let descent = agm_descent(m)?;
    let k = descent.k();
    let mut weighted = m.scale2(-1);
    for (n, c) in descent.c.iter().enumerate().skip(1) {
        weighted = weighted + (c.clone() * c.clone()).scale2(n as i32 - 1);
    }
    let e = k.clone() * (m.one() - weighted);
    Ok((k, e))
}

/// Complete elliptic integral of the second kind.
pub fn elliptic_e<R: Real>(m: &R) -> Result<R> {
    Ok(complete_integrals(m)?.1)
}

/// dK/dm = (E − (1−m)·K) / (2m(1−m)), with the limit π/8 at m = 0.
pub fn elliptic_k_derivative<R: Real>(m: &R) -> Result<R> {
    let (k, e) = complete_integrals(m)?;
    if *m == m.zero() {
        return Ok(m.pi().scale2(-3));
    }
    let complement = m.one() - m.clone();
    let numerator = e - complement.clone() * k;
    Ok(numerator / (m.clone() * complement).scale2(1))
}

/// Jacobi elliptic sine sn(z|m) by the descending Landen transformation.
///
/// Starts from φ_N = 2^N·a_N·z and walks back with
/// `φ_{n−1} = (φ_n + asin(c_n·sin φ_n / a_n)) / 2`; the result is sin φ_0.
/// Uses the same AGM sequence as [`elliptic_k`], so sn(K(m)|m) = 1 to working
/// precision.
pub fn jacobi_sn<R: Real>(z: &R, m: &R) -> Result<R> {
    if !z.is_finite() {
        return Err(PedalError::Domain(format!(
            "sn argument z = {} is not finite",
            z.to_f64()
        )));
    }
    check_parameter(m)?;
    if *m == m.zero() {
        return Ok(z.sin());
    }

    let descent = agm_descent(m)?;
    let steps = descent.a.len() - 1;
    let mut phi = (descent.limit().clone() * z.clone()).scale2(steps as i32);
    for n in (1..=steps).rev() {
        let ratio = descent.c[n].clone() * phi.sin() / descent.a[n].clone();
        phi = (phi.clone() + ratio.asin()).scale2(-1);
    }
    Ok(phi.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Fixed;
    use crate::precision::Precision;
    use approx::assert_relative_eq;

    fn p50() -> Precision {
        Precision::new(50)
    }

    fn fx(text: &str) -> Fixed {
        Fixed::parse(text, p50()).unwrap()
    }

    #[test]
    fn test_k_at_zero_is_half_pi() {
        assert_relative_eq!(elliptic_k(&0.0f64).unwrap(), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn test_k_f64_matches_reference() {
        let k = elliptic_k(&0.5f64).unwrap();
        assert_relative_eq!(k, 1.854_074_677_301_372, epsilon = 1e-14);
    }

    #[test]
    fn test_k_and_e_high_precision() {
        let (k, e) = complete_integrals(&fx("0.75")).unwrap();
        assert_eq!(
            k.to_decimal(45),
            "2.156515647499643235438674998800322028864110216"
        );
        assert_eq!(
            e.to_decimal(45),
            "1.211056027568459524803562899548978676494239799"
        );
    }

    #[test]
    fn test_k_derivative() {
        let dk = elliptic_k_derivative(&fx("0.3")).unwrap();
        assert_eq!(
            dk.to_decimal(40),
            "0.5848582159226464728199124046419282778669"
        );
        let at_zero = elliptic_k_derivative(&0.0f64).unwrap();
        assert_relative_eq!(at_zero, std::f64::consts::PI / 8.0);
    }

    #[test]
    fn test_domain_errors() {
        assert!(matches!(elliptic_k(&-0.1f64), Err(PedalError::Domain(_))));
        assert!(matches!(elliptic_k(&1.0f64), Err(PedalError::Domain(_))));
        assert!(matches!(elliptic_k(&f64::NAN), Err(PedalError::Domain(_))));
        assert!(matches!(jacobi_sn(&0.3f64, &1.5f64), Err(PedalError::Domain(_))));
        assert!(matches!(
            jacobi_sn(&f64::INFINITY, &0.5f64),
            Err(PedalError::Domain(_))
        ));
    }

    #[test]
    fn test_divergence_near_one() {
        let m = 1.0 - f64::EPSILON / 2.0;
        assert!(matches!(elliptic_k(&m), Err(PedalError::Divergence(_))));

        // Representable at 50 digits: large but finite.
        let m = &Fixed::from_int(1, p50()) - &Fixed::pow10_neg(12, p50());
        let k = elliptic_k(&m).unwrap();
        assert!(k.to_f64() > 15.0 && k.to_f64() < 16.0);
    }

    #[test]
    fn test_sn_matches_reference() {
        let sn = jacobi_sn(&fx("1.3"), &fx("0.75")).unwrap();
        assert_eq!(
            sn.to_decimal(45),
            "0.892923515041838926598448806392692550437595383"
        );
        let sn = jacobi_sn(&-0.4f64, &0.1f64).unwrap();
        assert_relative_eq!(sn, -0.388_467_294_050_244_25, epsilon = 1e-14);
    }

    #[test]
    fn test_sn_at_quarter_period_is_one() {
        let m = fx("0.9");
        let k = elliptic_k(&m).unwrap();
        let sn = jacobi_sn(&k, &m).unwrap();
        let err = (&sn - &Fixed::from_int(1, p50())).abs();
        assert!(err < Fixed::epsilon(p50()), "sn(K) - 1 = {}", err.to_f64());
    }

    #[test]
    fn test_sn_zero_parameter_is_sine() {
        let sn = jacobi_sn(&0.7f64, &0.0f64).unwrap();
        assert_relative_eq!(sn, 0.7f64.sin());
    }
}
