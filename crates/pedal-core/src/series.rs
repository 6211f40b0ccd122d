//! Power-series coefficients of K(m) and Hurwitz zeta evaluation.
//!
//! Together these turn the infinite tail `Σ_{k>J} K(1/(k+β))/√(k+β)` into a
//! short sum of zeta values: expand K in its small-parameter series
//! `K(m) = (π/2)·Σ a_n m^n`, swap the order of summation, and each inner sum
//! over k becomes `ζ(n + ½, J + 1 + β)`.

use num_bigint::BigInt;
use num_traits::{One, Zero};
use serde::Serialize;

use crate::constants::MAX_SERIES_TERMS;
use crate::error::{PedalError, Result};
use crate::fixed::Fixed;
use crate::precision::Precision;
use crate::real::Real;

/// Correction terms available beyond `bits / 2` in the Bernoulli table.
const BERNOULLI_HEADROOM: usize = 16;

/// Rounding allowance per evaluated term, in units of the last place.
const ROUNDING_ULPS_PER_TERM: i64 = 1 << 16;

/// Central binomial coefficient C(2n, n), exact.
pub fn central_binomial(n: u64) -> BigInt {
    let mut c = BigInt::one();
    for i in 1..=n {
        c = c * (2 * i) * (2 * i - 1) / (i * i);
    }
    c
}

/// a_n = C(2n, n)² / 16^n, the coefficient of m^n in (2/π)·K(m).
pub fn k_series_coefficient(n: usize, precision: Precision) -> Fixed {
    let c = central_binomial(n as u64);
    let numerator = &c * &c;
    let denominator = BigInt::one() << (4 * n);
    Fixed::from_int(1, precision).mul_ratio(&numerator, &denominator)
}

/// a_0 … a_{count−1}, built with the exact recurrence on C(2n, n).
pub fn k_series_coefficients(count: usize, precision: Precision) -> Vec<Fixed> {
    let one = Fixed::from_int(1, precision);
    let mut c = BigInt::one();
    let mut out = Vec::with_capacity(count);
    for n in 0..count {
        if n > 0 {
            let i = n as u64;
            c = c * (2 * i) * (2 * i - 1) / (i * i);
        }
        out.push(one.mul_ratio(&(&c * &c), &(BigInt::one() << (4 * n))));
    }
    out
}

/// a_n in double precision, for error-bound arithmetic.
pub(crate) fn coefficient_f64(n: usize) -> f64 {
    (1..=n).fold(1.0, |a, i| {
        let r = (2 * i - 1) as f64 / (2 * i) as f64;
        a * r * r
    })
}

/// Truncated power series for K(m) valid on `0 ≤ m ≤ m_max`.
///
/// Coefficients live at the precision of `m_max`, built with
/// `a_n = a_{n−1}·((2n−1)/(2n))²`.
#[derive(Clone, Debug)]
pub struct KSeries<R> {
    coefficients: Vec<R>,
    m_max: R,
    remainder_bound: f64,
}

impl<R: Real> KSeries<R> {
    /// Smallest series whose remainder `(π/2)·a_N·m_max^N / (1 − m_max)` is
    /// below `10^-digits` everywhere on `[0, m_max]`.
    pub fn for_parameter_bound(m_max: &R, precision: Precision) -> Result<Self> {
        let m = m_max.to_f64();
        if !m_max.is_finite() || *m_max < m_max.zero() || m >= 1.0 {
            return Err(PedalError::Domain(format!(
                "series bound m_max = {m} outside [0, 1)"
            )));
        }
        let target = -f64::from(precision.digits()) * std::f64::consts::LN_10;
        let ln_prefactor = std::f64::consts::FRAC_PI_2.ln() - (1.0 - m).ln();

        let mut coefficients = vec![m_max.one()];
        let mut ln_a = 0.0f64;
        let remainder = loop {
            // Remainder after `count` terms starts at a_count·m^count.
            let count = coefficients.len();
            let r = ((2 * count - 1) as f64) / ((2 * count) as f64);
            ln_a += 2.0 * r.ln();
            let ln_bound = if m == 0.0 {
                f64::NEG_INFINITY
            } else {
                ln_prefactor + ln_a + count as f64 * m.ln()
            };
            if ln_bound <= target {
                break ln_bound.exp();
            }
            if count >= MAX_SERIES_TERMS {
                return Err(PedalError::PrecisionUnattainable(format!(
                    "K series at m = {m} needs more than {MAX_SERIES_TERMS} terms for {} digits",
                    precision.digits()
                )));
            }
            let odd = m_max.integer(2 * count as i64 - 1);
            let even = m_max.integer(2 * count as i64);
            let previous = coefficients[count - 1].clone();
            coefficients.push(previous * (odd.clone() * odd) / (even.clone() * even));
        };

        Ok(Self {
            coefficients,
            m_max: m_max.clone(),
            remainder_bound: remainder,
        })
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn coefficients(&self) -> &[R] {
        &self.coefficients
    }

    pub fn m_max(&self) -> &R {
        &self.m_max
    }

    pub fn remainder_bound(&self) -> f64 {
        self.remainder_bound
    }

    /// K(m) from the truncated series (Horner form).
    pub fn evaluate(&self, m: &R) -> Result<R> {
        if *m < m.zero() || *m > self.m_max {
            return Err(PedalError::Domain(format!(
                "m = {} outside the series range [0, {}]",
                m.to_f64(),
                self.m_max.to_f64()
            )));
        }
        let mut acc = self.m_max.zero();
        for a in self.coefficients.iter().rev() {
            acc = acc * m.clone() + a.clone();
        }
        Ok(acc * self.m_max.pi().scale2(-1))
    }
}

/// Tangent numbers T_1 … T_n (T_k = |B_{2k}|·4^k(4^k − 1)/(2k)), by the
/// integer triangle recurrence.
fn tangent_numbers(n: usize) -> Vec<BigInt> {
    let mut t = vec![BigInt::zero(); n + 1];
    if n == 0 {
        return t;
    }
    t[1] = BigInt::one();
    for k in 2..=n {
        t[k] = &t[k - 1] * (k - 1);
    }
    for k in 2..=n {
        for j in k..=n {
            t[j] = &t[j - 1] * (j - k) + &t[j] * (j - k + 2);
        }
    }
    t
}

/// A Hurwitz zeta value with its error estimate.
#[derive(Clone, Debug, Serialize)]
pub struct ZetaValue {
    pub value: Fixed,
    pub error_bound: Fixed,
    /// Terms summed directly before the Euler–Maclaurin tail.
    pub direct_terms: usize,
    /// Bernoulli correction terms used.
    pub correction_terms: usize,
}

/// Euler–Maclaurin evaluator for ζ(s, a) at a fixed precision.
///
/// The Bernoulli table holds `B̃_j = B_{2j}/(2j)! · (2π)^{2j}`, which stays of
/// order one, and the matching rising-factorial factor is carried divided by
/// `(2π)^{2j}`. That keeps every correction term accurate to the last place
/// even though `B_{2j}/(2j)!` alone underflows the fixed-point format.
#[derive(Clone, Debug)]
pub struct TailEngine {
    precision: Precision,
    bernoulli: Vec<Fixed>,
    pi: Fixed,
}

impl TailEngine {
    pub fn new(precision: Precision) -> Self {
        let size = precision.bits() as usize / 2 + BERNOULLI_HEADROOM;
        let tangent = tangent_numbers(size);
        let pi = Fixed::pi(precision);
        let pi_sq = &pi * &pi;

        let mut bernoulli = Vec::with_capacity(size);
        let mut pi_power = Fixed::from_int(1, precision);
        let mut factorial = BigInt::one(); // (2j − 1)!
        for j in 1..=size {
            pi_power = &pi_power * &pi_sq;
            if j > 1 {
                factorial = factorial * (2 * j - 2) * (2 * j - 1);
            }
            let four_j = BigInt::one() << (2 * j);
            let denominator = &factorial * (four_j - 1u32);
            let magnitude = pi_power.mul_ratio(&tangent[j], &denominator);
            bernoulli.push(if j % 2 == 1 { magnitude } else { -magnitude });
        }

        Self {
            precision,
            bernoulli,
            pi,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Number of Bernoulli correction terms available.
    pub fn capacity(&self) -> usize {
        self.bernoulli.len()
    }

    /// ζ(s, a) = Σ_{k≥0} (a + k)^{−s}.
    ///
    /// Sums `N = max(0, ⌈(s + bits/2)/π − a⌉)` terms directly, then applies
    /// Euler–Maclaurin at `q = a + N`. For `0 < s < 1` this returns the
    /// analytic continuation.
    pub fn hurwitz_zeta(&self, s: &Fixed, a: &Fixed) -> Result<ZetaValue> {
        let p = self.precision;
        let s = s.with_precision(p);
        let a = a.with_precision(p);
        let one = Fixed::from_int(1, p);
        if !s.is_positive() || s == one {
            return Err(PedalError::Domain(format!(
                "Hurwitz zeta needs s > 0 and s != 1, got s = {}",
                s.to_f64()
            )));
        }
        if !a.is_positive() {
            return Err(PedalError::Domain(format!(
                "Hurwitz zeta needs a > 0, got a = {}",
                a.to_f64()
            )));
        }

        let shift = ((s.to_f64() + f64::from(p.bits()) / 2.0) / std::f64::consts::PI
            - a.to_f64())
        .ceil()
        .max(0.0) as usize;
        let neg_s = -&s;

        let mut total = Fixed::zero(p);
        for k in 0..shift {
            let base = &a + &Fixed::from_int(k as i64, p);
            total = &total + &base.powf(&neg_s)?;
        }

        let q = &a + &Fixed::from_int(shift as i64, p);
        let q_pow = q.powf(&neg_s)?;
        total = &total + &(&(&q_pow * &q) / &(&s - &one));
        total = &total + &q_pow.scale2(-1);

        let two_pi_q = (&self.pi * &q).scale2(1);
        let step = &two_pi_q * &two_pi_q;
        let four_pi_sq = (&self.pi * &self.pi).scale2(2);
        let mut rising = &(&(&s * &q_pow) / &q) / &four_pi_sq;

        let ulp = Fixed::ulp(p);
        let mut previous: Option<Fixed> = None;
        for (index, b) in self.bernoulli.iter().enumerate() {
            let j = index as i64 + 1;
            if j > 1 {
                let lo = &s + &Fixed::from_int(2 * j - 3, p);
                let hi = &s + &Fixed::from_int(2 * j - 2, p);
                rising = &(&(&rising * &lo) * &hi) / &step;
            }
            let term = b * &rising;
            let size = term.abs();
            if let Some(prev) = &previous
                && size > *prev
            {
                return Err(PedalError::PrecisionUnattainable(format!(
                    "Euler-Maclaurin terms for zeta({}, {}) grow at j = {j}",
                    s.to_f64(),
                    a.to_f64()
                )));
            }
            total = &total + &term;
            if size <= ulp {
                let allowance = ulp.mul_int((shift as i64 + j + 4) * ROUNDING_ULPS_PER_TERM);
                return Ok(ZetaValue {
                    value: total,
                    error_bound: &size + &allowance,
                    direct_terms: shift,
                    correction_terms: index + 1,
                });
            }
            previous = Some(size);
        }

        Err(PedalError::PrecisionUnattainable(format!(
            "Bernoulli table ({} terms) exhausted for zeta({}, {}) at {} digits",
            self.bernoulli.len(),
            s.to_f64(),
            a.to_f64(),
            p.digits()
        )))
    }
}

/// One-off ζ(s, a) at `precision`. Prefer a shared [`TailEngine`] when
/// evaluating many values.
pub fn hurwitz_zeta(s: &Fixed, a: &Fixed, precision: Precision) -> Result<ZetaValue> {
    TailEngine::new(precision).hurwitz_zeta(s, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p45() -> Precision {
        Precision::new(45)
    }

    fn fx(text: &str) -> Fixed {
        Fixed::parse(text, p45()).unwrap()
    }

    #[test]
    fn test_central_binomial() {
        assert_eq!(central_binomial(0), BigInt::from(1));
        assert_eq!(central_binomial(5), BigInt::from(252));
        assert_eq!(central_binomial(10), BigInt::from(184_756));
    }

    #[test]
    fn test_coefficients_decrease() {
        let a = k_series_coefficients(6, p45());
        assert_eq!(a[0].to_decimal(6), "1.000000");
        assert_eq!(a[1].to_decimal(6), "0.250000");
        assert_eq!(a[2].to_decimal(8), "0.14062500");
        assert!(a.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(k_series_coefficient(5, p45()), a[5]);
        assert_relative_eq!(coefficient_f64(2), 0.140625);
    }

    #[test]
    fn test_tangent_numbers() {
        let t = tangent_numbers(5);
        let expected = [0u32, 1, 2, 16, 272, 7936];
        for (k, value) in expected.iter().enumerate() {
            assert_eq!(t[k], BigInt::from(*value), "T_{k}");
        }
    }

    #[test]
    fn test_k_series_matches_agm() {
        let m = fx("0.02");
        let series = KSeries::for_parameter_bound(&m, p45()).unwrap();
        assert!(series.len() > 10 && series.len() < 40);
        assert!(series.remainder_bound() < 1e-45);
        let k = series.evaluate(&m).unwrap();
        assert_eq!(
            k.to_decimal(40),
            "1.5787399120077724870593640465913051475215"
        );
        assert!(series.evaluate(&fx("0.05")).is_err());
    }

    #[test]
    fn test_k_series_rejects_unit_bound() {
        assert!(KSeries::for_parameter_bound(&fx("1"), p45()).is_err());
        assert!(KSeries::for_parameter_bound(&-0.1f64, Precision::DOUBLE).is_err());
    }

    #[test]
    fn test_k_series_in_double_precision() {
        let series = KSeries::for_parameter_bound(&0.1f64, Precision::DOUBLE).unwrap();
        for m in [0.0, 0.03, 0.1] {
            let k = series.evaluate(&m).unwrap();
            assert_relative_eq!(k, crate::elliptic::elliptic_k(&m).unwrap(), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_zeta_two() {
        let z = hurwitz_zeta(&fx("2"), &fx("1"), p45()).unwrap();
        assert_eq!(
            z.value.to_decimal(45),
            "1.644934066848226436472415166646025189218949901"
        );
        assert!(z.error_bound < Fixed::epsilon(p45()));
    }

    #[test]
    fn test_zeta_continuation_below_one() {
        let engine = TailEngine::new(p45());
        let z = engine.hurwitz_zeta(&fx("0.5"), &fx("41.25")).unwrap();
        assert_eq!(
            z.value.to_decimal(40),
            "-12.7672254175105004392757363686309698589959"
        );
    }

    #[test]
    fn test_zeta_large_order() {
        let engine = TailEngine::new(p45());
        let z = engine.hurwitz_zeta(&fx("20.5"), &fx("3.75")).unwrap();
        assert_eq!(
            z.value.to_decimal(40),
            "0.0000000000017211920028692136913684791295"
        );
        assert!(z.direct_terms > 0);
    }

    #[test]
    fn test_zeta_domain() {
        let engine = TailEngine::new(p45());
        assert!(matches!(
            engine.hurwitz_zeta(&fx("1"), &fx("2")),
            Err(PedalError::Domain(_))
        ));
        assert!(matches!(
            engine.hurwitz_zeta(&fx("-0.5"), &fx("2")),
            Err(PedalError::Domain(_))
        ));
        assert!(matches!(
            engine.hurwitz_zeta(&fx("2"), &fx("0")),
            Err(PedalError::Domain(_))
        ));
    }
}
