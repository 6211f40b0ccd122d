//! Long-horizon objective F(c) and its certified minimizer c∞.
//!
//! ```text
//! F(c) = K(β) + Σ_{k≥1} [ K(1/(k+β))/√(k+β) − π/(2√k) ],   β = (1 + sin c)/2
//! ```
//!
//! The first J terms are summed directly with the AGM. Expanding K in its
//! small-parameter series and swapping the sums turns the rest into
//!
//! ```text
//! (π/2)·[ ζ(½, q) − ζ(½, J+1) + Σ_{n=1}^{N} a_n·ζ(n+½, q) ],   q = J + 1 + β
//! ```
//!
//! whose remainder after N terms is bounded explicitly (see [`TailPlan`]).
//! The minimizer works in β: H(β) = F(c(β)) has the same critical point, and
//! H'(β) is available in closed form, so the optimum is a root of H'.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    COARSE_DIGITS, COARSE_GRID, DEGENERACY_EPSILONS, GUARD_DIGITS, MAX_ROOT_ITERATIONS,
    MAX_SERIES_TERMS, MIN_TRUNCATION, TAIL_MARGIN_DIGITS,
};
use crate::elliptic::{complete_integrals, elliptic_k, elliptic_k_derivative};
use crate::error::{PedalError, Result};
use crate::fixed::Fixed;
use crate::precision::Precision;
use crate::series::{TailEngine, coefficient_f64, k_series_coefficients};
use crate::trajectory::beta;

const LN_10: f64 = std::f64::consts::LN_10;

/// Extra digits the H' tail must clear beyond the F tail, so that
/// H'(β* ± 10^-(P+5)) has a certifiable sign.
const DERIVATIVE_MARGIN_DIGITS: f64 = 5.0;

/// Per-term rounding allowance for the direct sums, in units of the last place.
const DIRECT_ULPS_PER_TERM: i64 = 1 << 16;

/// Truncation index J and series order N for the zeta-accelerated tail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailPlan {
    pub truncation: usize,
    pub series_terms: usize,
}

impl TailPlan {
    /// `J = max(40, P)` and the smallest N with a tail bound below
    /// `10^-(P+5)` for every β ∈ [0, 1).
    pub fn for_precision(precision: Precision) -> Result<Self> {
        let truncation = MIN_TRUNCATION.max(precision.digits() as usize);
        let target = -(f64::from(precision.digits()) + TAIL_MARGIN_DIGITS) * LN_10;
        let series_terms = smallest_terms(target, |n| objective_tail_ln(truncation, n, 0.0))?;
        Ok(Self {
            truncation,
            series_terms,
        })
    }

    /// Natural log of the bound on the omitted tail of F at this β.
    ///
    /// With `a_n ≤ a_{N+1}` for n > N and `ζ(s, q) ≤ q^{−s} + q^{1−s}/(s−1)`:
    /// `R ≤ (π/2)·a_{N+1}·q/(q−1)·[q^{−(N+3/2)} + q^{−(N+1/2)}/(N+½)]`.
    pub fn tail_bound_ln(&self, beta: f64) -> f64 {
        objective_tail_ln(self.truncation, self.series_terms, beta)
    }
}

fn objective_tail_ln(truncation: usize, series_terms: usize, beta: f64) -> f64 {
    let q = truncation as f64 + 1.0 + beta;
    let n = series_terms as f64;
    let ln_q = q.ln();
    std::f64::consts::FRAC_PI_2.ln()
        + coefficient_f64(series_terms + 1).ln()
        + (q / (q - 1.0)).ln()
        - (n + 0.5) * ln_q
        + (1.0 / q + 1.0 / (n + 0.5)).ln()
}

/// Natural log of the bound on `(π/2)·Σ_{n≥L} a_n (n+½) ζ(n+3/2, q)`.
fn derivative_tail_ln(truncation: usize, terms: usize, beta: f64) -> f64 {
    let q = truncation as f64 + 1.0 + beta;
    let r = 1.0 / q;
    let l = terms as f64;
    let part1 = ((l + 0.5) / (1.0 - r) + r / ((1.0 - r) * (1.0 - r))) * r;
    let part2 = 1.0 / (1.0 - r);
    std::f64::consts::FRAC_PI_2.ln() + coefficient_f64(terms).ln() - (l + 0.5) * q.ln()
        + (part1 + part2).ln()
}

fn smallest_terms(target_ln: f64, bound_ln: impl Fn(usize) -> f64) -> Result<usize> {
    (1..=MAX_SERIES_TERMS)
        .find(|&n| bound_ln(n) <= target_ln)
        .ok_or_else(|| {
            PedalError::PrecisionUnattainable(format!(
                "tail bound 1e{:.0} needs more than {MAX_SERIES_TERMS} series terms",
                target_ln / LN_10
            ))
        })
}

fn bound_from_ln(ln: f64, precision: Precision) -> Result<Fixed> {
    Ok(Fixed::from_f64(ln, precision)?.exp())
}

/// A working-precision bound re-expressed at `precision`: one ulp for the
/// truncated value and one for the truncated bound itself.
fn output_bound(error: &Fixed, precision: Precision) -> Fixed {
    &error.with_precision(precision) + &Fixed::ulp(precision).mul_int(2)
}

/// F(c) with its error bound.
#[derive(Clone, Debug, Serialize)]
pub struct ObjectiveValue {
    pub value: Fixed,
    pub error_bound: Fixed,
    pub plan: TailPlan,
}

/// The certified long-horizon optimum.
#[derive(Clone, Debug, Serialize)]
pub struct LongHorizonOptimum {
    pub c_infinity: Fixed,
    pub f_min: Fixed,
    pub f_min_error: Fixed,
    /// Decimal places of c∞ shared by both ends of the certified bracket.
    pub digits: u32,
    pub plan: TailPlan,
    /// Root-finding steps on H'(β).
    pub iterations: usize,
}

/// Shared state for evaluating H and H' at one working precision.
struct Evaluator {
    precision: Precision,
    plan: TailPlan,
    derivative_terms: usize,
    engine: TailEngine,
    coefficients: Vec<Fixed>,
    half_pi: Fixed,
    /// Σ_{k=1}^{J} π/(2√k).
    reference_sum: Fixed,
    /// ζ(½, J+1).
    reference_zeta: Fixed,
    rounding: Fixed,
}

impl Evaluator {
    fn new(plan: TailPlan, derivative_terms: usize, precision: Precision) -> Result<Self> {
        let engine = TailEngine::new(precision);
        let half_pi = Fixed::pi(precision).scale2(-1);
        let coefficients =
            k_series_coefficients(plan.series_terms.max(derivative_terms) + 1, precision);

        let mut reference_sum = Fixed::zero(precision);
        for k in 1..=plan.truncation {
            let root = Fixed::from_int(k as i64, precision).sqrt();
            reference_sum = &reference_sum + &(&half_pi / &root);
        }
        let half = Fixed::from_ratio(1, 2, precision);
        let first_omitted = Fixed::from_int(plan.truncation as i64 + 1, precision);
        let reference = engine.hurwitz_zeta(&half, &first_omitted)?;
        let rounding = &Fixed::ulp(precision)
            .mul_int((plan.truncation as i64 + 1) * DIRECT_ULPS_PER_TERM)
            + &reference.error_bound.scale2(1);

        Ok(Self {
            precision,
            plan,
            derivative_terms,
            engine,
            coefficients,
            half_pi,
            reference_sum,
            reference_zeta: reference.value,
            rounding,
        })
    }

    fn int(&self, n: i64) -> Fixed {
        Fixed::from_int(n, self.precision)
    }

    fn tail_base(&self, beta: &Fixed) -> Fixed {
        beta + &self.int(self.plan.truncation as i64 + 1)
    }

    /// H(β) and its error bound.
    fn objective(&self, beta: &Fixed) -> Result<(Fixed, Fixed)> {
        let mut value = elliptic_k(beta)?;
        for k in 1..=self.plan.truncation {
            let shifted = beta + &self.int(k as i64);
            let quarter = elliptic_k(&shifted.recip())?;
            value = &value + &(&quarter / &shifted.sqrt());
        }
        value = &value - &self.reference_sum;

        let q = self.tail_base(beta);
        let half = Fixed::from_ratio(1, 2, self.precision);
        let lead = self.engine.hurwitz_zeta(&half, &q)?;
        let mut tail = &lead.value - &self.reference_zeta;
        let mut zeta_error = lead.error_bound;
        for n in 1..=self.plan.series_terms {
            let s = &self.int(n as i64) + &half;
            let z = self.engine.hurwitz_zeta(&s, &q)?;
            tail = &tail + &(&self.coefficients[n] * &z.value);
            zeta_error = &zeta_error + &z.error_bound;
        }
        value = &value + &(&self.half_pi * &tail);

        let analytic = bound_from_ln(self.plan.tail_bound_ln(beta.to_f64()), self.precision)?;
        let error = &(&analytic + &self.rounding) + &zeta_error.scale2(1);
        Ok((value, error))
    }

    /// H'(β) and its error bound.
    ///
    /// `H'(β) = K'(β) + Σ_{k=1}^{J} g'(k+β) − (π/2)·Σ_{n<L} a_n (n+½) ζ(n+3/2, q)`
    /// with `g(s) = K(1/s)/√s`, so `g'(s) = −½·s^{−3/2}·K(1/s) − s^{−5/2}·K'(1/s)`.
    fn stationarity(&self, beta: &Fixed) -> Result<(Fixed, Fixed)> {
        let one = self.int(1);
        let mut value = elliptic_k_derivative(beta)?;
        for k in 1..=self.plan.truncation {
            let s = beta + &self.int(k as i64);
            let m = s.recip();
            let (quarter, second) = complete_integrals(&m)?;
            let complement = &one - &m;
            let dk = &(&second - &(&complement * &quarter)) / &(&m * &complement).scale2(1);
            let root = s.sqrt();
            let s_root = &s * &root;
            let g = &(&quarter / &s_root).scale2(-1) + &(&dk / &(&s * &s_root));
            value = &value - &g;
        }

        let q = self.tail_base(beta);
        let half = Fixed::from_ratio(1, 2, self.precision);
        let mut tail = Fixed::zero(self.precision);
        let mut zeta_error = Fixed::zero(self.precision);
        for n in 0..self.derivative_terms {
            let order = &self.int(n as i64) + &half;
            let z = self.engine.hurwitz_zeta(&(&order + &one), &q)?;
            tail = &tail + &(&(&self.coefficients[n] * &order) * &z.value);
            zeta_error = &zeta_error + &z.error_bound.mul_int(n as i64 + 1);
        }
        value = &value - &(&self.half_pi * &tail);

        let analytic = bound_from_ln(
            derivative_tail_ln(self.plan.truncation, self.derivative_terms, beta.to_f64()),
            self.precision,
        )?;
        let error = &(&analytic + &self.rounding) + &zeta_error.scale2(1);
        Ok((value, error))
    }
}

/// β(c) for c strictly inside (−π/2, π/2) at working precision.
fn interior_beta(c: &Fixed) -> Result<Fixed> {
    let b = beta(c);
    let threshold = Fixed::epsilon(c.precision()).mul_int(DEGENERACY_EPSILONS);
    let one = Fixed::from_int(1, c.precision());
    if b <= threshold || b >= &one - &threshold {
        return Err(PedalError::Domain(format!(
            "F(c) diverges at |c| = pi/2; got c = {}",
            c.to_f64()
        )));
    }
    Ok(b)
}

/// F(c) summed with `truncation` direct terms and `series_terms` zeta tail
/// terms, at working precision `precision + 20` digits.
///
/// Fails with `PrecisionUnattainable` when the error bound for this (J, N)
/// exceeds `10^-precision`.
pub fn long_horizon_objective(
    c: &Fixed,
    precision: Precision,
    truncation: usize,
    series_terms: usize,
) -> Result<ObjectiveValue> {
    if truncation == 0 {
        return Err(PedalError::InvalidInput(
            "truncation index J must be at least 1".into(),
        ));
    }
    let working = precision.with_extra_digits(GUARD_DIGITS);
    let b = interior_beta(&c.with_precision(working))?;

    let plan = TailPlan {
        truncation,
        series_terms,
    };
    let evaluator = Evaluator::new(plan, 0, working)?;
    let (value, error) = evaluator.objective(&b)?;

    let error_bound = output_bound(&error, precision);
    if error_bound > Fixed::pow10_neg(precision.digits(), precision) {
        return Err(PedalError::PrecisionUnattainable(format!(
            "J = {truncation}, N = {series_terms} bound F only to {:e}, need 1e-{}",
            error_bound.to_f64(),
            precision.digits()
        )));
    }
    Ok(ObjectiveValue {
        value: value.with_precision(precision),
        error_bound,
        plan,
    })
}

/// c = asin(2β − 1), the inverse of β(c).
pub fn phase_from_beta(beta: &Fixed) -> Fixed {
    (&beta.scale2(1) - &Fixed::from_int(1, beta.precision())).asin()
}

/// Cell centres of an open grid over (−π/2, π/2).
fn coarse_phases(precision: Precision) -> Vec<Fixed> {
    let pi = Fixed::pi(precision);
    let cells = COARSE_GRID as i64;
    (0..cells)
        .map(|i| &pi.mul_int(2 * i + 1).div_int(2 * cells) - &pi.scale2(-1))
        .collect()
}

/// β bracket around the coarse minimum of F.
fn coarse_bracket(working: Precision) -> Result<(Fixed, Fixed)> {
    let coarse = Precision::new(COARSE_DIGITS);
    let evaluator = Evaluator::new(TailPlan::for_precision(coarse)?, 0, coarse)?;
    let phases = coarse_phases(coarse);
    let values = phases
        .par_iter()
        .map(|c| evaluator.objective(&beta(c)).map(|(f, _)| f))
        .collect::<Result<Vec<Fixed>>>()?;

    let mut best = 0;
    for (i, f) in values.iter().enumerate() {
        if *f < values[best] {
            best = i;
        }
    }
    if best == 0 || best == values.len() - 1 {
        return Err(PedalError::ConvergenceFailure(format!(
            "coarse minimum of F sits on the grid edge (cell {best})"
        )));
    }
    debug!(
        cell = best,
        c = phases[best].to_f64(),
        f = values[best].to_f64(),
        "coarse minimum of F"
    );
    let lo = beta(&phases[best - 1].with_precision(working));
    let hi = beta(&phases[best + 1].with_precision(working));
    Ok((lo, hi))
}

/// Root of H' inside a sign-changing bracket: secant steps, replaced by
/// bisection whenever they leave the bracket or the slope vanishes.
fn secant_root(
    evaluator: &Evaluator,
    mut lo: Fixed,
    mut hi: Fixed,
    tolerance: &Fixed,
) -> Result<(Fixed, usize)> {
    let (h_lo, _) = evaluator.stationarity(&lo)?;
    let (h_hi, _) = evaluator.stationarity(&hi)?;
    if !h_lo.is_negative() || !h_hi.is_positive() {
        return Err(PedalError::ConvergenceFailure(format!(
            "H' does not change sign on [{}, {}]",
            lo.to_f64(),
            hi.to_f64()
        )));
    }

    let (mut b0, mut h0) = (lo.clone(), h_lo);
    let (mut b1, mut h1) = (hi.clone(), h_hi);
    for iteration in 1..=MAX_ROOT_ITERATIONS {
        let midpoint = (&lo + &hi).scale2(-1);
        let next = if h1 == h0 {
            midpoint
        } else {
            // Slope first: h1·(b1 − b0) alone underflows near the root.
            let slope = &(&b1 - &b0) / &(&h1 - &h0);
            let candidate = &b1 - &(&h1 * &slope);
            if candidate > lo && candidate < hi {
                candidate
            } else {
                midpoint
            }
        };
        let (h_next, _) = evaluator.stationarity(&next)?;
        if h_next.is_negative() {
            lo = next.clone();
        } else {
            hi = next.clone();
        }
        let step = (&next - &b1).abs();
        debug!(iteration, beta = next.to_f64(), h = h_next.to_f64(), "secant step on H'");
        b0 = b1;
        h0 = h1;
        b1 = next;
        h1 = h_next;
        if step <= *tolerance || h1.is_zero() {
            return Ok((b1, iteration));
        }
    }
    Err(PedalError::ConvergenceFailure(format!(
        "secant on H' did not converge in {MAX_ROOT_ITERATIONS} iterations"
    )))
}

/// `(β* − δ, β* + δ)` once the bounds on H' prove a sign change across it.
fn certify_root(evaluator: &Evaluator, root: &Fixed, delta: &Fixed) -> Result<(Fixed, Fixed)> {
    let below = root - delta;
    let above = root + delta;
    let (h_below, err_below) = evaluator.stationarity(&below)?;
    let (h_above, err_above) = evaluator.stationarity(&above)?;
    let certified = (&h_below + &err_below).is_negative() && (&h_above - &err_above).is_positive();
    debug!(
        certified,
        h_below = h_below.to_f64(),
        h_above = h_above.to_f64(),
        bound = err_below.to_f64(),
        "certification of the H' bracket"
    );
    if !certified {
        return Err(PedalError::PrecisionUnattainable(format!(
            "cannot certify the sign of H' within {:e} of the root",
            delta.to_f64()
        )));
    }
    Ok((below, above))
}

/// Largest d ≤ `max_digits` with `trunc(a·10^d) = trunc(b·10^d)`.
fn shared_digits(a: &Fixed, b: &Fixed, max_digits: u32) -> u32 {
    let agree = |d: u32| a.scaled_decimal(d) == b.scaled_decimal(d);
    let (mut lo, mut hi) = (0u32, max_digits);
    if !agree(0) {
        return 0;
    }
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if agree(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

/// c∞ = argmin F(c), certified to `precision` decimal places.
///
/// 1. Coarse parallel scan of F over an open grid in c at 16 digits.
/// 2. Secant on H'(β) inside the neighbouring cells, at `precision + 20`.
/// 3. Certify: `H' + bound < 0` at `β* − δ` and `H' − bound > 0` at `β* + δ`,
///    `δ = 10^-(P+5)`, so the true root lies in `[β* − δ, β* + δ]`.
/// 4. Count the decimals of `asin(2β − 1)` shared by both bracket ends.
pub fn long_horizon_optimal_phase(precision: Precision) -> Result<LongHorizonOptimum> {
    let working = precision.with_extra_digits(GUARD_DIGITS);
    let plan = TailPlan::for_precision(precision)?;
    let derivative_target =
        -(f64::from(precision.digits()) + TAIL_MARGIN_DIGITS + DERIVATIVE_MARGIN_DIGITS) * LN_10;
    let derivative_terms = smallest_terms(derivative_target, |l| {
        derivative_tail_ln(plan.truncation, l, 0.0)
    })?;
    debug!(
        digits = precision.digits(),
        truncation = plan.truncation,
        series_terms = plan.series_terms,
        derivative_terms,
        "long-horizon plan"
    );

    let (lo, hi) = coarse_bracket(working)?;
    let evaluator = Evaluator::new(plan, derivative_terms, working)?;
    let margin = precision.digits() + TAIL_MARGIN_DIGITS as u32;
    let tolerance = Fixed::pow10_neg(margin + DERIVATIVE_MARGIN_DIGITS as u32, working);
    let (root, iterations) = secant_root(&evaluator, lo, hi, &tolerance)?;

    let delta = Fixed::pow10_neg(margin, working);
    let (below, above) = certify_root(&evaluator, &root, &delta)?;

    let c_below = phase_from_beta(&below);
    let c_above = phase_from_beta(&above);
    let digits = shared_digits(&c_below, &c_above, margin);
    if digits < precision.digits() {
        return Err(PedalError::PrecisionUnattainable(format!(
            "only {digits} of {} decimals of c are stable across the certified bracket",
            precision.digits()
        )));
    }

    let (f_min, f_min_error) = evaluator.objective(&root)?;
    Ok(LongHorizonOptimum {
        c_infinity: phase_from_beta(&root).with_precision(precision),
        f_min: f_min.with_precision(precision),
        f_min_error: output_bound(&f_min_error, precision),
        digits,
        plan,
        iterations,
    })
}
