use serde::Serialize;

use crate::constants::{GUARD_DIGITS, SERIES_SWITCH};
use crate::elliptic::elliptic_k;
use crate::error::Result;
use crate::precision::Precision;
use crate::real::Real;
use crate::series::KSeries;

/// One motion segment: the forward pedal does not switch on (start, end].
#[derive(Clone, Debug, Serialize)]
pub struct Segment<R> {
    pub index: usize,
    pub start: R,
    pub end: R,
}

/// Lazily extended segment boundaries for one phase.
///
/// `T_0 = K(β)` and `T_k = T_{k−1} + K(m_k)/√(k+β)` with `m_k = 1/(k+β)`.
/// The quarter periods `K(β), K(m_1), …` are cached next to the boundaries
/// because every evaluation inside segment k needs `K(m_k)` again.
/// Extension is a loop, never recursion; the needed k grows like (τ/π)².
/// From `k = SERIES_SWITCH` on, `m_k ≤ 1/10` and `K(m_k)` comes from one
/// shared small-parameter series instead of a fresh AGM run.
#[derive(Clone, Debug)]
pub struct SegmentTable<R> {
    beta: R,
    boundaries: Vec<R>,
    quarter_periods: Vec<R>,
    series: Option<KSeries<R>>,
}

impl<R: Real> SegmentTable<R> {
    pub fn new(beta: R) -> Result<Self> {
        let k0 = elliptic_k(&beta)?;
        Ok(Self {
            beta,
            boundaries: vec![k0.clone()],
            quarter_periods: vec![k0],
            series: None,
        })
    }

    pub fn beta(&self) -> &R {
        &self.beta
    }

    /// Number of segments built so far.
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// T_k, if already built.
    pub fn boundary(&self, k: usize) -> Option<&R> {
        self.boundaries.get(k)
    }

    /// K(β) for k = 0, K(m_k) otherwise.
    pub fn quarter_period(&self, k: usize) -> Option<&R> {
        self.quarter_periods.get(k)
    }

    /// `k + β`, the reciprocal of the segment's elliptic parameter.
    pub fn shifted_index(&self, k: usize) -> R {
        self.beta.integer(k as i64) + self.beta.clone()
    }

    pub fn segment(&self, k: usize) -> Option<Segment<R>> {
        let end = self.boundaries.get(k)?.clone();
        let start = match k {
            0 => self.beta.zero(),
            _ => self.boundaries[k - 1].clone(),
        };
        Some(Segment {
            index: k,
            start,
            end,
        })
    }

    fn last_boundary(&self) -> &R {
        &self.boundaries[self.boundaries.len() - 1]
    }

    /// Append segment `len()`.
    pub fn extend(&mut self) -> Result<()> {
        let k = self.boundaries.len();
        let shifted = self.shifted_index(k);
        let m = shifted.one() / shifted.clone();
        let quarter = if k < SERIES_SWITCH {
            elliptic_k(&m)?
        } else {
            self.small_parameter_series()?.evaluate(&m)?
        };
        let end = self.last_boundary().clone() + quarter.clone() / shifted.sqrt();
        self.boundaries.push(end);
        self.quarter_periods.push(quarter);
        Ok(())
    }

    /// Series for K on `[0, 1/(SERIES_SWITCH + β)]`, accurate past the
    /// guard digits of this precision.
    fn small_parameter_series(&mut self) -> Result<&KSeries<R>> {
        let series = match self.series.take() {
            Some(series) => series,
            None => {
                let shifted = self.shifted_index(SERIES_SWITCH);
                let m_max = shifted.one() / shifted;
                let digits = self.beta.precision().digits() + GUARD_DIGITS;
                KSeries::for_parameter_bound(&m_max, Precision::new(digits))?
            }
        };
        Ok(self.series.insert(series))
    }

    /// Index k with `T_{k−1} < τ ≤ T_k` (k = 0 when `τ ≤ T_0`), extending the
    /// table as far as needed.
    pub fn locate(&mut self, tau: &R) -> Result<usize> {
        while self.last_boundary() < tau {
            self.extend()?;
        }
        Ok(self.boundaries.partition_point(|t| t < tau))
    }
}
