//! Arbitrary-precision binary fixed-point reals.
//!
//! A [`Fixed`] is `mantissa / 2^bits` with a `BigInt` mantissa and a bit
//! count derived from the [`Precision`] it was built with. Absolute error is
//! what every routine here controls: products and quotients round toward
//! zero, and transcendental functions stay within a few units of
//! `2^-(bits - GUARD_BITS)`, i.e. roughly `10^-digits`.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Serialize, Serializer};

use crate::constants::GUARD_BITS;
use crate::error::{PedalError, Result};
use crate::precision::Precision;

/// Argument reduction halves until |x| < 2^-REDUCTION_BITS.
const REDUCTION_BITS: u32 = 8;

/// Internal headroom for the π and ln 2 series.
const CONSTANT_HEADROOM: u32 = 16;

#[derive(Clone)]
pub struct Fixed {
    mant: BigInt,
    bits: u32,
    precision: Precision,
}

impl Fixed {
    fn from_mantissa(mant: BigInt, precision: Precision) -> Self {
        Self {
            mant,
            bits: precision.bits(),
            precision,
        }
    }

    pub fn zero(precision: Precision) -> Self {
        Self::from_mantissa(BigInt::zero(), precision)
    }

    pub fn from_int(n: i64, precision: Precision) -> Self {
        Self::from_mantissa(BigInt::from(n) << precision.bits(), precision)
    }

    pub fn from_bigint(n: &BigInt, precision: Precision) -> Self {
        Self::from_mantissa(n << precision.bits(), precision)
    }

    /// `num / den`, rounded toward zero.
    ///
    /// # Panics
    /// Panics if `den == 0`.
    pub fn from_ratio(num: i64, den: i64, precision: Precision) -> Self {
        let scaled = BigInt::from(num) << precision.bits();
        Self::from_mantissa(scaled / den, precision)
    }

    /// Exact conversion of a finite `f64` (truncated below the last bit).
    pub fn from_f64(x: f64, precision: Precision) -> Result<Self> {
        if !x.is_finite() {
            return Err(PedalError::InvalidInput(format!(
                "cannot represent non-finite value {x}"
            )));
        }
        let (m, e, sign) = num_traits::Float::integer_decode(x);
        let shift = i64::from(e) + i64::from(precision.bits());
        let magnitude = BigInt::from(m);
        let magnitude = if shift >= 0 {
            magnitude << (shift as u64)
        } else {
            magnitude >> ((-shift) as u64)
        };
        let mant = if sign < 0 { -magnitude } else { magnitude };
        Ok(Self::from_mantissa(mant, precision))
    }

    /// Parse a plain decimal literal such as `-0.5396043404`, rounding to
    /// the nearest representable value.
    pub fn parse(text: &str, precision: Precision) -> Result<Self> {
        let invalid = || PedalError::InvalidInput(format!("not a decimal number: {text:?}"));
        let trimmed = text.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(invalid());
        }

        let digits = format!("{int_part}{frac_part}");
        let numerator = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(invalid)?;
        let scale = pow10(frac_part.len() as u32);
        let half = &scale >> 1u32;
        let magnitude = ((numerator << precision.bits()) + half) / &scale;
        let mant = if negative { -magnitude } else { magnitude };
        Ok(Self::from_mantissa(mant, precision))
    }

    /// `10^-exponent`.
    pub fn pow10_neg(exponent: u32, precision: Precision) -> Self {
        let one = BigInt::one() << precision.bits();
        Self::from_mantissa(one / pow10(exponent), precision)
    }

    /// One unit in the last binary place.
    pub fn ulp(precision: Precision) -> Self {
        Self::from_mantissa(BigInt::one(), precision)
    }

    /// `2^-(bits - GUARD_BITS)`, about `10^-digits`: the convergence
    /// tolerance for iterative routines at this precision.
    pub fn epsilon(precision: Precision) -> Self {
        Self::from_mantissa(BigInt::one() << GUARD_BITS, precision)
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Same value re-expressed at another precision.
    pub fn with_precision(&self, precision: Precision) -> Self {
        Self {
            mant: self.mant_at(precision.bits()).into_owned(),
            bits: precision.bits(),
            precision,
        }
    }

    fn mant_at(&self, bits: u32) -> Cow<'_, BigInt> {
        match bits.cmp(&self.bits) {
            Ordering::Equal => Cow::Borrowed(&self.mant),
            Ordering::Greater => Cow::Owned(&self.mant << (bits - self.bits)),
            Ordering::Less => Cow::Owned(shift_toward_zero(self.mant.clone(), self.bits - bits)),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.mant.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.mant.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.mant.is_positive()
    }

    pub fn abs(&self) -> Self {
        Self::from_mantissa(self.mant.abs(), self.precision)
    }

    /// `self · 2^k`, exact for k ≥ 0.
    pub fn scale2(&self, k: i32) -> Self {
        let mant = if k >= 0 {
            &self.mant << k.unsigned_abs()
        } else {
            shift_toward_zero(self.mant.clone(), k.unsigned_abs())
        };
        Self::from_mantissa(mant, self.precision)
    }

    pub fn mul_int(&self, n: i64) -> Self {
        Self::from_mantissa(&self.mant * n, self.precision)
    }

    /// # Panics
    /// Panics if `n == 0`.
    pub fn div_int(&self, n: i64) -> Self {
        Self::from_mantissa(&self.mant / n, self.precision)
    }

    /// `self · num / den` with exact integers, rounded toward zero.
    pub fn mul_ratio(&self, num: &BigInt, den: &BigInt) -> Self {
        Self::from_mantissa(&self.mant * num / den, self.precision)
    }

    pub fn recip(&self) -> Self {
        &Self::from_int(1, self.precision) / self
    }

    /// Nearest `f64` (values beyond the `f64` range saturate to ±∞ or 0).
    pub fn to_f64(&self) -> f64 {
        let shift = self.mant.bits().saturating_sub(64);
        let top = (&self.mant >> shift).to_f64().unwrap_or(0.0);
        let exponent = shift as i64 - i64::from(self.bits);
        let e = exponent.clamp(-4000, 4000) as i32;
        top * 2f64.powi(e / 2) * 2f64.powi(e - e / 2)
    }

    /// `trunc(self · 10^digits)`.
    pub fn scaled_decimal(&self, digits: u32) -> BigInt {
        let magnitude = (self.mant.abs() * pow10(digits)) >> self.bits;
        if self.mant.is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Decimal expansion truncated (toward zero) after `digits` places.
    pub fn to_decimal(&self, digits: u32) -> String {
        format_scaled(&self.scaled_decimal(digits), digits, self.is_negative())
    }

    // -- constants -----------------------------------------------------------

    /// π by Machin's formula, 16·atan(1/5) − 4·atan(1/239).
    pub fn pi(precision: Precision) -> Self {
        let work = precision.bits() + CONSTANT_HEADROOM;
        let sum = atan_recip(5, work) * 16u32 - atan_recip(239, work) * 4u32;
        Self::from_mantissa(sum >> CONSTANT_HEADROOM, precision)
    }

    /// ln 2 = Σ 1/(k·2^k).
    pub fn ln2(precision: Precision) -> Self {
        let work = precision.bits() + CONSTANT_HEADROOM;
        let mut power = BigInt::one() << (work - 1);
        let mut sum = BigInt::zero();
        let mut k = 1u64;
        while !power.is_zero() {
            sum += &power / k;
            power >>= 1u32;
            k += 1;
        }
        Self::from_mantissa(sum >> CONSTANT_HEADROOM, precision)
    }

    // -- elementary functions ------------------------------------------------

    /// Square root; negative inputs (rounding noise) clamp to zero.
    pub fn sqrt(&self) -> Self {
        if !self.mant.is_positive() {
            return Self::zero(self.precision);
        }
        Self::from_mantissa((&self.mant << self.bits).sqrt(), self.precision)
    }

    /// Simultaneous sine and cosine: halve below 2^-8, sum both Taylor
    /// series, then double back with `sin 2y = 2 sin y cos y`,
    /// `cos 2y = cos²y − sin²y`.
    pub fn sin_cos(&self) -> (Self, Self) {
        let p = self.precision;
        let limit = self.reduction_limit();
        let mut y = self.clone();
        let mut halvings = 0u32;
        while y.abs() > limit {
            y = y.scale2(-1);
            halvings += 1;
        }

        let y2 = &y * &y;
        let mut term = y.clone();
        let mut sin = y;
        let mut k = 1i64;
        while !term.is_zero() {
            term = (&term * &y2).div_int(-(2 * k) * (2 * k + 1));
            sin = &sin + &term;
            k += 1;
        }

        let mut term = Self::from_int(1, p);
        let mut cos = term.clone();
        let mut k = 1i64;
        while !term.is_zero() {
            term = (&term * &y2).div_int(-(2 * k - 1) * (2 * k));
            cos = &cos + &term;
            k += 1;
        }

        for _ in 0..halvings {
            let doubled_sin = (&sin * &cos).scale2(1);
            cos = &(&cos * &cos) - &(&sin * &sin);
            sin = doubled_sin;
        }
        (sin, cos)
    }

    pub fn sin(&self) -> Self {
        self.sin_cos().0
    }

    pub fn cos(&self) -> Self {
        self.sin_cos().1
    }

    /// Arctangent via the half-angle map `y → y / (1 + √(1 + y²))`, Taylor
    /// series on the reduced argument, then scale back by 2^halvings.
    pub fn atan(&self) -> Self {
        let one = Self::from_int(1, self.precision);
        let limit = self.reduction_limit();
        let mut y = self.clone();
        let mut halvings = 0i32;
        while y.abs() > limit {
            let root = (&one + &(&y * &y)).sqrt();
            y = &y / &(&one + &root);
            halvings += 1;
        }

        let y2 = &y * &y;
        let mut power = y.clone();
        let mut sum = y;
        let mut k = 1i64;
        loop {
            power = -(&power * &y2);
            let term = power.div_int(2 * k + 1);
            if term.is_zero() {
                break;
            }
            sum = &sum + &term;
            k += 1;
        }
        sum.scale2(halvings)
    }

    /// Arcsine; arguments at or beyond ±1 return ±π/2.
    pub fn asin(&self) -> Self {
        let one = Self::from_int(1, self.precision);
        let cos = (&one - &(self * self)).sqrt();
        if self.abs() >= one || cos.is_zero() {
            let half_pi = Self::pi(self.precision).scale2(-1);
            return if self.is_negative() { -half_pi } else { half_pi };
        }
        (self / &cos).atan()
    }

    /// `e^x`: split off `k·ln 2`, halve the remainder `REDUCTION_BITS` times,
    /// Taylor, square back, shift by `k`.
    pub fn exp(&self) -> Self {
        let p = self.precision;
        let approx = self.to_f64();
        // Below this the result is smaller than one unit in the last place.
        if approx < -(f64::from(self.bits) + 2.0) * std::f64::consts::LN_2 {
            return Self::zero(p);
        }
        let k = (approx / std::f64::consts::LN_2)
            .round()
            .clamp(-1e6, 1e6) as i64;
        let reduced = self - &Self::ln2(p).mul_int(k);
        let y = reduced.scale2(-(REDUCTION_BITS as i32));

        let mut term = Self::from_int(1, p);
        let mut sum = term.clone();
        let mut n = 1i64;
        loop {
            term = (&term * &y).div_int(n);
            if term.is_zero() {
                break;
            }
            sum = &sum + &term;
            n += 1;
        }
        for _ in 0..REDUCTION_BITS {
            sum = &sum * &sum;
        }
        sum.scale2(k as i32)
    }

    /// Natural logarithm: `x = 2^k·y` with `y ∈ [1, 2)`, then
    /// `ln y = 2·atanh((y − 1)/(y + 1))`.
    pub fn ln(&self) -> Result<Self> {
        if !self.is_positive() {
            return Err(PedalError::Domain(format!(
                "ln of non-positive value {}",
                self.to_f64()
            )));
        }
        let p = self.precision;
        let k = self.mant.bits() as i64 - 1 - i64::from(self.bits);
        let y = self.scale2(-(k as i32));
        let one = Self::from_int(1, p);
        let z = &(&y - &one) / &(&y + &one);
        let z2 = &z * &z;
        let mut power = z.clone();
        let mut sum = z;
        let mut j = 1i64;
        loop {
            power = &power * &z2;
            let term = power.div_int(2 * j + 1);
            if term.is_zero() {
                break;
            }
            sum = &sum + &term;
            j += 1;
        }
        Ok(&sum.scale2(1) + &Self::ln2(p).mul_int(k))
    }

    /// `self^s = exp(s·ln self)` for positive `self`.
    pub fn powf(&self, s: &Fixed) -> Result<Self> {
        Ok((s * &self.ln()?).exp())
    }

    fn reduction_limit(&self) -> Self {
        Self::from_mantissa(BigInt::one() << (self.bits - REDUCTION_BITS), self.precision)
    }
}

/// `Σ (−1)^k / ((2k+1)·n^(2k+1))` scaled by `2^bits`.
fn atan_recip(n: u32, bits: u32) -> BigInt {
    let n2 = BigInt::from(n) * n;
    let mut power = (BigInt::one() << bits) / n;
    let mut sum = power.clone();
    let mut k = 1u64;
    while !power.is_zero() {
        power /= &n2;
        let term = &power / (2 * k + 1);
        if k % 2 == 1 {
            sum -= term;
        } else {
            sum += term;
        }
        k += 1;
    }
    sum
}

fn pow10(exponent: u32) -> BigInt {
    BigInt::from(10u32).pow(exponent)
}

fn shift_toward_zero(value: BigInt, bits: u32) -> BigInt {
    if value.is_negative() {
        -((-value) >> bits)
    } else {
        value >> bits
    }
}

fn format_scaled(scaled: &BigInt, digits: u32, negative: bool) -> String {
    let digits = digits as usize;
    let mut body = scaled.abs().to_string();
    if body.len() <= digits {
        body = format!("{}{body}", "0".repeat(digits + 1 - body.len()));
    }
    let sign = if negative { "-" } else { "" };
    if digits == 0 {
        return format!("{sign}{body}");
    }
    let (int_part, frac_part) = body.split_at(body.len() - digits);
    format!("{sign}{int_part}.{frac_part}")
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

impl Add<&Fixed> for &Fixed {
    type Output = Fixed;

    fn add(self, rhs: &Fixed) -> Fixed {
        Fixed::from_mantissa(&self.mant + &*rhs.mant_at(self.bits), self.precision)
    }
}

impl Sub<&Fixed> for &Fixed {
    type Output = Fixed;

    fn sub(self, rhs: &Fixed) -> Fixed {
        Fixed::from_mantissa(&self.mant - &*rhs.mant_at(self.bits), self.precision)
    }
}

impl Mul<&Fixed> for &Fixed {
    type Output = Fixed;

    fn mul(self, rhs: &Fixed) -> Fixed {
        let product = &self.mant * &*rhs.mant_at(self.bits);
        Fixed::from_mantissa(shift_toward_zero(product, self.bits), self.precision)
    }
}

/// # Panics
/// Panics on division by an exact zero, like integer division.
impl Div<&Fixed> for &Fixed {
    type Output = Fixed;

    fn div(self, rhs: &Fixed) -> Fixed {
        let numerator = &self.mant << self.bits;
        Fixed::from_mantissa(numerator / &*rhs.mant_at(self.bits), self.precision)
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<Fixed> for Fixed {
            type Output = Fixed;

            fn $method(self, rhs: Fixed) -> Fixed {
                &self $op &rhs
            }
        }

        impl $trait<&Fixed> for Fixed {
            type Output = Fixed;

            fn $method(self, rhs: &Fixed) -> Fixed {
                &self $op rhs
            }
        }

        impl $trait<Fixed> for &Fixed {
            type Output = Fixed;

            fn $method(self, rhs: Fixed) -> Fixed {
                self $op &rhs
            }
        }
    };
}

forward_binop!(Add, add, +);
forward_binop!(Sub, sub, -);
forward_binop!(Mul, mul, *);
forward_binop!(Div, div, /);

impl Neg for &Fixed {
    type Output = Fixed;

    fn neg(self) -> Fixed {
        Fixed::from_mantissa(-&self.mant, self.precision)
    }
}

impl Neg for Fixed {
    type Output = Fixed;

    fn neg(self) -> Fixed {
        Fixed::from_mantissa(-self.mant, self.precision)
    }
}

impl PartialEq for Fixed {
    fn eq(&self, other: &Self) -> bool {
        self.mant == *other.mant_at(self.bits)
    }
}

impl PartialOrd for Fixed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.mant.cmp(&*other.mant_at(self.bits)))
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal(self.precision.digits()))
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({}; {} digits)", self, self.precision.digits())
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
