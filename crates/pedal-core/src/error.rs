use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PedalError {
    /// Argument outside the mathematically valid range (e.g. m ∉ [0, 1)).
    Domain(String),
    /// Caller-supplied input that no computation accepts (e.g. τ < 0).
    InvalidInput(String),
    /// K(m) diverges: m is indistinguishable from 1 at the working precision.
    Divergence(String),
    /// The truncation/series budget cannot certify the requested digits.
    PrecisionUnattainable(String),
    /// An iterative solver did not converge within its limits.
    ConvergenceFailure(String),
}

impl fmt::Display for PedalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PedalError::Domain(msg) => write!(f, "domain error: {msg}"),
            PedalError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            PedalError::Divergence(msg) => write!(f, "divergence: {msg}"),
            PedalError::PrecisionUnattainable(msg) => write!(f, "precision unattainable: {msg}"),
            PedalError::ConvergenceFailure(msg) => write!(f, "convergence failure: {msg}"),
        }
    }
}

impl std::error::Error for PedalError {}

pub type Result<T> = std::result::Result<T, PedalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let e = PedalError::InvalidInput("tau = -1 is negative".into());
        assert_eq!(e.to_string(), "invalid input: tau = -1 is negative");

        let e = PedalError::Divergence("K(m) at m = 1".into());
        assert!(e.to_string().starts_with("divergence:"));
    }
}
