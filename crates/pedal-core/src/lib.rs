//! Forward-pedal bicycle phase optimizer.
//!
//! Solves `x'' = |cos(x − c)|` from rest in closed form (piecewise Jacobi
//! elliptic segments), finds the phase `c*(τ)` that maximizes distance over a
//! finite horizon, and computes the long-horizon optimum
//! `c∞ = argmin F(c)` to any requested number of certified digits using a
//! Hurwitz-zeta accelerated tail.
//!
//! Zero I/O. Precision is always explicit: either a [`Precision`] argument or
//! carried by the [`Fixed`] values passed in.

pub mod constants;
pub mod elliptic;
pub mod error;
pub mod finite_horizon;
pub mod fixed;
pub mod long_horizon;
pub mod precision;
pub mod real;
pub mod segment;
pub mod series;
pub mod trajectory;
pub mod verlet;

pub use constants::C_INFINITY_REFERENCE;
pub use elliptic::{
    complete_integrals, elliptic_e, elliptic_k, elliptic_k_derivative, jacobi_sn,
};
pub use error::{PedalError, Result};
pub use finite_horizon::{
    FiniteHorizonOptimum, FiniteHorizonOptions, Spacing, SweepBudget,
    finite_horizon_optimal_phase, optimal_phase_curve, tau_schedule,
};
pub use fixed::Fixed;
pub use long_horizon::{
    LongHorizonOptimum, ObjectiveValue, TailPlan, long_horizon_objective,
    long_horizon_optimal_phase, phase_from_beta,
};
pub use precision::Precision;
pub use real::Real;
pub use segment::{Segment, SegmentTable};
pub use series::{
    KSeries, TailEngine, ZetaValue, central_binomial, hurwitz_zeta, k_series_coefficient,
    k_series_coefficients,
};
pub use trajectory::{Trajectory, TrajectoryPoint, beta, effective_torque, trajectory};
pub use verlet::{Sample, Verlet, integrate};
