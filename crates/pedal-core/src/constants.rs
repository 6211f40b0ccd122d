/// Published long-horizon optimal phase c∞ (radians), 50 decimals, truncated.
pub const C_INFINITY_REFERENCE: &str = "0.53960434045973786251292463554433549832791740569344";

/// Extra binary digits carried beyond the requested decimal precision.
pub const GUARD_BITS: u32 = 64;

/// Extra decimal digits carried by the long-horizon working precision.
pub const GUARD_DIGITS: u32 = 20;

/// Degenerate-phase threshold on β, and the slack on |c| ≤ π/2, in units of
/// the working epsilon.
pub const DEGENERACY_EPSILONS: i64 = 16;

/// Hard cap on AGM / Landen steps. Quadratic convergence needs far fewer.
pub const MAX_AGM_STEPS: usize = 128;

/// First segment whose quarter period comes from the small-parameter series.
pub const SERIES_SWITCH: usize = 10;

/// Grid resolution for the finite-horizon scan over [-π/2, π/2].
pub const GRID_RESOLUTION: usize = 300;

/// Random multi-start refinement windows per finite-horizon solve.
pub const MULTI_START: usize = 100;

/// Absolute tolerance in c for the bounded Brent refinement.
pub const XATOL: f64 = 1e-9;

/// Iteration cap for one bounded Brent refinement.
pub const BRENT_MAX_ITERS: u64 = 500;

/// Multi-start window half-width, in grid steps.
pub const WINDOW_STEPS: f64 = 2.5;

/// Base RNG seed for multi-start windows.
pub const DEFAULT_SEED: u64 = 20_000_000;

/// Seed stride between successive horizons of a sweep.
pub const SEED_STRIDE: u64 = 10_007;

/// Default wall-clock budget for a budget-sized sweep, in seconds.
pub const SWEEP_BUDGET_SECONDS: f64 = 120.0;

/// Fewest horizons a budget-sized sweep will use.
pub const SWEEP_MIN_POINTS: usize = 80;

/// Most horizons a budget-sized sweep will use.
pub const SWEEP_MAX_POINTS: usize = 350;

/// Smallest truncation index J used by the long-horizon objective.
pub const MIN_TRUNCATION: usize = 40;

/// Digits beyond the target that the zeta tail bound must reach.
pub const TAIL_MARGIN_DIGITS: f64 = 5.0;

/// Upper limit on K-series terms in the zeta-accelerated tail.
pub const MAX_SERIES_TERMS: usize = 4096;

/// Open grid size (cells) for the coarse long-horizon scan in c.
pub const COARSE_GRID: usize = 32;

/// Precision (digits) of the coarse long-horizon scan.
pub const COARSE_DIGITS: u32 = 16;

/// Iteration cap for the safeguarded secant on H'(β).
pub const MAX_ROOT_ITERATIONS: usize = 100;
