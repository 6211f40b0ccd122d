mod config;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pedal_core::{
    C_INFINITY_REFERENCE, FiniteHorizonOptions, Fixed, Precision, Spacing, SweepBudget, TailPlan,
    finite_horizon_optimal_phase, integrate, long_horizon_objective, long_horizon_optimal_phase,
    optimal_phase_curve, tau_schedule, trajectory,
};
use serde::Serialize;

use crate::config::PedalConfig;

#[derive(Parser)]
#[command(name = "pedal", about = "Forward-pedal bicycle phase optimizer")]
struct Cli {
    /// TOML settings file (falls back to $PEDAL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON records instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Finite-horizon search overrides.
#[derive(clap::Args)]
struct SearchArgs {
    /// Grid points over [-pi/2, pi/2]
    #[arg(long)]
    grid: Option<usize>,

    /// Random refinement windows
    #[arg(long)]
    multi_start: Option<usize>,

    /// Seed for the random windows
    #[arg(long)]
    seed: Option<u64>,
}

/// Size the sweep from a timed solve at the largest horizon.
#[derive(clap::Args)]
struct BudgetArgs {
    /// Wall-clock budget in seconds; overrides --points
    #[arg(long)]
    time_budget: Option<f64>,

    /// Fewest horizons a budgeted sweep uses
    #[arg(long)]
    min_points: Option<usize>,

    /// Most horizons a budgeted sweep uses
    #[arg(long)]
    max_points: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SpacingArg {
    Quadratic,
    Linear,
}

impl From<SpacingArg> for Spacing {
    fn from(value: SpacingArg) -> Self {
        match value {
            SpacingArg::Quadratic => Spacing::Quadratic,
            SpacingArg::Linear => Spacing::Linear,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate x(tau; c) and x'(tau; c) in closed form
    Trajectory {
        /// Crank phase c in [-pi/2, pi/2]
        #[arg(long, allow_hyphen_values = true)]
        phase: String,

        /// Horizon tau >= 0
        #[arg(long)]
        tau: String,

        /// Evaluate with this many decimal digits instead of f64
        #[arg(long)]
        digits: Option<u32>,
    },

    /// Find the phase c*(tau) maximizing distance at one horizon
    OptimalPhase {
        #[arg(long)]
        tau: f64,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Compute c*(tau) over a schedule of horizons (CSV by default)
    Sweep {
        /// Largest horizon
        #[arg(long)]
        t_max: f64,

        /// Number of horizons including 0 and t_max
        #[arg(long, default_value_t = 50)]
        points: usize,

        #[arg(long, value_enum, default_value = "quadratic")]
        spacing: SpacingArg,

        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        budget: BudgetArgs,
    },

    /// Evaluate the long-horizon objective F(c)
    Objective {
        #[arg(long, allow_hyphen_values = true)]
        phase: String,

        #[arg(long)]
        digits: Option<u32>,

        /// Direct terms J (default chosen from the precision)
        #[arg(long)]
        truncation: Option<usize>,

        /// Zeta tail terms N (default chosen from the precision)
        #[arg(long)]
        series_terms: Option<usize>,
    },

    /// Compute the certified long-horizon optimum c_inf
    CInfinity {
        #[arg(long)]
        digits: Option<u32>,
    },

    /// Cross-check the closed form against Verlet and c_inf against its published digits
    Verify {
        #[arg(long, default_value_t = 10.0)]
        tau: f64,

        #[arg(long, default_value_t = 1e-4)]
        step: f64,

        /// Largest accepted deviation from the integrator
        #[arg(long, default_value_t = 1e-6)]
        tolerance: f64,

        /// Decimals of c_inf to recompute
        #[arg(long, default_value_t = 20)]
        digits: u32,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = PedalConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Trajectory { phase, tau, digits } => cmd_trajectory(&cli, phase, tau, *digits),
        Commands::OptimalPhase { tau, search } => cmd_optimal_phase(&cli, &config, *tau, search),
        Commands::Sweep {
            t_max,
            points,
            spacing,
            output,
            search,
            budget,
        } => {
            let options = search_options(&config, search);
            let points = match budget.time_budget {
                Some(seconds) => budgeted_points(&config, *t_max, seconds, budget, &options)?,
                None => *points,
            };
            cmd_sweep(
                &cli,
                *t_max,
                points,
                (*spacing).into(),
                output.as_deref(),
                &options,
            )
        }
        Commands::Objective {
            phase,
            digits,
            truncation,
            series_terms,
        } => cmd_objective(&cli, &config, phase, *digits, *truncation, *series_terms),
        Commands::CInfinity { digits } => cmd_c_infinity(&cli, &config, *digits),
        Commands::Verify {
            tau,
            step,
            tolerance,
            digits,
        } => cmd_verify(*tau, *step, *tolerance, *digits),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn search_options(config: &PedalConfig, search: &SearchArgs) -> FiniteHorizonOptions {
    let mut options = config.finite_horizon.clone();
    if let Some(grid) = search.grid {
        options.grid_resolution = grid;
    }
    if let Some(multi_start) = search.multi_start {
        options.multi_start = multi_start;
    }
    if let Some(seed) = search.seed {
        options.seed = seed;
    }
    options
}

fn parse_f64(text: &str, name: &str) -> Result<f64> {
    text.trim()
        .parse()
        .with_context(|| format!("invalid {name} '{text}'"))
}

fn cmd_trajectory(cli: &Cli, phase: &str, tau: &str, digits: Option<u32>) -> Result<()> {
    match digits {
        None => {
            let c = parse_f64(phase, "phase")?;
            let t = parse_f64(tau, "tau")?;
            let point = trajectory(&c, &t).context("trajectory evaluation failed")?;
            if cli.json {
                return print_json(&point);
            }
            println!("x:        {}", point.x);
            println!("velocity: {}", point.velocity);
            println!("segment:  {}", point.segment);
        }
        Some(digits) => {
            let precision = Precision::new(digits);
            let c = Fixed::parse(phase, precision).context("invalid phase")?;
            let t = Fixed::parse(tau, precision).context("invalid tau")?;
            let point = trajectory(&c, &t).context("trajectory evaluation failed")?;
            if cli.json {
                return print_json(&point);
            }
            println!("x:        {}", point.x.to_decimal(digits));
            println!("velocity: {}", point.velocity.to_decimal(digits));
            println!("segment:  {}", point.segment);
        }
    }
    Ok(())
}

fn cmd_optimal_phase(
    cli: &Cli,
    config: &PedalConfig,
    tau: f64,
    search: &SearchArgs,
) -> Result<()> {
    let options = search_options(config, search);
    let optimum = finite_horizon_optimal_phase(tau, &options)
        .context("finite-horizon search failed")?;
    if cli.json {
        return print_json(&optimum);
    }
    println!("tau:        {}", optimum.tau);
    println!("c_star:     {:.12}", optimum.c_star);
    println!("x_star:     {:.12}", optimum.x_star);
    println!(
        "refinements: {}/{} converged",
        optimum.converged, optimum.candidates
    );
    Ok(())
}

/// Horizon count that fits the budget, from one timed solve at `t_max`.
fn budgeted_points(
    config: &PedalConfig,
    t_max: f64,
    seconds: f64,
    args: &BudgetArgs,
    options: &FiniteHorizonOptions,
) -> Result<usize> {
    let budget = SweepBudget {
        seconds,
        min_points: args.min_points.unwrap_or(config.sweep.min_points),
        max_points: args.max_points.unwrap_or(config.sweep.max_points),
    };
    let start = Instant::now();
    finite_horizon_optimal_phase(t_max, options).context("timing solve failed")?;
    let elapsed = start.elapsed().as_secs_f64();
    let points = budget.points(elapsed).context("invalid sweep budget")?;
    tracing::info!(t_max, elapsed, points, "sized sweep from timed solve");
    Ok(points)
}

fn cmd_sweep(
    cli: &Cli,
    t_max: f64,
    points: usize,
    spacing: Spacing,
    output: Option<&Path>,
    options: &FiniteHorizonOptions,
) -> Result<()> {
    let taus = tau_schedule(t_max, points, spacing).context("invalid horizon schedule")?;
    tracing::info!(points = taus.len(), t_max, "starting sweep");
    let curve = optimal_phase_curve(&taus, options).context("sweep failed")?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);

    if cli.json {
        serde_json::to_writer_pretty(&mut out, &curve).context("failed to serialize sweep")?;
        writeln!(out)?;
    } else {
        writeln!(out, "tau,c_star,x_star")?;
        for point in &curve {
            writeln!(out, "{},{:.12},{:.12}", point.tau, point.c_star, point.x_star)?;
        }
    }
    out.flush().context("failed to write sweep output")?;

    if let Some(path) = output {
        eprintln!("wrote {} rows to {}", curve.len(), path.display());
    }
    Ok(())
}

fn cmd_objective(
    cli: &Cli,
    config: &PedalConfig,
    phase: &str,
    digits: Option<u32>,
    truncation: Option<usize>,
    series_terms: Option<usize>,
) -> Result<()> {
    let digits = digits.unwrap_or(config.long_horizon.digits);
    let precision = Precision::new(digits);
    let plan = TailPlan::for_precision(precision).context("no tail plan for this precision")?;
    let c = Fixed::parse(phase, precision).context("invalid phase")?;
    let value = long_horizon_objective(
        &c,
        precision,
        truncation.unwrap_or(plan.truncation),
        series_terms.unwrap_or(plan.series_terms),
    )
    .context("objective evaluation failed")?;
    if cli.json {
        return print_json(&value);
    }
    println!("F:     {}", value.value.to_decimal(digits));
    println!("error: {:.3e}", value.error_bound.to_f64());
    println!(
        "plan:  J = {}, N = {}",
        value.plan.truncation, value.plan.series_terms
    );
    Ok(())
}

fn cmd_c_infinity(cli: &Cli, config: &PedalConfig, digits: Option<u32>) -> Result<()> {
    let digits = digits.unwrap_or(config.long_horizon.digits);
    tracing::info!(digits, "computing c_inf");
    let optimum =
        long_horizon_optimal_phase(Precision::new(digits)).context("c_inf computation failed")?;
    if cli.json {
        return print_json(&optimum);
    }
    println!("c_inf:  {}", optimum.c_infinity.to_decimal(digits));
    println!("F_min:  {}", optimum.f_min.to_decimal(digits));
    println!("digits: {} certified", optimum.digits);
    println!(
        "plan:   J = {}, N = {}, {} secant steps",
        optimum.plan.truncation, optimum.plan.series_terms, optimum.iterations
    );
    Ok(())
}

fn cmd_verify(tau: f64, step: f64, tolerance: f64, digits: u32) -> Result<()> {
    let mut worst = 0.0f64;
    for c in [-1.2, -0.5, 0.0, 0.54, 1.2] {
        let samples = integrate(c, step, tau).context("integrator failed")?;
        let Some(last) = samples.last() else {
            bail!("integrator returned no samples");
        };
        let exact = trajectory(&c, &tau).context("trajectory evaluation failed")?;
        let err = (exact.x - last.x)
            .abs()
            .max((exact.velocity - last.velocity).abs());
        println!("c = {c:+.2}: |closed form - verlet| = {err:.3e}");
        worst = worst.max(err);
    }
    if worst > tolerance {
        bail!("closed form deviates from the integrator by {worst:.3e} (> {tolerance:.1e})");
    }

    let optimum =
        long_horizon_optimal_phase(Precision::new(digits)).context("c_inf computation failed")?;
    let computed = optimum.c_infinity.to_decimal(digits);
    let width = (digits as usize + 2)
        .min(C_INFINITY_REFERENCE.len())
        .min(computed.len());
    if computed[..width] != C_INFINITY_REFERENCE[..width] {
        bail!("c_inf = {computed} disagrees with {C_INFINITY_REFERENCE}");
    }
    println!("c_inf:  {computed} matches to {} decimals", width - 2);
    println!("ok");
    Ok(())
}
