//! Command-line interface for spherical fiducial fitting.

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use spherefit::{LocalizeConfig, PointSet, Sphere, SphereLocalizer};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "spherefit")]
#[command(about = "Fit spheres to edge points of spherical fiducial markers (algebraic least squares)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a sphere to a JSON point set.
    Fit(CliFitArgs),

    /// Write a synthetic point set sampled on a sphere.
    Synth(CliSynthArgs),

    /// Print the default localizer configuration as JSON.
    ConfigTemplate,
}

#[derive(Debug, Clone, Args)]
struct CliFitArgs {
    /// Input point set (JSON: {"points": [[x,y,z],...], "weights": [...]}).
    #[arg(long)]
    input: PathBuf,

    /// Path to write the fit result (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Localizer configuration file (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ignore weights present in the input and run the plain fit.
    #[arg(long)]
    unweighted: bool,

    /// Relative singular-value threshold for the rank test.
    #[arg(long)]
    rank_tolerance: Option<f64>,

    /// Minimum number of points (never below 5).
    #[arg(long)]
    min_points: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct CliSynthArgs {
    /// Sphere center in mm, as x,y,z.
    #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
    center: [f64; 3],

    /// Sphere radius in mm.
    #[arg(long)]
    radius: f64,

    /// Number of surface points.
    #[arg(long, default_value = "64")]
    n: usize,

    /// Uniform noise half-width in mm added to each coordinate.
    #[arg(long, default_value = "0.0")]
    noise: f64,

    /// Number of outlier points scattered in the bounding box of 3 radii.
    #[arg(long, default_value = "0")]
    outliers: usize,

    /// Emit weights: 1 for surface points, this value for outliers.
    #[arg(long)]
    outlier_weight: Option<f64>,

    /// RNG seed.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Path to write the point set (JSON).
    #[arg(long)]
    out: PathBuf,
}

fn parse_vec3(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got '{}'", s));
    }
    let mut v = [0.0f64; 3];
    for (dst, part) in v.iter_mut().zip(&parts) {
        *dst = part
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate '{}': {}", part, e))?;
    }
    Ok(v)
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fit(args) => run_fit(&args),
        Commands::Synth(args) => run_synth(&args),
        Commands::ConfigTemplate => run_config_template(),
    }
}

// ── fit ────────────────────────────────────────────────────────────────

fn build_config(args: &CliFitArgs) -> CliResult<LocalizeConfig> {
    let mut config = match &args.config {
        Some(path) => LocalizeConfig::from_json_file(path).map_err(|e| -> CliError {
            format!("Failed to load config {}: {}", path.display(), e).into()
        })?,
        None => LocalizeConfig::default(),
    };
    if let Some(tol) = args.rank_tolerance {
        if !(tol.is_finite() && tol > 0.0) {
            return Err("--rank-tolerance must be a positive finite number".into());
        }
        config.fit.rank_tolerance = tol;
    }
    if let Some(n) = args.min_points {
        config.fit.min_points = n;
    }
    Ok(config)
}

fn run_fit(args: &CliFitArgs) -> CliResult<()> {
    tracing::info!("Loading points: {}", args.input.display());

    let data = std::fs::read_to_string(&args.input).map_err(|e| -> CliError {
        format!("Failed to read {}: {}", args.input.display(), e).into()
    })?;
    let mut set: PointSet = serde_json::from_str(&data)?;
    if args.unweighted {
        set.weights = None;
    }
    tracing::info!(
        "{} points ({})",
        set.points.len(),
        if set.weights.is_some() {
            "weighted"
        } else {
            "unweighted"
        }
    );

    let localizer = SphereLocalizer::with_config(build_config(args)?);
    let estimate = set.fit(&localizer)?;

    let c = estimate.center();
    tracing::info!(
        "Sphere: center=({:.4}, {:.4}, {:.4}) mm, radius={:.4} mm, rms={:.3e} mm, cond={:.2e}",
        c[0],
        c[1],
        c[2],
        estimate.radius(),
        estimate.metrics.rms_geometric,
        estimate.metrics.condition_number,
    );

    let json = serde_json::to_string_pretty(&estimate)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());

    Ok(())
}

// ── synth ──────────────────────────────────────────────────────────────

fn synth_point_set(args: &CliSynthArgs) -> CliResult<PointSet> {
    if !(args.radius.is_finite() && args.radius > 0.0) {
        return Err("--radius must be a positive finite number".into());
    }
    if !(args.noise.is_finite() && args.noise >= 0.0) {
        return Err("--noise must be a non-negative finite number".into());
    }

    let sphere = Sphere {
        center: args.center,
        radius: args.radius,
    };
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut points = sphere.sample_points(args.n);
    if args.noise > 0.0 {
        for p in &mut points {
            for v in p.iter_mut() {
                *v += rng.gen_range(-args.noise..=args.noise);
            }
        }
    }

    let box_half = 3.0 * args.radius;
    for _ in 0..args.outliers {
        let mut p = args.center;
        for v in p.iter_mut() {
            *v += rng.gen_range(-box_half..box_half);
        }
        points.push(p);
    }

    let weights = args.outlier_weight.map(|w| {
        let mut weights = vec![1.0; args.n];
        weights.extend(std::iter::repeat(w).take(args.outliers));
        weights
    });

    Ok(PointSet { points, weights })
}

fn run_synth(args: &CliSynthArgs) -> CliResult<()> {
    let set = synth_point_set(args)?;
    let json = serde_json::to_string_pretty(&set)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!(
        "{} points written to {}",
        set.points.len(),
        args.out.display()
    );
    Ok(())
}

// ── config-template ────────────────────────────────────────────────────

fn run_config_template() -> CliResult<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&LocalizeConfig::default())?
    );
    Ok(())
}
