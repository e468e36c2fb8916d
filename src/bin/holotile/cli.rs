//! Command-line argument parsing for holotile

use clap::Parser;
use hologram_tile_pipeline::config::Config;
use std::path::PathBuf;

/// Holotile - Stream a scalar add through the tile pipeline and verify it
#[derive(Parser, Debug)]
#[command(name = "holotile")]
#[command(author, version, about = "Holotile - Stream a scalar add through the tile pipeline and verify it", long_about = None)]
pub struct Cli {
    /// Load settings from a JSON config file (flags override it)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of tiles in the source tensor
    #[arg(short = 'n', long)]
    pub tiles: Option<usize>,

    /// Scalar added to every element
    #[arg(short, long, allow_negative_numbers = true)]
    pub scalar: Option<f32>,

    /// Slots per staging buffer
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Absolute verification tolerance
    #[arg(long)]
    pub tolerance: Option<f32>,

    /// Relative verification tolerance
    #[arg(long)]
    pub rel_tolerance: Option<f32>,

    /// Seed for source generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fail a run whose staging buffers block longer than this
    #[arg(long, value_name = "MS")]
    pub stall_timeout_ms: Option<u64>,

    /// Also run the inverse transform and check the source is restored
    #[arg(long)]
    pub round_trip: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub dump_config: bool,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        use tracing_subscriber::{fmt, EnvFilter};

        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Apply command-line overrides on top of `config`
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(tiles) = self.tiles {
            config.run.tile_count = tiles;
        }
        if let Some(scalar) = self.scalar {
            config.run.scalar = scalar;
        }
        if let Some(depth) = self.depth {
            config.pipeline.staging_depth = depth;
        }
        if let Some(tolerance) = self.tolerance {
            config.run.tolerance.absolute = tolerance;
        }
        if let Some(relative) = self.rel_tolerance {
            config.run.tolerance.relative = relative;
        }
        if self.seed.is_some() {
            config.run.seed = self.seed;
        }
        if self.stall_timeout_ms.is_some() {
            config.pipeline.stall_timeout_ms = self.stall_timeout_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::parse_from(["holotile"]);
        assert!(cli.config.is_none());
        assert!(!cli.round_trip);
        assert_eq!(cli.verbose, 0);

        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "holotile",
            "--tiles",
            "8",
            "--scalar",
            "-2.5",
            "--depth",
            "4",
            "--tolerance",
            "0.1",
            "--seed",
            "42",
            "--stall-timeout-ms",
            "500",
            "--round-trip",
            "-vv",
        ]);

        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.run.tile_count, 8);
        assert_eq!(config.run.scalar, -2.5);
        assert_eq!(config.pipeline.staging_depth, 4);
        assert_eq!(config.run.tolerance.absolute, 0.1);
        assert_eq!(config.run.seed, Some(42));
        assert_eq!(config.pipeline.stall_timeout_ms, Some(500));
        assert!(cli.round_trip);
        assert_eq!(cli.verbose, 2);
    }
}
