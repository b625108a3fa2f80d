//! CLI argument parsing for stcluster

use crate::adjacency::Connectivity;
use crate::cluster::ClusterStatistic;
use crate::config::{ClusterTestConfig, SignFlipScheme};
use crate::statistic::Tail;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stcluster")]
#[command(version)]
#[command(
    about = "Spatiotemporal cluster-based permutation paired t-test for 4D NIfTI volumes",
    long_about = None
)]
pub struct Cli {
    /// Condition 1 data: 5D NIfTI (subjects, time, X, Y, Z)
    #[arg(value_name = "C1DATA")]
    pub c1data: PathBuf,

    /// Condition 2 data, same shape as condition 1
    #[arg(value_name = "C2DATA")]
    pub c2data: PathBuf,

    /// Output directory (created when missing)
    #[arg(value_name = "SAVE_DIR")]
    pub save_dir: PathBuf,

    /// Name of condition 1 (default: cond1)
    #[arg(long = "c1name", value_name = "NAME")]
    pub c1name: Option<String>,

    /// Name of condition 2 (default: cond2)
    #[arg(long = "c2name", value_name = "NAME")]
    pub c2name: Option<String>,

    /// Cluster-forming p-value threshold (default: 0.05)
    #[arg(short = 'p', long = "pval", value_name = "ALPHA")]
    pub pval: Option<f64>,

    /// Number of sign-flip permutations (default: 5000)
    #[arg(short = 'n', long = "n-perms", value_name = "COUNT")]
    pub n_perms: Option<usize>,

    /// Tail: 0 two-sided, 1 positive, -1 negative (default: 0)
    #[arg(
        short = 't',
        long = "tail",
        value_name = "TAIL",
        allow_negative_numbers = true,
        value_parser = parse_tail
    )]
    pub tail: Option<Tail>,

    /// Seed for the sign-flip generator (default: random, logged)
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Spatial neighborhood for clusters (default: faces)
    #[arg(long = "connectivity", value_enum)]
    pub connectivity: Option<Connectivity>,

    /// Maximum temporal distance between connected timepoints (default: 1)
    #[arg(long = "max-step", value_name = "STEPS")]
    pub max_step: Option<usize>,

    /// Cluster statistic compared against the null (default: mass)
    #[arg(long = "statistic", value_enum)]
    pub statistic: Option<ClusterStatistic>,

    /// Enumerate every sign vector instead of sampling (at most 20 subjects)
    #[arg(long = "exhaustive")]
    pub exhaustive: bool,

    /// Worker threads for permutations (default: all cores)
    #[arg(long = "threads", value_name = "K")]
    pub threads: Option<usize>,

    /// TOML configuration file; command-line flags take precedence
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output
    #[arg(long = "debug")]
    pub debug: bool,
}

fn parse_tail(value: &str) -> Result<Tail, String> {
    value.parse::<Tail>().map_err(|e| e.to_string())
}

impl Cli {
    /// Overlay the flags that were given onto `config`
    pub fn apply_to(&self, mut config: ClusterTestConfig) -> ClusterTestConfig {
        if let Some(name) = &self.c1name {
            config.cond1_name = name.clone();
        }
        if let Some(name) = &self.c2name {
            config.cond2_name = name.clone();
        }
        if let Some(alpha) = self.pval {
            config.alpha = alpha;
        }
        if let Some(n) = self.n_perms {
            config.n_permutations = n;
        }
        if let Some(tail) = self.tail {
            config.tail = tail;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(connectivity) = self.connectivity {
            config.connectivity = connectivity;
        }
        if let Some(max_step) = self.max_step {
            config.max_step = max_step;
        }
        if let Some(statistic) = self.statistic {
            config.statistic = statistic;
        }
        if self.exhaustive {
            config.sign_flip = SignFlipScheme::Exhaustive;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec!["stcluster", "a.nii.gz", "b.nii.gz", "out"];
        args.extend_from_slice(extra);
        Cli::parse_from(args)
    }

    #[test]
    fn test_cli_parses_positionals() {
        let cli = parse(&[]);
        assert_eq!(cli.c1data, PathBuf::from("a.nii.gz"));
        assert_eq!(cli.c2data, PathBuf::from("b.nii.gz"));
        assert_eq!(cli.save_dir, PathBuf::from("out"));
        assert!(!cli.debug);
        assert!(!cli.exhaustive);
    }

    #[test]
    fn test_cli_requires_positionals() {
        assert!(Cli::try_parse_from(["stcluster", "a.nii.gz"]).is_err());
    }

    #[test]
    fn test_cli_defaults_leave_config_unchanged() {
        let cli = parse(&[]);
        assert_eq!(cli.apply_to(ClusterTestConfig::default()), ClusterTestConfig::default());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = parse(&["-p", "0.01", "-n", "1000", "-t", "1"]);
        assert_eq!(cli.pval, Some(0.01));
        assert_eq!(cli.n_perms, Some(1000));
        assert_eq!(cli.tail, Some(Tail::Upper));
    }

    #[test]
    fn test_cli_negative_tail() {
        let cli = parse(&["--tail", "-1"]);
        assert_eq!(cli.tail, Some(Tail::Lower));
        let cli = parse(&["-t", "-1"]);
        assert_eq!(cli.tail, Some(Tail::Lower));
    }

    #[test]
    fn test_cli_invalid_tail_rejected() {
        let result =
            Cli::try_parse_from(["stcluster", "a.nii.gz", "b.nii.gz", "out", "--tail", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_value_enums() {
        let cli = parse(&["--connectivity", "vertices", "--statistic", "extent"]);
        assert_eq!(cli.connectivity, Some(Connectivity::Vertices));
        assert_eq!(cli.statistic, Some(ClusterStatistic::Extent));
    }

    #[test]
    fn test_cli_overrides_file_config() {
        let base = ClusterTestConfig {
            cond1_name: "from_file".to_string(),
            n_permutations: 200,
            max_step: 2,
            ..ClusterTestConfig::default()
        };
        let cli = parse(&[
            "--c2name",
            "houses",
            "-n",
            "50",
            "--seed",
            "9",
            "--exhaustive",
            "--threads",
            "2",
        ]);
        let config = cli.apply_to(base);

        assert_eq!(config.cond1_name, "from_file");
        assert_eq!(config.cond2_name, "houses");
        assert_eq!(config.n_permutations, 50);
        assert_eq!(config.max_step, 2);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.sign_flip, SignFlipScheme::Exhaustive);
        assert_eq!(config.threads, 2);
    }

    #[test]
    fn test_cli_config_and_debug_flags() {
        let cli = parse(&["--config", "run.toml", "--debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("run.toml")));
        assert!(cli.debug);
    }
}
