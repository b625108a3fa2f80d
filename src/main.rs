use anyhow::{Context, Result};
use clap::Parser;
use stcluster::{cli::Cli, config::ClusterTestConfig, pipeline};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber: INFO by default, TRACE with --debug
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let base = match &args.config {
        Some(path) => ClusterTestConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClusterTestConfig::default(),
    };
    let config = args.apply_to(base);

    let report = pipeline::run_pipeline(&args.c1data, &args.c2data, &args.save_dir, &config)
        .context("Cluster permutation test failed")?;

    print!("{}", report.analysis.summary.to_report_string());
    println!("Seed: {}", report.seed);
    println!("Wrote {}", report.paths.tstat.display());
    println!("Wrote {}", report.paths.clusters.display());
    println!("Wrote {}", report.paths.contrast_average.display());
    println!("Wrote {}", report.paths.summary.display());

    Ok(())
}
