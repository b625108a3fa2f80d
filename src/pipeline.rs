//! End-to-end run: load both conditions, test, write result volumes
//!
//! The in-memory half ([`analyze`]) is separate from file handling so library
//! callers can supply their own arrays and random source.

use crate::config::ClusterTestConfig;
use crate::dataset::PairedDataset;
use crate::error::Result;
use crate::nifti_io::{self, Affine};
use crate::permutation::{ClusterPermutationTest, PermutationOutcome};
use crate::results::{assemble_volumes, OutputPaths, ResultVolumes, RunSummary};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::path::Path;

/// Everything produced by one in-memory analysis
#[derive(Debug, Clone)]
pub struct Analysis {
    pub outcome: PermutationOutcome,
    pub volumes: ResultVolumes,
    pub summary: RunSummary,
}

/// Result of a file-based run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub analysis: Analysis,
    pub paths: OutputPaths,
    /// Seed actually used for sign flipping
    pub seed: u64,
}

/// Run the cluster permutation test on an in-memory dataset
pub fn analyze<R: Rng + ?Sized>(
    data: &PairedDataset,
    config: &ClusterTestConfig,
    rng: &mut R,
) -> Result<Analysis> {
    let shape = data.shape();
    let test = ClusterPermutationTest::new(config, shape)?;
    let outcome = test.run(data, rng)?;

    let mean_contrast = data.mean_contrast().to_vec();
    let volumes = assemble_volumes(&outcome, shape, &mean_contrast);
    let summary = RunSummary::new(config, &outcome, shape);

    Ok(Analysis {
        outcome,
        volumes,
        summary,
    })
}

/// Load the two condition files, run the test and write every output into
/// `save_dir` (created when missing)
pub fn run_pipeline(
    cond1_path: &Path,
    cond2_path: &Path,
    save_dir: &Path,
    config: &ClusterTestConfig,
) -> Result<PipelineReport> {
    config.validate()?;

    tracing::info!("Loading {} from {}", config.cond1_name, cond1_path.display());
    let (cond1, affine) = nifti_io::load_condition(cond1_path)?;
    tracing::info!("Loading {} from {}", config.cond2_name, cond2_path.display());
    let (cond2, affine2) = nifti_io::load_condition(cond2_path)?;

    if !affines_match(&affine, &affine2) {
        tracing::warn!(
            "Affines of {} and {} differ; outputs use the first",
            cond1_path.display(),
            cond2_path.display()
        );
    }

    let data = PairedDataset::from_conditions(cond1, &cond2, affine)?;
    let shape = data.shape();
    tracing::info!(
        "{} subjects, {} timepoints, {}x{}x{} voxels",
        data.n_subjects(),
        shape.n_times,
        shape.nx,
        shape.ny,
        shape.nz
    );

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().next_u64());
    tracing::info!("Sign-flip seed: {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    // The summary records the seed actually used, drawn or given
    let config = ClusterTestConfig {
        seed: Some(seed),
        ..config.clone()
    };
    let analysis = analyze(&data, &config, &mut rng)?;

    std::fs::create_dir_all(save_dir)?;
    let paths = OutputPaths::new(save_dir, &config);
    write_outputs(&paths, &analysis, data.affine())?;

    tracing::info!(
        "{} of {} clusters significant; results in {}",
        analysis.outcome.n_significant(),
        analysis.outcome.clusters.len(),
        save_dir.display()
    );

    Ok(PipelineReport {
        analysis,
        paths,
        seed,
    })
}

fn write_outputs(paths: &OutputPaths, analysis: &Analysis, affine: &Affine) -> Result<()> {
    let volumes = &analysis.volumes;
    nifti_io::save_array(&paths.tstat, &volumes.tstat, affine)?;
    nifti_io::save_array(&paths.clusters, &volumes.clusters, affine)?;
    nifti_io::save_array(&paths.contrast_average, &volumes.contrast_mean, affine)?;
    std::fs::write(&paths.summary, analysis.summary.to_json()?)?;
    Ok(())
}

fn affines_match(a: &Affine, b: &Affine) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= 1e-6 * x.abs().max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nifti_io::IDENTITY_AFFINE;
    use ndarray::Array5;
    use tempfile::TempDir;

    fn small_config() -> ClusterTestConfig {
        ClusterTestConfig {
            cond1_name: "a".to_string(),
            cond2_name: "b".to_string(),
            n_permutations: 20,
            seed: Some(4),
            ..ClusterTestConfig::default()
        }
    }

    fn write_conditions(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let cond1 = Array5::from_shape_fn((4, 2, 3, 2, 2), |(k, _, x, _, _)| {
            if x == 0 {
                3.0 + k as f64 * 0.25
            } else {
                (k % 2) as f64
            }
        });
        let cond2 = Array5::<f64>::zeros((4, 2, 3, 2, 2));
        let p1 = dir.join("c1.nii.gz");
        let p2 = dir.join("c2.nii.gz");
        nifti_io::save_array(&p1, &cond1, &IDENTITY_AFFINE).unwrap();
        nifti_io::save_array(&p2, &cond2, &IDENTITY_AFFINE).unwrap();
        (p1, p2)
    }

    #[test]
    fn test_analyze_in_memory() {
        let contrasts = Array5::from_shape_fn((5, 1, 2, 2, 2), |(k, _, _, _, _)| 1.0 + k as f64);
        let data = PairedDataset::from_contrasts(contrasts, IDENTITY_AFFINE).unwrap();
        let analysis = analyze(&data, &small_config(), &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(analysis.outcome.clusters.len(), 1);
        assert_eq!(analysis.volumes.tstat.dim(), (2, 2, 2, 1));
        assert_eq!(analysis.volumes.contrast_mean[[0, 0, 0, 0]], 3.0);
        assert_eq!(analysis.summary.n_subjects, 5);
    }

    #[test]
    fn test_run_pipeline_writes_outputs() {
        let dir = TempDir::new().unwrap();
        let (p1, p2) = write_conditions(dir.path());
        let out = dir.path().join("results");

        let report = run_pipeline(&p1, &p2, &out, &small_config()).unwrap();

        assert_eq!(report.seed, 4);
        assert!(report.paths.tstat.exists());
        assert!(report.paths.clusters.exists());
        assert!(report.paths.contrast_average.exists());
        assert!(report.paths.summary.exists());

        let tstat = nifti_io::load_volume(&report.paths.tstat).unwrap();
        assert_eq!(tstat.data.shape(), &[3, 2, 2, 2]);
    }

    #[test]
    fn test_run_pipeline_rejects_mismatched_conditions() {
        let dir = TempDir::new().unwrap();
        let (p1, _) = write_conditions(dir.path());
        let p2 = dir.path().join("other.nii.gz");
        nifti_io::save_array(&p2, &Array5::<f64>::zeros((4, 2, 3, 3, 2)), &IDENTITY_AFFINE)
            .unwrap();

        let err = run_pipeline(&p1, &p2, dir.path(), &small_config()).unwrap_err();
        assert!(matches!(err, crate::error::ClusterTestError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_drawn_seed_recorded_in_summary() {
        let dir = TempDir::new().unwrap();
        let (p1, p2) = write_conditions(dir.path());
        let config = ClusterTestConfig {
            seed: None,
            ..small_config()
        };

        let report = run_pipeline(&p1, &p2, &dir.path().join("out"), &config).unwrap();
        assert_eq!(report.analysis.summary.config.seed, Some(report.seed));
    }

    #[test]
    fn test_affines_match_tolerance() {
        let mut other = IDENTITY_AFFINE;
        assert!(affines_match(&IDENTITY_AFFINE, &other));
        other[3] = 2.0;
        assert!(!affines_match(&IDENTITY_AFFINE, &other));
    }
}
