//! 容错编辑距离评估程序.

mod result;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use ted_berry::consts::DEFAULT_MIN_OVERLAP_VOXELS;
use ted_berry::prelude::*;

/// 统计量使用的候选标签体.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatsOn {
    /// 原始候选.
    Uncorrected,
    /// 容差修正后的候选.
    Corrected,
}

#[derive(Debug, Parser)]
#[command(
    name = "ted",
    version,
    about = "Score a 3D reconstruction against a ground truth with the tolerant edit distance"
)]
pub struct Cli {
    /// Ground truth volume (`file.nii[.gz]`, `file.npy` or `archive.npz:dataset`).
    /// Defaults to $TED_GROUND_TRUTH, then $HOME/dataset/ted/groundtruth.npy
    #[arg(long)]
    pub ground_truth: Option<String>,

    /// Reconstruction volume, same formats as the ground truth.
    /// Defaults to $TED_RECONSTRUCTION, then $HOME/dataset/ted/reconstruction.npy
    #[arg(long)]
    pub reconstruction: Option<String>,

    /// The ground truth is a foreground/background labelling: zero is the
    /// dark background, any nonzero value is bright foreground. Each 3D
    /// 6-connected foreground component (face neighbours across slices too)
    /// becomes one region
    #[arg(long)]
    pub extract_ground_truth_labels: bool,

    /// With --extract-ground-truth-labels, write the labelled ground truth
    /// to this npy file
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "groundtruth.npy")]
    pub export_ground_truth: Option<PathBuf>,

    /// Append a tab-separated single-line report to this file
    #[arg(long, value_name = "FILE")]
    pub plot_file: Option<PathBuf>,

    /// Only append the single-line column header to the plot file
    #[arg(long, requires = "plot_file")]
    pub plot_file_header: bool,

    /// Folder for `<name>.splits.data`, `<name>.merges.data` and, with a
    /// background label, `<name>.fps.data` and `<name>.fns.data`
    #[arg(long, value_name = "DIR")]
    pub ted_error_files: Option<PathBuf>,

    /// Compute the variation of information
    #[arg(long)]
    pub report_voi: bool,

    /// Compute the RAND index
    #[arg(long)]
    pub report_rand: bool,

    /// Compute the detection overlap
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub report_detection_overlap: bool,

    /// Compute the tolerant edit distance
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub report_ted: bool,

    /// Ignore ground truth background for VOI, RAND and the error sets
    #[arg(long)]
    pub ignore_background: bool,

    /// Grow reconstruction slices until no background is left (VOI and RAND only)
    #[arg(long)]
    pub grow_slices: bool,

    /// Physical tolerance radius for boundary disagreement
    #[arg(long, default_value_t = 0.0)]
    pub tolerance: f64,

    /// Minimum overlap in voxels for a pair to count as significant
    #[arg(long, default_value_t = DEFAULT_MIN_OVERLAP_VOXELS)]
    pub min_overlap: u64,

    /// Voxel resolution `z,height,width`, overrides the file's own
    #[arg(long, value_delimiter = ',', num_args = 3, value_name = "Z,H,W")]
    pub resolution: Option<Vec<f64>>,

    /// Volume used for VOI and RAND
    #[arg(long, value_enum, default_value_t = StatsOn::Uncorrected)]
    pub stats_on: StatsOn,

    /// Worker threads, defaults to the number of available cores
    #[arg(long)]
    pub threads: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 评估参数.
    pub fn parameters(&self) -> Parameters {
        Parameters {
            tolerance_radius: self.tolerance,
            min_overlap_voxels: self.min_overlap,
            ignore_background: self.ignore_background,
            grow_slices: self.grow_slices,
            compute_voi: self.report_voi,
            compute_rand: self.report_rand,
            compute_detection_overlap: self.report_detection_overlap,
            compute_ted: self.report_ted,
            header_only: self.plot_file_header,
            stats_source: match self.stats_on {
                StatsOn::Uncorrected => StatsSource::Uncorrected,
                StatsOn::Corrected => StatsSource::Corrected,
            },
        }
    }

    /// 命令行给出的体素分辨率.
    pub fn resolution(&self) -> Result<Option<Resolution>, ConfigError> {
        match self.resolution.as_deref() {
            Some(&[z, h, w]) => Resolution::new(z, h, w).map(Some),
            Some(other) => Err(ConfigError::InvalidResolution([
                other.first().copied().unwrap_or(f64::NAN),
                other.get(1).copied().unwrap_or(f64::NAN),
                other.get(2).copied().unwrap_or(f64::NAN),
            ])),
            None => Ok(None),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("cannot install logger: {e}");
    }

    let threads = cli.threads.unwrap_or_else(utils::cpus);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        log::warn!("cannot configure thread pool: {e}");
    }

    match runner::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["ted"]);
        let params = cli.parameters();
        assert_eq!(params, Parameters::default());
        assert_eq!(cli.resolution().unwrap(), None);
        assert!(cli.export_ground_truth.is_none());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from([
            "ted",
            "--report-ted",
            "false",
            "--report-voi",
            "--tolerance",
            "2.5",
            "--min-overlap",
            "50",
            "--resolution",
            "4,1,1",
            "--stats-on",
            "corrected",
            "--export-ground-truth",
        ]);
        let params = cli.parameters();
        assert!(!params.compute_ted);
        assert!(params.compute_voi);
        assert!(params.compute_detection_overlap);
        assert_eq!(params.tolerance_radius, 2.5);
        assert_eq!(params.min_overlap_voxels, 50);
        assert_eq!(params.stats_source, StatsSource::Corrected);
        assert_eq!(
            cli.resolution().unwrap(),
            Some(Resolution::new(4.0, 1.0, 1.0).unwrap())
        );
        assert_eq!(cli.export_ground_truth, Some(PathBuf::from("groundtruth.npy")));
    }

    #[test]
    fn test_header_requires_plot_file() {
        assert!(Cli::try_parse_from(["ted", "--plot-file-header"]).is_err());
        let cli =
            Cli::try_parse_from(["ted", "--plot-file-header", "--plot-file", "p.tsv"]).unwrap();
        assert!(cli.parameters().header_only);
    }

    #[test]
    fn test_extract_help_names_connectivity() {
        let cmd = Cli::command();
        let help = cmd
            .get_arguments()
            .find(|a| a.get_id() == "extract_ground_truth_labels")
            .and_then(|a| a.get_help())
            .map(|h| h.to_string())
            .unwrap();
        assert!(help.contains("6-connected"));
        assert!(help.contains("nonzero value is bright foreground"));
    }
}
