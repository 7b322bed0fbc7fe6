//! 程序运行函数.

use std::io;
use std::path::PathBuf;

use ted_berry::prelude::*;
use thiserror::Error;
use utils::loader::{self, LoadError, VolumeSource};

use crate::{result, Cli};

/// 运行错误.
#[derive(Debug, Error)]
pub enum RunError {
    /// 读写标签体错误.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// 评估错误.
    #[error(transparent)]
    Ted(#[from] TedError),

    /// 写报告文件错误.
    #[error("cannot write report: {0}")]
    Io(#[from] io::Error),
}

impl From<ConfigError> for RunError {
    #[inline]
    fn from(e: ConfigError) -> Self {
        Self::Ted(e.into())
    }
}

impl From<NoSuchOutput> for RunError {
    #[inline]
    fn from(e: NoSuchOutput) -> Self {
        Self::Ted(e.into())
    }
}

/// 实际运行.
pub fn run(cli: &Cli) -> Result<(), RunError> {
    let params = cli.parameters();
    params.validate()?;

    if params.header_only {
        // `--plot-file-header` 依赖 `--plot-file`, 由 clap 保证.
        if let Some(path) = &cli.plot_file {
            result::append_line(path, &ErrorReport::header(&params))?;
        }
        return Ok(());
    }

    let gt_path = match &cli.ground_truth {
        Some(s) => s.clone(),
        None => loader::ground_truth_from_env_or_home()?,
    };
    let rec_path = match &cli.reconstruction {
        Some(s) => s.clone(),
        None => loader::reconstruction_from_env_or_home()?,
    };
    let resolution = cli.resolution()?;
    let mut gt = loader::read_volume(&gt_path, resolution)?;
    let rec = loader::read_volume(&rec_path, resolution)?;

    if cli.extract_ground_truth_labels {
        log::debug!("extracting ground truth labels from connected components");
        gt = extract_ground_truth_labels(&gt);
        if let Some(path) = &cli.export_ground_truth {
            loader::write_volume_npy(&gt, path)?;
        }
    }

    let eval = ted_berry::evaluate(&gt, &rec, &params)?;
    let report = &eval.report;

    let stem = VolumeSource::parse(&rec_path)?.stem();
    let root = cli.ted_error_files.clone().unwrap_or_else(PathBuf::new);
    match report.corrected() {
        Ok(corrected) => {
            if !root.as_os_str().is_empty() {
                std::fs::create_dir_all(&root)?;
            }
            loader::write_volume_npy(corrected, root.join(format!("corrected_{stem}.npy")))?;
        }
        Err(e) => log::debug!("{e}"),
    }

    utils::sep();
    println!("{}", report.human_readable()?);
    utils::sep();

    if let Some(dir) = &cli.ted_error_files {
        match report.errors() {
            Ok(errors) => result::write_error_files(dir, &stem, errors)?,
            Err(e) => log::warn!("{e}"),
        }
    }

    if let Some(path) = &cli.plot_file {
        result::append_line(path, &report.single_line()?)?;
    }
    Ok(())
}
