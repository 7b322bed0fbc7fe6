//! 评估参数.

use crate::consts::DEFAULT_MIN_OVERLAP_VOXELS;
use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 计算 VOI / RAND / 检测重合率时使用哪一份候选标签体.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StatsSource {
    /// 原始 (未经容差修正的) 候选标签体.
    #[default]
    Uncorrected,

    /// 容差修正后的候选标签体.
    Corrected,
}

/// 一次评估的全部配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Parameters {
    /// 容差半径, 物理单位 (与 [`crate::Resolution`] 一致). 为 0 时不做任何修正.
    pub tolerance_radius: f64,

    /// 显著重叠门限. 重叠体素个数小于该值的标签对被视为噪声.
    pub min_overlap_voxels: u64,

    /// 是否在分裂 / 合并判定以及 VOI / RAND 中排除背景标签 `0`.
    pub ignore_background: bool,

    /// 计算统计量前, 是否先在每个水平切片内将背景填充为最近的前景标签.
    pub grow_slices: bool,

    /// 是否计算 VOI.
    pub compute_voi: bool,

    /// 是否计算 RAND 指数.
    pub compute_rand: bool,

    /// 是否计算检测重合率.
    pub compute_detection_overlap: bool,

    /// 是否计算容错编辑距离 (修正 + 分类).
    pub compute_ted: bool,

    /// 只需要报告列标题, 不提供标签体.
    pub header_only: bool,

    /// 统计量所使用的候选标签体.
    pub stats_source: StatsSource,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            tolerance_radius: 0.0,
            min_overlap_voxels: DEFAULT_MIN_OVERLAP_VOXELS,
            ignore_background: false,
            grow_slices: false,
            compute_voi: false,
            compute_rand: false,
            compute_detection_overlap: true,
            compute_ted: true,
            header_only: false,
            stats_source: StatsSource::Uncorrected,
        }
    }
}

impl Parameters {
    /// 检查参数是否合法.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance_radius.is_finite() || self.tolerance_radius < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance_radius));
        }
        if self.min_overlap_voxels == 0 {
            return Err(ConfigError::InvalidMinOverlap(self.min_overlap_voxels));
        }
        Ok(())
    }

    /// 检测重合率依赖假阴性集合, 因此需要运行分类器.
    #[inline]
    pub(crate) fn needs_classification(&self) -> bool {
        self.compute_ted || self.compute_detection_overlap
    }

    /// 是否需要计算 VOI 或 RAND.
    #[inline]
    pub(crate) fn needs_partition_stats(&self) -> bool {
        self.compute_voi || self.compute_rand
    }
}
