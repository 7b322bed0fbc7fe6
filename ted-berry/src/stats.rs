//! 统计量: 信息变差 (VOI), RAND 指数, 检测重合率.
//!
//! VOI 和 RAND 都只依赖重叠表, 复杂度与不同标签对的个数成正比,
//! 不需要枚举体素对.

use crate::classify::ErrorSets;
use crate::consts::is_foreground;
use crate::error::ShapeError;
use crate::overlap::OverlapTable;
use crate::params::Parameters;
use crate::LabelVolume;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 信息变差, 单位为比特.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Voi {
    /// 分裂部分, 即 `H(候选 | 真值)`.
    pub split: f64,
    /// 合并部分, 即 `H(真值 | 候选)`.
    pub merge: f64,
}

impl Voi {
    /// 二者之和.
    #[inline]
    pub fn total(&self) -> f64 {
        self.split + self.merge
    }
}

/// 由重叠表计算 VOI. 空表返回 0.
pub fn variation_of_information(table: &OverlapTable) -> Voi {
    let n = table.total() as f64;
    if table.is_empty() {
        return Voi::default();
    }
    let mut voi = Voi::default();
    for (g, c, nij) in table.iter() {
        let p = nij as f64 / n;
        let nij = nij as f64;
        voi.split -= p * (nij / table.gt_total(g) as f64).log2();
        voi.merge -= p * (nij / table.cand_total(c) as f64).log2();
    }
    // 消除 `-0.0` 以及舍入误差导致的微小负数.
    voi.split = voi.split.max(0.0);
    voi.merge = voi.merge.max(0.0);
    voi
}

/// `C(x, 2)`.
#[inline]
fn pairs(x: u64) -> u128 {
    let x = x as u128;
    x * x.saturating_sub(1) / 2
}

/// 由重叠表计算 RAND 指数, 即两个划分对任意体素对 "是否同属一个区域" 判断一致的比例.
///
/// 体素个数少于 2 时返回 1.
pub fn rand_index(table: &OverlapTable) -> f64 {
    let total = pairs(table.total());
    if total == 0 {
        return 1.0;
    }
    let joint: u128 = table.iter().map(|(_, _, n)| pairs(n)).sum();
    let gt: u128 = table.gt_totals().map(|(_, n)| pairs(n)).sum();
    let cand: u128 = table.cand_totals().map(|(_, n)| pairs(n)).sum();
    // 同-同 加上 异-异.
    let agreements = total + 2 * joint - gt - cand;
    agreements as f64 / total as f64
}

/// 检测重合率: 未被判定为假阴性的真值区域所占比例.
///
/// 分母为非背景真值标签个数, 背景永远不会是假阴性. 分母为 0 时返回 1.
pub fn detection_overlap(errors: &ErrorSets, table: &OverlapTable) -> f64 {
    let n = table.gt_labels().filter(|&g| is_foreground(g)).count();
    if n == 0 {
        return 1.0;
    }
    1.0 - errors.num_false_negatives() as f64 / n as f64
}

/// 在每个水平切片内, 将背景填充为最近的前景标签. 全背景的切片保持不变.
///
/// 各切片互相独立, 打开 `rayon` 时并行处理.
pub fn grow_slices(volume: &LabelVolume) -> LabelVolume {
    volume.map_slices(|mut s| {
        s.grow_foreground();
    })
}

/// 一次评估得到的统计量. 未开启的统计量为 `None`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistics {
    /// 信息变差.
    pub voi: Option<Voi>,
    /// RAND 指数.
    pub rand: Option<f64>,
    /// 检测重合率.
    pub detection_overlap: Option<f64>,
}

/// 按照评估参数计算统计量.
#[derive(Copy, Clone, Debug)]
pub struct StatisticsEngine<'a> {
    params: &'a Parameters,
}

impl<'a> StatisticsEngine<'a> {
    /// 创建.
    #[inline]
    pub fn new(params: &'a Parameters) -> Self {
        Self { params }
    }

    /// 计算 VOI 和 RAND (若开启).
    ///
    /// `cand` 为统计所用的候选标签体 (修正前或修正后); 开启 `grow_slices`
    /// 时先对其副本做逐切片背景填充. 开启 `ignore_background` 时丢弃
    /// 真值为背景的体素.
    pub fn partition_stats(
        &self,
        gt: &LabelVolume,
        cand: &LabelVolume,
        stats: &mut Statistics,
    ) -> Result<(), ShapeError> {
        if !self.params.needs_partition_stats() {
            return Ok(());
        }
        let table = if self.params.grow_slices {
            let grown = grow_slices(cand);
            OverlapTable::build(gt, &grown)?
        } else {
            OverlapTable::build(gt, cand)?
        };
        let table = if self.params.ignore_background {
            table.filter_gt(is_foreground)
        } else {
            table
        };

        if self.params.compute_voi {
            let voi = variation_of_information(&table);
            log::debug!("voi split {:.6}, merge {:.6}", voi.split, voi.merge);
            stats.voi = Some(voi);
        }
        if self.params.compute_rand {
            let rand = rand_index(&table);
            log::debug!("rand index {rand:.6}");
            stats.rand = Some(rand);
        }
        Ok(())
    }

    /// 计算检测重合率 (若开启). `table` 为修正后的重叠表.
    pub fn detection_stats(
        &self,
        errors: &ErrorSets,
        table: &OverlapTable,
        stats: &mut Statistics,
    ) {
        if self.params.compute_detection_overlap {
            stats.detection_overlap = Some(detection_overlap(errors, table));
        }
    }
}
