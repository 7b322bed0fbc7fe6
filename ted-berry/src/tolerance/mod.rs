//! 容差修正.
//!
//! 对候选标签体实施以真值为引导的有界膨胀: 每个真值区域从与其匹配的候选体素
//! 出发, 认领容差带内与其不一致的体素. 所有区域同时生长, 距离最近的认领优先,
//! 距离相同时真值标签较小者优先. 每一环在提交完毕后才扩展下一环.
//!
//! 一次认领只有在以下两个条件都满足时才合法:
//!
//! 1. 被认领的体素不是其原候选区域的局部桥接点: 在 3x3x3 邻域内,
//!   原候选区域剩余的体素仍然 6-连通.
//! 2. 不会引入未修正重叠表中不存在的 `(真值, 候选)` 标签对.
//!
//! 若一遍认领中有非法认领被跳过, 则在下一遍中重试, 直到某一遍没有任何提交.

use std::collections::BTreeMap;

use crate::error::{ConfigError, ShapeError};
use crate::neighbour::{block_index, is_block_connected, offset, OFFSETS_26};
use crate::overlap::OverlapTable;
use crate::{Idx3d, Label, LabelVolume};

mod band;
mod frontier;

use band::ToleranceBand;
use frontier::ClaimFrontier;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 封装了所有被重新赋值的 (索引, 原标签, 新标签), 按提交顺序排列.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reassigned {
    // 使用 `Vec<(Idx3d, Label, Label)>` 会导致 padding, 故分离存储.
    positions: Vec<Idx3d>,
    labels: Vec<(Label, Label)>,
}

impl Reassigned {
    /// 获得元素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// 判断是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 获得第 `index` 个分量 `(位置, 原标签, 新标签)`.
    #[inline]
    pub fn at(&self, index: usize) -> (Idx3d, Label, Label) {
        let (old, new) = self.labels[index];
        (self.positions[index], old, new)
    }

    /// 获取能迭代全部修改的迭代器.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Idx3d, Label, Label)> + '_ {
        self.positions
            .iter()
            .zip(self.labels.iter())
            .map(|(&p, &(old, new))| (p, old, new))
    }

    /// 所有被修改的位置.
    #[inline]
    pub fn positions(&self) -> &[Idx3d] {
        &self.positions
    }

    #[inline]
    fn push(&mut self, pos: Idx3d, old: Label, new: Label) {
        self.positions.push(pos);
        self.labels.push((old, new));
    }
}

/// 容差修正的结果.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionResult {
    /// 修正后的候选标签体.
    pub corrected: LabelVolume,
    /// 修改记录.
    pub reassigned: Reassigned,
    /// 容差带内仍与真值不一致、且无法合法修正的体素个数.
    pub unresolved: usize,
    /// 实际执行的认领遍数 (包含最后一遍没有提交的).
    pub passes: usize,
}

impl CorrectionResult {
    /// 未做任何修改的结果.
    fn identity(cand: &LabelVolume) -> Self {
        Self {
            corrected: cand.clone(),
            reassigned: Reassigned::default(),
            unresolved: 0,
            passes: 0,
        }
    }
}

/// 容差修正器.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ToleranceCorrector {
    radius: f64,
}

impl ToleranceCorrector {
    /// 以物理容差半径 `radius` 创建修正器. 半径必须有限且非负.
    pub fn new(radius: f64) -> Result<Self, ConfigError> {
        if radius.is_finite() && radius >= 0.0 {
            Ok(Self { radius })
        } else {
            Err(ConfigError::InvalidTolerance(radius))
        }
    }

    /// 容差半径.
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// 修正 `cand`, 使其在容差范围内与 `gt` 对齐. 输入不会被修改.
    pub fn correct(
        &self,
        gt: &LabelVolume,
        cand: &LabelVolume,
    ) -> Result<CorrectionResult, ShapeError> {
        let table = OverlapTable::build(gt, cand)?;
        self.correct_with_table(gt, cand, &table)
    }

    /// 同 [`ToleranceCorrector::correct`], 但复用已经构建好的未修正重叠表.
    ///
    /// `table` 必须由 `gt` 和 `cand` 构建, 否则结果没有意义.
    pub fn correct_with_table(
        &self,
        gt: &LabelVolume,
        cand: &LabelVolume,
        table: &OverlapTable,
    ) -> Result<CorrectionResult, ShapeError> {
        gt.same_shape(cand, "tolerance correction")?;
        if self.radius == 0.0 {
            return Ok(CorrectionResult::identity(cand));
        }

        let band = ToleranceBand::compute(gt, self.radius);
        log::debug!("tolerance band: {} voxels (radius {})", band.len(), self.radius);
        if band.len() == 0 {
            return Ok(CorrectionResult::identity(cand));
        }

        let matched: BTreeMap<Label, Label> = table
            .gt_labels()
            .filter_map(|g| table.best_cand_for(g).map(|c| (g, c)))
            .collect();

        let mut claims = Claims {
            gt,
            band: &band,
            table,
            target: gt.iter().map(|g| matched[g]).collect(),
            labels: cand.as_slice().to_vec(),
            open: Vec::new(),
            radius: self.radius,
            reassigned: Reassigned::default(),
        };

        claims.open = band.indices().filter(|i| claims.is_open(*i)).collect();
        let mut frontier = ClaimFrontier::new(claims.labels.len());
        let mut passes = 0usize;
        loop {
            passes += 1;
            let committed = claims.run_pass(&mut frontier);
            log::debug!("tolerance pass {passes}: {committed} voxels reassigned");
            if committed == 0 {
                break;
            }
        }

        let unresolved = claims.unresolved();
        let Claims {
            labels, reassigned, ..
        } = claims;
        log::debug!(
            "tolerance correction: {} reassigned, {} unresolved, {} passes",
            reassigned.len(),
            unresolved,
            passes
        );
        Ok(CorrectionResult {
            corrected: cand.with_same_geometry(labels),
            reassigned,
            unresolved,
            passes,
        })
    }
}

/// 一次修正过程中的可变状态. 所有体素数组都以线性下标寻址.
struct Claims<'a> {
    gt: &'a LabelVolume,
    band: &'a ToleranceBand,
    table: &'a OverlapTable,
    /// 每个体素的目标标签, 即其真值标签所匹配的候选标签.
    target: Vec<Label>,
    /// 当前的候选标签.
    labels: Vec<Label>,
    /// 上一遍结束时仍与目标不一致的带内体素, 升序.
    open: Vec<usize>,
    radius: f64,
    reassigned: Reassigned,
}

impl Claims<'_> {
    /// 体素是否位于带内且与目标不一致?
    #[inline]
    fn is_open(&self, index: usize) -> bool {
        self.band.contains(index) && self.labels[index] != self.target[index]
    }

    /// 执行一遍认领, 返回提交的个数.
    fn run_pass(&mut self, frontier: &mut ClaimFrontier) -> usize {
        let res = self.gt.resolution();
        frontier.reset();
        self.open.retain(|&i| self.labels[i] != self.target[i]);

        // 第 0 环: 与一致体素相邻的不一致体素.
        for &index in self.open.iter() {
            let pos = self.gt.position(index);
            let g = self.gt[pos];
            let seed = self
                .gt
                .diamond_neighbours(pos)
                .filter(|(n, _)| {
                    let ni = self.gt.linear_index(*n);
                    self.gt[*n] == g && self.labels[ni] == self.target[ni]
                })
                .map(|(_, axis)| res.step(axis))
                .min_by(f64::total_cmp);
            if let Some(d) = seed.filter(|d| *d <= self.radius) {
                frontier.push(d, g, index);
            }
        }

        let mut committed = 0usize;
        while !frontier.is_empty() {
            let ring = frontier.take_ring();
            let mut claimed = Vec::with_capacity(ring.len());
            for claim in ring {
                if self.is_open(claim.index) && self.try_commit(claim.index) {
                    claimed.push(claim);
                }
            }
            committed += claimed.len();

            // 只从本环成功提交的体素继续生长.
            for claim in claimed {
                let pos = self.gt.position(claim.index);
                for (n, axis) in self.gt.diamond_neighbours(pos) {
                    let ni = self.gt.linear_index(n);
                    let nd = claim.dist.into_inner() + res.step(axis);
                    if self.gt[n] == claim.gt && nd <= self.radius && self.is_open(ni) {
                        frontier.push(nd, claim.gt, ni);
                    }
                }
            }
        }
        committed
    }

    /// 检查认领是否合法, 合法时提交.
    fn try_commit(&mut self, index: usize) -> bool {
        let pos = self.gt.position(index);
        let old = self.labels[index];
        let new = self.target[index];
        if !self.keeps_connected(pos, old) {
            return false;
        }
        // 目标标签与真值标签的重叠在未修正的表中必然存在.
        debug_assert!(self.table.overlap(self.gt[pos], new) > 0);
        self.labels[index] = new;
        self.reassigned.push(pos, old, new);
        true
    }

    /// 移除 `pos` 后, 3x3x3 邻域内标签为 `old` 的体素是否仍然 6-连通?
    fn keeps_connected(&self, pos: Idx3d, old: Label) -> bool {
        let mut mask = [false; 27];
        for &d in OFFSETS_26.iter() {
            let Some(n) = offset(pos, d).filter(|n| self.gt.check(n)) else {
                continue;
            };
            mask[block_index(d)] = self.labels[self.gt.linear_index(n)] == old;
        }
        is_block_connected(&mask)
    }

    fn unresolved(&self) -> usize {
        self.open.iter().filter(|i| self.is_open(**i)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cube_volume, perturb, volume_from_fn, volume_from_slices};

    fn shifted_cube() -> (LabelVolume, LabelVolume) {
        let gt = cube_volume((12, 12, 12), 1, 11, 1);
        // 立方体顶面中心的一个体素被向外平移了一格.
        let cand = volume_from_fn((12, 12, 12), |p| match p {
            (10, 5, 5) => 0,
            (11, 5, 5) => 1,
            _ => gt[p],
        });
        (gt, cand)
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let (gt, cand) = shifted_cube();
        let r = ToleranceCorrector::new(0.0).unwrap().correct(&gt, &cand).unwrap();
        assert_eq!(r.corrected, cand);
        assert!(r.reassigned.is_empty());
        assert_eq!(r.unresolved, 0);
    }

    #[test]
    fn test_identical_volumes() {
        let gt = perturb(&cube_volume((8, 8, 8), 2, 6, 3), 0.2, 4, 7);
        for radius in [0.0, 1.0, 2.5, 10.0] {
            let r = ToleranceCorrector::new(radius).unwrap().correct(&gt, &gt).unwrap();
            assert!(r.reassigned.is_empty());
            assert_eq!(r.corrected, gt);
            assert_eq!(r.unresolved, 0);
        }
    }

    #[test]
    fn test_shifted_voxel_absorbed() {
        let (gt, cand) = shifted_cube();
        let r = ToleranceCorrector::new(1.0).unwrap().correct(&gt, &cand).unwrap();
        assert_eq!(r.corrected, gt);
        assert_eq!(r.reassigned.len(), 2);
        assert_eq!(r.unresolved, 0);
        let mut moved: Vec<_> = r.reassigned.iter().collect();
        moved.sort();
        assert_eq!(moved, vec![((10, 5, 5), 0, 1), ((11, 5, 5), 1, 0)]);
    }

    #[test]
    fn test_beyond_radius_untouched() {
        // 候选区域比真值宽 2 格, 容差 1 时无法从一致的体素到达.
        let gt = volume_from_fn((1, 1, 12), |(_, _, w)| if w < 6 { 1 } else { 2 });
        let cand = volume_from_fn((1, 1, 12), |(_, _, w)| if w < 8 { 1 } else { 2 });
        let r = ToleranceCorrector::new(1.0).unwrap().correct(&gt, &cand).unwrap();
        assert!(r.reassigned.is_empty());
        assert_eq!(r.unresolved, 1);

        let r = ToleranceCorrector::new(3.0).unwrap().correct(&gt, &cand).unwrap();
        assert_eq!(r.corrected, gt);
        assert_eq!(r.reassigned.len(), 2);
        // 先认领离一致区域最近的体素.
        assert_eq!(r.reassigned.at(0), ((0, 0, 7), 1, 2));
        assert_eq!(r.reassigned.at(1), ((0, 0, 6), 1, 2));
        assert_eq!(r.unresolved, 0);
    }

    #[test]
    fn test_bridge_is_kept() {
        // 候选标签 5 的左右两半只能通过 (1, 1) 和 (1, 3) 相连.
        #[rustfmt::skip]
        let gt = volume_from_slices(&[&[
            &[1, 1, 1, 1, 1],
            &[1, 1, 2, 1, 1],
            &[1, 1, 1, 1, 1],
        ]]);
        #[rustfmt::skip]
        let cand = volume_from_slices(&[&[
            &[7, 7, 7, 7, 7],
            &[5, 5, 5, 5, 5],
            &[7, 7, 7, 7, 7],
        ]]);
        let r = ToleranceCorrector::new(1.0).unwrap().correct(&gt, &cand).unwrap();
        assert!(r.reassigned.is_empty());
        assert_eq!(r.corrected, cand);
        assert_eq!(r.unresolved, 2);
    }

    #[test]
    fn test_idempotent() {
        for seed in 0..6 {
            let gt = volume_from_fn((6, 7, 8), |(z, h, w)| {
                ((z / 3) * 2 + (h + w) / 7) as Label + 1
            });
            let cand = perturb(&gt, 0.25, 5, seed);
            let corrector = ToleranceCorrector::new(2.0).unwrap();
            let first = corrector.correct(&gt, &cand).unwrap();
            let second = corrector.correct(&gt, &first.corrected).unwrap();
            assert!(second.reassigned.is_empty(), "seed {seed}");
            assert_eq!(second.corrected, first.corrected);
            assert_eq!(second.unresolved, first.unresolved);
        }
    }

    /// 每遍都重新分配认领结构并扫描整个带的修正, 作为增量实现的对照.
    fn correct_from_scratch(gt: &LabelVolume, cand: &LabelVolume, radius: f64) -> Vec<Label> {
        let table = OverlapTable::build(gt, cand).unwrap();
        let band = ToleranceBand::compute(gt, radius);
        let matched: BTreeMap<Label, Label> = table
            .gt_labels()
            .filter_map(|g| table.best_cand_for(g).map(|c| (g, c)))
            .collect();
        let mut claims = Claims {
            gt,
            band: &band,
            table: &table,
            target: gt.iter().map(|g| matched[g]).collect(),
            labels: cand.as_slice().to_vec(),
            open: Vec::new(),
            radius,
            reassigned: Reassigned::default(),
        };
        loop {
            claims.open = band.indices().filter(|i| claims.is_open(*i)).collect();
            let mut frontier = ClaimFrontier::new(claims.labels.len());
            if claims.run_pass(&mut frontier) == 0 {
                break;
            }
        }
        claims.labels
    }

    #[test]
    fn test_shared_frontier_matches_fresh_passes() {
        for seed in 0..8 {
            let gt = volume_from_fn((6, 7, 8), |(z, h, w)| ((z + 2 * h + w) / 5) as Label % 4);
            let cand = perturb(&gt, 0.35, 4, seed);
            for radius in [1.0, 2.0, 3.5] {
                let r = ToleranceCorrector::new(radius).unwrap().correct(&gt, &cand).unwrap();
                let expected = correct_from_scratch(&gt, &cand, radius);
                assert_eq!(r.corrected.as_slice(), &expected[..], "seed {seed}, radius {radius}");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let gt = volume_from_fn((5, 6, 7), |(z, h, w)| ((z + h + w) % 3) as Label);
        let cand = perturb(&gt, 0.3, 4, 42);
        let corrector = ToleranceCorrector::new(1.5).unwrap();
        let a = corrector.correct(&gt, &cand).unwrap();
        let b = corrector.correct(&gt, &cand).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_new_pairs() {
        let gt = volume_from_fn((6, 6, 6), |(z, h, _)| {
            if z < 3 {
                1
            } else if h < 3 {
                2
            } else {
                3
            }
        });
        let cand = perturb(&gt, 0.3, 6, 3);
        let before = OverlapTable::build(&gt, &cand).unwrap();
        let r = ToleranceCorrector::new(2.0).unwrap().correct(&gt, &cand).unwrap();
        let after = OverlapTable::build(&gt, &r.corrected).unwrap();
        for (g, c, _) in after.iter() {
            assert!(before.overlap(g, c) > 0);
        }
        after.check_invariants();
    }

    #[test]
    fn test_invalid_radius() {
        assert!(ToleranceCorrector::new(-0.5).is_err());
        assert!(ToleranceCorrector::new(f64::NAN).is_err());
    }
}
