//! 稀疏重叠表 (列联表).
//!
//! 只记录实际出现过的 `(真值标签, 候选标签)` 对, 内存占用与不同标签对的个数
//! 成正比, 而不是与两侧标签数之积成正比.

use std::collections::{BTreeMap, HashMap};

use cfg_if::cfg_if;

use crate::error::{describe_pair, ShapeError};
use crate::{Label, LabelSlice, LabelVolume};

type PairCounts = HashMap<(Label, Label), u64>;

/// 对单个水平切片计数.
fn count_slice(gt: LabelSlice, cand: LabelSlice) -> PairCounts {
    let mut counts = PairCounts::with_capacity(16);
    for (&g, &c) in gt.iter().zip(cand.iter()) {
        *counts.entry((g, c)).or_insert(0) += 1;
    }
    counts
}

/// 合并两份部分计数. 满足交换律和结合律, 合并顺序不影响结果.
fn merge_counts(mut a: PairCounts, mut b: PairCounts) -> PairCounts {
    if a.len() < b.len() {
        std::mem::swap(&mut a, &mut b);
    }
    for (pair, n) in b {
        *a.entry(pair).or_insert(0) += n;
    }
    a
}

cfg_if! {
    if #[cfg(feature = "rayon")] {
        fn count_pairs(gt: &LabelVolume, cand: &LabelVolume) -> PairCounts {
            use rayon::prelude::*;
            (0..gt.len_z())
                .into_par_iter()
                .map(|z| count_slice(gt.slice_at(z), cand.slice_at(z)))
                .reduce(PairCounts::new, merge_counts)
        }
    } else {
        fn count_pairs(gt: &LabelVolume, cand: &LabelVolume) -> PairCounts {
            gt.slice_iter()
                .zip(cand.slice_iter())
                .map(|(g, c)| count_slice(g, c))
                .fold(PairCounts::new(), merge_counts)
        }
    }
}

/// 真值标签体与候选标签体之间的重叠表.
///
/// 构建后不可变, 只能查询. 所有迭代都按标签升序进行.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OverlapTable {
    /// `(g, c) -> 重叠体素个数`.
    by_gt: BTreeMap<(Label, Label), u64>,
    /// `(c, g) -> 重叠体素个数`, 即 `by_gt` 的转置.
    by_cand: BTreeMap<(Label, Label), u64>,
    gt_totals: BTreeMap<Label, u64>,
    cand_totals: BTreeMap<Label, u64>,
    total: u64,
}

impl OverlapTable {
    /// 一次遍历所有体素, 统计每个 `(真值, 候选)` 标签对的重叠体素个数.
    ///
    /// 两个标签体形状不同时返回 `ShapeError::Mismatch`.
    pub fn build(gt: &LabelVolume, cand: &LabelVolume) -> Result<Self, ShapeError> {
        gt.same_shape(cand, "overlap table")?;
        let table = Self::from_counts(count_pairs(gt, cand));
        log::debug!(
            "overlap table: {} voxels, {} pairs, {} gt labels, {} candidate labels",
            table.total,
            table.len(),
            table.gt_totals.len(),
            table.cand_totals.len()
        );
        debug_assert_eq!(table.total, gt.size() as u64);
        Ok(table)
    }

    /// 由 `(真值, 候选, 个数)` 三元组直接创建重叠表. 个数为 0 的项被丢弃,
    /// 重复出现的标签对会被累加.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Label, Label, u64)>) -> Self {
        let mut counts = PairCounts::new();
        for (g, c, n) in pairs {
            *counts.entry((g, c)).or_insert(0) += n;
        }
        Self::from_counts(counts)
    }

    fn from_counts(counts: PairCounts) -> Self {
        let mut table = Self::default();
        for ((g, c), n) in counts.into_iter().filter(|(_, n)| *n > 0) {
            table.by_gt.insert((g, c), n);
            table.by_cand.insert((c, g), n);
            *table.gt_totals.entry(g).or_insert(0) += n;
            *table.cand_totals.entry(c).or_insert(0) += n;
            table.total += n;
        }
        table
    }

    /// `(g, c)` 的重叠体素个数. 未出现过的标签对为 0.
    #[inline]
    pub fn overlap(&self, g: Label, c: Label) -> u64 {
        self.by_gt.get(&(g, c)).copied().unwrap_or(0)
    }

    /// 真值标签 `g` 的体素总数.
    #[inline]
    pub fn gt_total(&self, g: Label) -> u64 {
        self.gt_totals.get(&g).copied().unwrap_or(0)
    }

    /// 候选标签 `c` 的体素总数.
    #[inline]
    pub fn cand_total(&self, c: Label) -> u64 {
        self.cand_totals.get(&c).copied().unwrap_or(0)
    }

    /// 体素总数.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// 不同标签对的个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_gt.len()
    }

    /// 重叠表是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_gt.is_empty()
    }

    /// 升序迭代所有出现过的真值标签.
    #[inline]
    pub fn gt_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.gt_totals.keys().copied()
    }

    /// 升序迭代所有出现过的候选标签.
    #[inline]
    pub fn cand_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.cand_totals.keys().copied()
    }

    /// 升序迭代所有 `(真值标签, 体素总数)`.
    #[inline]
    pub fn gt_totals(&self) -> impl Iterator<Item = (Label, u64)> + '_ {
        self.gt_totals.iter().map(|(&l, &n)| (l, n))
    }

    /// 升序迭代所有 `(候选标签, 体素总数)`.
    #[inline]
    pub fn cand_totals(&self) -> impl Iterator<Item = (Label, u64)> + '_ {
        self.cand_totals.iter().map(|(&l, &n)| (l, n))
    }

    /// 与真值标签 `g` 重叠的所有 `(候选标签, 个数)`, 按候选标签升序.
    pub fn gt_partners(&self, g: Label) -> impl Iterator<Item = (Label, u64)> + '_ {
        self.by_gt
            .range((g, Label::MIN)..=(g, Label::MAX))
            .map(|(&(_, c), &n)| (c, n))
    }

    /// 与候选标签 `c` 重叠的所有 `(真值标签, 个数)`, 按真值标签升序.
    pub fn cand_partners(&self, c: Label) -> impl Iterator<Item = (Label, u64)> + '_ {
        self.by_cand
            .range((c, Label::MIN)..=(c, Label::MAX))
            .map(|(&(_, g), &n)| (g, n))
    }

    /// 与真值标签 `g` 重叠最多的候选标签. 重叠相同时取较小的标签.
    ///
    /// `g` 未出现过时返回 `None`.
    pub fn best_cand_for(&self, g: Label) -> Option<Label> {
        // 重叠相同时标签越小越 "大".
        self.gt_partners(g)
            .max_by(|(c0, n0), (c1, n1)| n0.cmp(n1).then(c1.cmp(c0)))
            .map(|(c, _)| c)
    }

    /// 按 `(g, c)` 升序迭代所有 `(真值, 候选, 个数)`.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Label, Label, u64)> + '_ {
        self.by_gt.iter().map(|(&(g, c), &n)| (g, c, n))
    }

    /// 只保留真值标签满足 `pred` 的标签对, 得到新的重叠表.
    pub fn filter_gt(&self, mut pred: impl FnMut(Label) -> bool) -> Self {
        Self::from_pairs(self.iter().filter(|(g, _, _)| pred(*g)))
    }

    /// 检查边缘和不变式: 每一行 / 每一列之和等于对应标签的总数,
    /// 且所有计数之和等于体素总数.
    ///
    /// # Panics
    ///
    /// 不变式被破坏时 panic. 这只可能由 bug 导致.
    pub fn check_invariants(&self) {
        let mut gt_sums: BTreeMap<Label, u64> = BTreeMap::new();
        let mut cand_sums: BTreeMap<Label, u64> = BTreeMap::new();
        let mut total = 0u64;
        for (g, c, n) in self.iter() {
            assert!(n > 0, "empty entry {} in overlap table", describe_pair((g, c)));
            assert_eq!(
                self.by_cand.get(&(c, g)),
                Some(&n),
                "transposed entry {} out of sync",
                describe_pair((g, c))
            );
            *gt_sums.entry(g).or_insert(0) += n;
            *cand_sums.entry(c).or_insert(0) += n;
            total += n;
        }
        assert_eq!(self.by_gt.len(), self.by_cand.len());
        assert_eq!(gt_sums, self.gt_totals, "ground truth marginal sums mismatch");
        assert_eq!(cand_sums, self.cand_totals, "candidate marginal sums mismatch");
        assert_eq!(total, self.total, "overlap table total mismatch");
    }
}
