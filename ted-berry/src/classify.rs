//! 错误分类: 匹配, 分裂, 合并, 假阳性, 假阴性.
//!
//! 记真值标签 `g` 的显著候选集合为 `C(g)`, 候选标签 `c` 的显著真值集合为 `G(c)`
//! (重叠体素个数不小于门限). 则:
//!
//! - `|C(g)| > 1`: `g` 被分裂为 `C(g)`;
//! - `|G(c)| > 1`: `c` 合并了 `G(c)`;
//! - `|C(g)| == 1` 且唯一的 `c` 满足 `|G(c)| == 1`: 匹配.
//!
//! 假阴性是只被候选背景显著覆盖的非背景真值标签, 假阳性与之对称.
//! 二者只在对侧确实存在背景标签时判定, 并且不参与任何分裂 / 合并 / 匹配.

use std::collections::{BTreeMap, BTreeSet};

use crate::consts::{is_background, is_foreground, BACKGROUND};
use crate::error::ConfigError;
use crate::overlap::OverlapTable;
use crate::params::Parameters;
use crate::Label;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 分类结果. 所有集合都有序, 因此输出是确定的.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorSets {
    /// 真值标签 -> 与之一一对应的候选标签.
    pub matches: BTreeMap<Label, Label>,
    /// 真值标签 -> 它被分裂成的候选标签集合.
    pub splits: BTreeMap<Label, BTreeSet<Label>>,
    /// 候选标签 -> 它合并的真值标签集合.
    pub merges: BTreeMap<Label, BTreeSet<Label>>,
    /// 假阳性候选标签.
    pub false_positives: BTreeSet<Label>,
    /// 假阴性真值标签.
    pub false_negatives: BTreeSet<Label>,
    /// 是否至少有一侧出现了背景标签, 即假阳性 / 假阴性是否被判定过.
    pub has_background: bool,
}

impl ErrorSets {
    /// 分裂错误个数. 一个真值标签被分成 `k` 份记为 `k - 1` 次.
    pub fn num_splits(&self) -> usize {
        self.splits.values().map(|s| s.len() - 1).sum()
    }

    /// 合并错误个数. 一个候选标签合并了 `k` 个真值标签记为 `k - 1` 次.
    pub fn num_merges(&self) -> usize {
        self.merges.values().map(|s| s.len() - 1).sum()
    }

    /// 假阳性个数.
    #[inline]
    pub fn num_false_positives(&self) -> usize {
        self.false_positives.len()
    }

    /// 假阴性个数.
    #[inline]
    pub fn num_false_negatives(&self) -> usize {
        self.false_negatives.len()
    }

    /// 容错编辑距离: 分裂, 合并, 假阳性与假阴性个数之和.
    pub fn ted(&self) -> usize {
        self.num_splits()
            + self.num_merges()
            + self.num_false_positives()
            + self.num_false_negatives()
    }

    /// 是否没有任何错误?
    pub fn is_error_free(&self) -> bool {
        self.splits.is_empty()
            && self.merges.is_empty()
            && self.false_positives.is_empty()
            && self.false_negatives.is_empty()
    }
}

/// 错误分类器.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ErrorClassifier {
    min_overlap: u64,
    ignore_background: bool,
}

impl ErrorClassifier {
    /// 创建分类器. `min_overlap_voxels` 至少为 1.
    pub fn new(min_overlap_voxels: u64, ignore_background: bool) -> Result<Self, ConfigError> {
        if min_overlap_voxels == 0 {
            return Err(ConfigError::InvalidMinOverlap(min_overlap_voxels));
        }
        Ok(Self {
            min_overlap: min_overlap_voxels,
            ignore_background,
        })
    }

    /// 从评估参数创建分类器.
    pub fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        Self::new(params.min_overlap_voxels, params.ignore_background)
    }

    #[inline]
    fn is_significant(&self, n: u64) -> bool {
        n >= self.min_overlap
    }

    /// 标签是否参与分裂 / 合并判定?
    #[inline]
    fn participates(&self, label: Label) -> bool {
        !(self.ignore_background && is_background(label))
    }

    /// 分类.
    ///
    /// `corrected` 是真值与修正后候选之间的重叠表, `uncorrected` 是修正前的.
    /// 后者只用于假阳性 / 假阴性判定: 修正可以消除, 但不能制造背景上的重叠.
    pub fn classify(&self, corrected: &OverlapTable, uncorrected: &OverlapTable) -> ErrorSets {
        let mut sets = ErrorSets {
            has_background: corrected.cand_total(BACKGROUND) > 0
                || corrected.gt_total(BACKGROUND) > 0,
            ..Default::default()
        };

        if corrected.cand_total(BACKGROUND) > 0 {
            sets.false_negatives = corrected
                .gt_labels()
                .filter(|&g| is_foreground(g))
                .filter(|&g| {
                    !corrected
                        .gt_partners(g)
                        .any(|(c, n)| is_foreground(c) && self.is_significant(n))
                        && self.is_significant(corrected.overlap(g, BACKGROUND))
                        && self.is_significant(uncorrected.overlap(g, BACKGROUND))
                })
                .collect();
        }
        if corrected.gt_total(BACKGROUND) > 0 {
            sets.false_positives = corrected
                .cand_labels()
                .filter(|&c| is_foreground(c))
                .filter(|&c| {
                    !corrected
                        .cand_partners(c)
                        .any(|(g, n)| is_foreground(g) && self.is_significant(n))
                        && self.is_significant(corrected.overlap(BACKGROUND, c))
                        && self.is_significant(uncorrected.overlap(BACKGROUND, c))
                })
                .collect();
        }

        let gt_ok = |g: Label| self.participates(g) && !sets.false_negatives.contains(&g);
        let cand_ok = |c: Label| self.participates(c) && !sets.false_positives.contains(&c);

        let gt_sets: BTreeMap<Label, BTreeSet<Label>> = corrected
            .gt_labels()
            .filter(|&g| gt_ok(g))
            .map(|g| {
                let partners = corrected
                    .gt_partners(g)
                    .filter(|&(c, n)| cand_ok(c) && self.is_significant(n))
                    .map(|(c, _)| c)
                    .collect();
                (g, partners)
            })
            .collect();
        let cand_sets: BTreeMap<Label, BTreeSet<Label>> = corrected
            .cand_labels()
            .filter(|&c| cand_ok(c))
            .map(|c| {
                let partners = corrected
                    .cand_partners(c)
                    .filter(|&(g, n)| gt_ok(g) && self.is_significant(n))
                    .map(|(g, _)| g)
                    .collect();
                (c, partners)
            })
            .collect();

        for (&g, partners) in gt_sets.iter() {
            if partners.len() > 1 {
                sets.splits.insert(g, partners.clone());
            } else if let Some(&c) = partners.first() {
                if cand_sets.get(&c).map_or(0, BTreeSet::len) == 1 {
                    sets.matches.insert(g, c);
                }
            }
        }
        sets.merges = cand_sets
            .into_iter()
            .filter(|(_, partners)| partners.len() > 1)
            .collect();

        log::debug!(
            "classified: {} matches, {} splits, {} merges, {} fp, {} fn",
            sets.matches.len(),
            sets.num_splits(),
            sets.num_merges(),
            sets.num_false_positives(),
            sets.num_false_negatives()
        );
        sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(pairs: &[(Label, Label, u64)], min: u64, ignore_bg: bool) -> ErrorSets {
        let table = OverlapTable::from_pairs(pairs.iter().copied());
        ErrorClassifier::new(min, ignore_bg)
            .unwrap()
            .classify(&table, &table)
    }

    #[test]
    fn test_perfect_match() {
        let sets = classify(&[(0, 0, 500), (1, 4, 100), (2, 9, 100)], 1, false);
        assert!(sets.is_error_free());
        assert_eq!(sets.ted(), 0);
        assert_eq!(sets.matches, BTreeMap::from([(0, 0), (1, 4), (2, 9)]));
    }

    #[test]
    fn test_split_and_merge() {
        // 1 被分裂为 {4, 5}, 5 合并了 {1, 2}.
        let sets = classify(&[(1, 4, 50), (1, 5, 50), (2, 5, 80)], 1, true);
        assert_eq!(sets.splits, BTreeMap::from([(1, BTreeSet::from([4, 5]))]));
        assert_eq!(sets.merges, BTreeMap::from([(5, BTreeSet::from([1, 2]))]));
        assert!(sets.matches.is_empty());
        assert_eq!(sets.num_splits(), 1);
        assert_eq!(sets.num_merges(), 1);
        assert_eq!(sets.ted(), 2);
    }

    #[test]
    fn test_noise_below_threshold_ignored() {
        let sets = classify(&[(1, 1, 9_990), (1, 2, 10), (3, 2, 400)], 50, false);
        assert!(sets.splits.is_empty());
        assert!(sets.merges.is_empty());
        assert_eq!(sets.matches, BTreeMap::from([(1, 1), (3, 2)]));

        // 门限为 1 时则构成分裂与合并.
        let sets = classify(&[(1, 1, 9_990), (1, 2, 10), (3, 2, 400)], 1, false);
        assert_eq!(sets.num_splits(), 1);
        assert_eq!(sets.num_merges(), 1);
    }

    #[test]
    fn test_false_positive_and_negative() {
        let pairs = [(0, 0, 1000), (1, 0, 60), (2, 2, 70), (0, 7, 30), (2, 7, 1)];
        let sets = classify(&pairs, 5, false);
        assert_eq!(sets.false_negatives, BTreeSet::from([1]));
        assert_eq!(sets.false_positives, BTreeSet::from([7]));
        // 假阳性 / 假阴性不参与分裂合并.
        assert!(sets.splits.is_empty());
        assert!(sets.merges.is_empty());
        assert_eq!(sets.matches, BTreeMap::from([(0, 0), (2, 2)]));
        assert_eq!(sets.ted(), 2);
    }

    #[test]
    fn test_no_background_no_fp_fn() {
        // 候选中没有背景, 因此不存在假阴性.
        let sets = classify(&[(1, 3, 10), (2, 3, 10)], 1, false);
        assert!(sets.false_negatives.is_empty());
        assert!(!sets.has_background);
        assert_eq!(sets.merges, BTreeMap::from([(3, BTreeSet::from([1, 2]))]));
    }

    #[test]
    fn test_correction_cannot_create_false_negative() {
        // 修正前标签 1 与背景只有噪声重叠.
        let uncorrected = OverlapTable::from_pairs([(0, 0, 100), (1, 0, 2), (1, 5, 40)]);
        let corrected = OverlapTable::from_pairs([(0, 0, 100), (1, 0, 42)]);
        let sets = ErrorClassifier::new(5, false)
            .unwrap()
            .classify(&corrected, &uncorrected);
        assert!(sets.false_negatives.is_empty());
        // 1 被背景完全覆盖, 于是合并进了背景.
        assert_eq!(sets.merges, BTreeMap::from([(0, BTreeSet::from([0, 1]))]));
    }

    #[test]
    fn test_ignore_background() {
        let pairs = [(0, 0, 100), (0, 1, 20), (1, 1, 50), (1, 0, 20)];
        let with_bg = classify(&pairs, 1, false);
        assert_eq!(with_bg.num_splits(), 2);
        assert_eq!(with_bg.num_merges(), 2);

        let without_bg = classify(&pairs, 1, true);
        assert!(without_bg.is_error_free());
        assert_eq!(without_bg.matches, BTreeMap::from([(1, 1)]));
    }

    #[test]
    fn test_pair_side_exclusive() {
        let pairs = [(1, 4, 50), (1, 5, 50), (2, 5, 80), (3, 6, 10)];
        let sets = classify(&pairs, 1, true);
        for (g, c) in sets.matches.iter() {
            assert!(!sets.splits.contains_key(g));
            assert!(!sets.merges.contains_key(c));
        }
        let labelled: BTreeSet<Label> = sets
            .splits
            .keys()
            .chain(sets.matches.keys())
            .copied()
            .collect();
        assert!(labelled.is_disjoint(&sets.false_negatives));
    }

    #[test]
    fn test_invalid_threshold() {
        assert_eq!(
            ErrorClassifier::new(0, false),
            Err(ConfigError::InvalidMinOverlap(0))
        );
    }
}
