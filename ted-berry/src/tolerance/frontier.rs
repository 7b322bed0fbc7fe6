use binary_heap_plus::{BinaryHeap, MinComparator};
use ordered_float::NotNan;

use crate::Label;

/// 一次认领. 字段顺序即优先级: 距离最近, 然后真值标签最小, 然后线性下标最小.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Claim {
    pub(crate) dist: NotNan<f64>,
    pub(crate) gt: Label,
    pub(crate) index: usize,
}

/// 认领过程需要维护的数据结构集合.
///
/// 体素以线性下标寻址. 每一环 (距离相同的一批认领) 从堆中整体取出,
/// 提交完毕后才能推入下一环.
///
/// 多遍修正共用同一个实例, 每遍开始前调用 [`ClaimFrontier::reset`].
pub(crate) struct ClaimFrontier {
    heap: BinaryHeap<Claim, MinComparator>,
    settled: Vec<bool>,
    /// 本遍被标记为已确定的体素.
    touched: Vec<usize>,
}

impl ClaimFrontier {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            heap: BinaryHeap::new_min(),
            settled: vec![false; size],
            touched: Vec::new(),
        }
    }

    /// 清空堆和已确定标记. 代价与上一遍确定的体素个数成正比.
    pub(crate) fn reset(&mut self) {
        self.heap.clear();
        for index in self.touched.drain(..) {
            self.settled[index] = false;
        }
    }

    /// 推入一个认领. 体素已经确定时忽略, 返回值指示是否真的推入.
    #[inline]
    pub(crate) fn push(&mut self, dist: f64, gt: Label, index: usize) -> bool {
        if self.settled[index] {
            return false;
        }
        // 距离由有限正数累加而来, 不会是 NaN, 可直接 unwrap.
        let dist = NotNan::new(dist).unwrap();
        self.heap.push(Claim { dist, gt, index });
        true
    }

    /// 取出下一环: 所有距离等于当前最小距离、且尚未确定的认领,
    /// 按 `(真值标签, 线性下标)` 升序排列. 取出的体素被标记为已确定.
    ///
    /// 堆为空时返回空向量.
    pub(crate) fn take_ring(&mut self) -> Vec<Claim> {
        let Some(first) = self.heap.peek().map(|c| c.dist) else {
            return Vec::new();
        };
        let mut ring = Vec::new();
        while let Some(claim) = self.heap.peek().copied() {
            if claim.dist != first {
                break;
            }
            self.heap.pop();
            if !self.settled[claim.index] {
                self.settled[claim.index] = true;
                self.touched.push(claim.index);
                ring.push(claim);
            }
        }
        ring
    }

    /// 是否还有待处理的认领?
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rings_in_canonical_order() {
        let mut f = ClaimFrontier::new(10);
        f.push(2.0, 1, 0);
        f.push(1.0, 3, 4);
        f.push(1.0, 2, 7);
        f.push(1.0, 2, 5);
        // 重复推入同一体素, 只保留最近的一次.
        f.push(2.0, 2, 5);

        let ring: Vec<_> = f.take_ring().iter().map(|c| (c.gt, c.index)).collect();
        assert_eq!(ring, vec![(2, 5), (2, 7), (3, 4)]);
        assert!(!f.push(3.0, 1, 5));

        let ring: Vec<_> = f.take_ring().iter().map(|c| c.index).collect();
        assert_eq!(ring, vec![0]);
        assert!(f.is_empty());
        assert!(f.take_ring().is_empty());
    }

    #[test]
    fn test_reset_clears_settled() {
        let mut f = ClaimFrontier::new(4);
        f.push(1.0, 1, 2);
        f.push(2.0, 1, 3);
        assert_eq!(f.take_ring().len(), 1);
        assert!(!f.push(1.0, 1, 2));

        f.reset();
        assert!(f.is_empty());
        assert!(f.push(1.0, 1, 2));
        let ring: Vec<_> = f.take_ring().iter().map(|c| c.index).collect();
        assert_eq!(ring, vec![2]);
    }
}
