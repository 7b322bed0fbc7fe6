//! 容差带: 到另一真值区域的物理距离不超过容差半径的体素.

use binary_heap_plus::BinaryHeap;
use cfg_if::cfg_if;
use ordered_float::NotNan;

use crate::{Idx3d, LabelVolume};

/// 体素 `(z, h, w)` 到最近的不同真值标签的一步距离. 没有这样的 6-邻居时为 `None`.
fn seed_distance(gt: &LabelVolume, pos: Idx3d) -> Option<f64> {
    let res = gt.resolution();
    let label = gt[pos];
    gt.diamond_neighbours(pos)
        .filter(|(n, _)| gt[*n] != label)
        .map(|(_, axis)| res.step(axis))
        .min_by(f64::total_cmp)
}

/// 第 `z` 层的所有种子 `(线性下标, 距离)`.
fn slice_seeds(gt: &LabelVolume, z: usize, radius: f64) -> Vec<(usize, f64)> {
    let (h_len, w_len) = gt.slice_shape();
    itertools::iproduct!(0..h_len, 0..w_len)
        .filter_map(|(h, w)| {
            let pos = (z, h, w);
            seed_distance(gt, pos)
                .filter(|d| *d <= radius)
                .map(|d| (gt.linear_index(pos), d))
        })
        .collect()
}

cfg_if! {
    if #[cfg(feature = "rayon")] {
        fn seeds(gt: &LabelVolume, radius: f64) -> Vec<(usize, f64)> {
            use rayon::prelude::*;
            (0..gt.len_z())
                .into_par_iter()
                .flat_map_iter(|z| slice_seeds(gt, z, radius))
                .collect()
        }
    } else {
        fn seeds(gt: &LabelVolume, radius: f64) -> Vec<(usize, f64)> {
            (0..gt.len_z()).flat_map(|z| slice_seeds(gt, z, radius)).collect()
        }
    }
}

/// 容差带.
///
/// 距离沿真值区域内部的 6-连通路径测量, 每一步的长度取对应轴的分辨率.
/// 区域边界体素的初始距离为到相邻异标签体素的步长.
pub(crate) struct ToleranceBand {
    /// 以线性下标索引的距离, 不在带内时为 `f64::INFINITY`.
    dist: Vec<f64>,
    len: usize,
}

impl ToleranceBand {
    /// 有界多源 Dijkstra.
    pub(crate) fn compute(gt: &LabelVolume, radius: f64) -> Self {
        let mut dist = vec![f64::INFINITY; gt.size()];
        if radius <= 0.0 {
            return Self { dist, len: 0 };
        }

        let res = gt.resolution();
        let mut heap = BinaryHeap::new_min();
        for (index, d) in seeds(gt, radius) {
            dist[index] = d;
            // 距离由有限正数累加而来, 不会是 NaN, 可直接 unwrap.
            heap.push((NotNan::new(d).unwrap(), index));
        }

        while let Some((d, index)) = heap.pop() {
            let d = d.into_inner();
            if d > dist[index] {
                continue;
            }
            let pos = gt.position(index);
            let label = gt[pos];
            for (n, axis) in gt.diamond_neighbours(pos) {
                if gt[n] != label {
                    continue;
                }
                let nd = d + res.step(axis);
                let ni = gt.linear_index(n);
                if nd <= radius && nd < dist[ni] {
                    dist[ni] = nd;
                    heap.push((NotNan::new(nd).unwrap(), ni));
                }
            }
        }

        let len = dist.iter().filter(|d| d.is_finite()).count();
        Self { dist, len }
    }

    /// 线性下标为 `index` 的体素是否位于带内?
    #[inline]
    pub(crate) fn contains(&self, index: usize) -> bool {
        self.dist[index].is_finite()
    }

    /// 带内体素个数.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// 带内体素的线性下标, 升序.
    pub(crate) fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.dist
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.is_finite().then_some(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::volume_from_fn;
    use crate::{LabelVolume, Resolution};

    #[test]
    fn test_band_width() {
        // 宽方向上一半为 1, 一半为 2.
        let gt = volume_from_fn((1, 1, 10), |(_, _, w)| if w < 5 { 1 } else { 2 });
        let band = ToleranceBand::compute(&gt, 2.0);
        let inside: Vec<usize> = band.indices().collect();
        assert_eq!(inside, vec![3, 4, 5, 6]);
        assert_eq!(band.len(), 4);

        assert_eq!(ToleranceBand::compute(&gt, 0.0).len(), 0);
        assert_eq!(ToleranceBand::compute(&gt, 0.5).len(), 0);
    }

    #[test]
    fn test_band_anisotropic() {
        // z 方向步长为 3, 容差 2 时 z 方向的边界不在带内.
        let (data, _) = volume_from_fn((4, 1, 1), |(z, _, _)| if z < 2 { 1 } else { 2 }).into_raw();
        let gt = LabelVolume::new(data, Resolution::new(3.0, 1.0, 1.0).unwrap()).unwrap();
        assert_eq!(ToleranceBand::compute(&gt, 2.0).len(), 0);
        assert_eq!(ToleranceBand::compute(&gt, 3.0).len(), 2);
        assert_eq!(ToleranceBand::compute(&gt, 6.0).len(), 4);
    }

    #[test]
    fn test_uniform_volume_has_no_band() {
        let gt = volume_from_fn((3, 3, 3), |_| 7);
        assert_eq!(ToleranceBand::compute(&gt, 10.0).len(), 0);
    }
}
