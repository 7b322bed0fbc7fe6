use crate::consts::{is_background, is_foreground};
use crate::neighbour::neighbour4;
use crate::{Idx2d, Label};
use ndarray::iter::{Iter, IterMut};
use ndarray::{ArrayView2, ArrayViewMut2, Ix2};
use std::ops::{Index, IndexMut};

/// 不可变、借用的二维水平标签切片.
pub struct LabelSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::LabelVolume`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, Label>,
}

impl Index<Idx2d> for LabelSlice<'_> {
    type Output = Label;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维水平标签切片.
///
/// 只在构建新标签体的过程中出现 (见 [`crate::LabelVolume::map_slices`]),
/// 原标签体本身始终不可变.
pub struct LabelSliceMut<'a> {
    data: ArrayViewMut2<'a, Label>,
}

/// 可变方法集合.
impl<'a> LabelSliceMut<'a> {
    /// 获取可以迭代并修改图像像素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, Label, Ix2> {
        self.data.iter_mut()
    }

    /// 将切片中的背景像素填充为最近的前景标签, 直到切片中不再有背景
    /// (若切片全为背景则不做任何修改).
    ///
    /// "最近" 按 4-邻域步数计算. 每一轮只根据上一轮结束时的快照决定本轮
    /// 要填充的像素和标签, 然后统一写入; 同一轮中若有多个候选标签,
    /// 取最小者. 因此结果与遍历顺序无关.
    ///
    /// 返回被填充的像素个数.
    pub fn grow_foreground(&mut self) -> usize {
        let mut frontier: Vec<Idx2d> = self
            .indexed_iter()
            .filter_map(|(pos, &pix)| {
                (is_background(pix) && self.is_n4_having(pos, is_foreground)).then_some(pos)
            })
            .collect();

        let mut filled = 0usize;
        while !frontier.is_empty() {
            // 本轮认领, 只读取快照.
            let claims: Vec<(Idx2d, Label)> = frontier
                .iter()
                .filter_map(|&pos| {
                    self.n4_positions(pos)
                        .into_iter()
                        .map(|p| self[p])
                        .filter(|&l| is_foreground(l))
                        .min()
                        .map(|l| (pos, l))
                })
                .collect();

            // 统一提交.
            for &(pos, label) in claims.iter() {
                self[pos] = label;
            }
            filled += claims.len();

            let mut next: Vec<Idx2d> = claims
                .iter()
                .flat_map(|&(pos, _)| self.n4_positions(pos))
                .filter(|p| is_background(self[*p]))
                .collect();
            next.sort_unstable();
            next.dedup();
            frontier = next;
        }
        filled
    }
}

impl Index<Idx2d> for LabelSliceMut<'_> {
    type Output = Label;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for LabelSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// label 不可变方法集合.
macro_rules! impl_label_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, Label, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&Label> {
                self.data.get(pos)
            }

            /// 该图是否为全背景图?
            #[inline]
            pub fn is_background(&self) -> bool {
                self.data.iter().copied().all(is_background)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计图像中值为 `label` 的像素总个数.
            #[inline]
            pub fn count(&self, label: Label) -> usize {
                self.data.iter().filter(|&p| *p == label).count()
            }

            /// 获得 `pos` 的 4-邻域像素索引. 保证返回的索引都不越界.
            pub fn n4_positions(&self, pos: Idx2d) -> Vec<Idx2d> {
                neighbour4(pos)
                    .into_iter()
                    .filter(|p| self.check(*p))
                    .collect()
            }

            /// 判断 `pos` 的 4-邻域是否有满足谓词 `pred` 的像素.
            pub fn is_n4_having(&self, pos: Idx2d, mut pred: impl FnMut(Label) -> bool) -> bool {
                neighbour4(pos)
                    .into_iter()
                    .any(|p| matches!(self.get(p), Some(&v) if pred(v)))
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &Label)> {
                self.data.indexed_iter()
            }
        }
    };
}
impl_label_slice_immut!('a, LabelSlice<'a>, ArrayView2<'a, Label>);
impl_label_slice_immut!('a, LabelSliceMut<'a>, ArrayViewMut2<'a, Label>);
