use std::collections::BTreeSet;
use std::ops::Index;

use ndarray::{Array3, ArrayView, Axis, Ix3};
use num::ToPrimitive;

use crate::consts::LABEL_EPSILON;
use crate::error::{ConfigError, ShapeError};
use crate::neighbour::neighbour6;
use crate::{Idx2d, Idx3d, Label};

pub mod components;
pub mod slice;

pub use slice::{LabelSlice, LabelSliceMut};

/// 单个体素的物理分辨率, 分别代表空间 (相邻切片方向),
/// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// 相邻切片方向.
    pub z: f64,
    /// 垂直方向.
    pub height: f64,
    /// 水平方向.
    pub width: f64,
}

impl Default for Resolution {
    #[inline]
    fn default() -> Self {
        Self::isotropic(1.0)
    }
}

impl Resolution {
    /// 构建分辨率. 任一分量不为正或不有限时返回 `Err`.
    pub fn new(z: f64, height: f64, width: f64) -> Result<Self, ConfigError> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(z) && ok(height) && ok(width) {
            Ok(Self { z, height, width })
        } else {
            Err(ConfigError::InvalidResolution([z, height, width]))
        }
    }

    /// 各向同性分辨率.
    #[inline]
    pub const fn isotropic(v: f64) -> Self {
        Self {
            z: v,
            height: v,
            width: v,
        }
    }

    /// 以 `[z, 高, 宽]` 形式获取.
    #[inline]
    pub fn as_array(&self) -> [f64; 3] {
        [self.z, self.height, self.width]
    }

    /// 沿第 `axis` 轴 (0: z, 1: 高, 2: 宽) 移动一步的物理距离.
    #[inline]
    pub fn step(&self, axis: usize) -> f64 {
        self.as_array()[axis]
    }

}

/// 三维标签体: 非负整数标签的稠密三维数组, 以及体素分辨率.
///
/// 数据按照 `(z, 高, 宽)` 组织, 因此行优先遍历顺序就是
/// "z 递增, 然后 y 递增, 然后 x 递增" 的规范顺序.
///
/// 构造完成后不可变. 任何 "修改" 都会产生一个新的标签体.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelVolume {
    data: Array3<Label>,
    resolution: Resolution,
}

impl Index<Idx3d> for LabelVolume {
    type Output = Label;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LabelVolume {
    /// 从已有的三维数组创建标签体. 任一维度为 0 时返回 `Err`.
    pub fn new(data: Array3<Label>, resolution: Resolution) -> Result<Self, ShapeError> {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        let &[z, h, w] = data.shape() else {
            unreachable!()
        };
        if z == 0 || h == 0 || w == 0 {
            return Err(ShapeError::Empty((z, h, w)));
        }
        Ok(Self { data, resolution })
    }

    /// 从行优先 (`z`, 高, 宽) 存储的裸数据创建标签体.
    ///
    /// 若 `data.len()` 与 `shape` 不符, 返回 `ShapeError::DataLength`.
    pub fn from_shape_vec(
        shape: Idx3d,
        data: Vec<Label>,
        resolution: Resolution,
    ) -> Result<Self, ShapeError> {
        let expected = shape.0 * shape.1 * shape.2;
        if data.len() != expected {
            return Err(ShapeError::DataLength {
                shape,
                expected,
                found: data.len(),
            });
        }
        // 长度已经检查过, 该操作不会生成 `Err`, 可直接 unwrap.
        let data = Array3::from_shape_vec(shape, data).unwrap();
        Self::new(data, resolution)
    }

    /// 从浮点标签数组创建标签体.
    ///
    /// 外部读取器可能以浮点数保存标签. 任何非整数、负数或无意义 (inf, NaN)
    /// 的值都会导致 `ConfigError::FractionalLabel`.
    pub fn from_float_labels<T: ToPrimitive + Copy>(
        data: ArrayView<'_, T, Ix3>,
        resolution: Resolution,
    ) -> Result<Self, crate::error::TedError> {
        let mut labels = Vec::with_capacity(data.len());
        for (pos, v) in data.indexed_iter() {
            let value = v.to_f64().unwrap_or(f64::NAN);
            let rounded = value.round();
            if !value.is_finite() || value < 0.0 || (value - rounded).abs() > LABEL_EPSILON {
                return Err(ConfigError::FractionalLabel { value, pos }.into());
            }
            labels.push(rounded as Label);
        }
        let &[z, h, w] = data.shape() else {
            unreachable!()
        };
        Ok(Self::from_shape_vec((z, h, w), labels, resolution)?)
    }

    /// 从整数标签数组创建标签体, 逐元素检查转换, 不经过浮点数.
    ///
    /// 负数会导致 `ConfigError::LabelOutOfRange`.
    pub fn from_integer_labels<T: ToPrimitive + Copy>(
        data: ArrayView<'_, T, Ix3>,
        resolution: Resolution,
    ) -> Result<Self, crate::error::TedError> {
        let mut labels = Vec::with_capacity(data.len());
        for (pos, v) in data.indexed_iter() {
            match v.to_u64() {
                Some(label) => labels.push(label),
                None => {
                    let value = v.to_i128().unwrap_or(i128::MIN);
                    return Err(ConfigError::LabelOutOfRange { value, pos }.into());
                }
            }
        }
        let &[z, h, w] = data.shape() else {
            unreachable!()
        };
        Ok(Self::from_shape_vec((z, h, w), labels, resolution)?)
    }

    /// 获取数据形状大小.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取给定位置的标签. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<&Label> {
        self.data.get(pos)
    }

    /// 获取体素分辨率.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// 获取体素的实际体积.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.resolution.as_array().iter().product()
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    pub fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.resolution.as_array();
        z == h && z == w
    }

    /// 判断 `other` 是否与自身形状一致, 不一致时返回 `ShapeError::Mismatch`.
    pub fn same_shape(&self, other: &Self, stage: &'static str) -> Result<(), ShapeError> {
        if self.shape() == other.shape() {
            Ok(())
        } else {
            Err(ShapeError::Mismatch {
                stage,
                left: self.shape(),
                right: other.shape(),
            })
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, Label, Ix3> {
        self.data.view()
    }

    /// 按规范顺序迭代所有标签.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Label> {
        self.data.iter()
    }

    /// 按规范顺序迭代所有 `(索引, 标签)`.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx3d, &Label)> {
        self.data.indexed_iter()
    }

    /// 获得行优先存储的底层连续数据.
    #[inline]
    pub fn as_slice(&self) -> &[Label] {
        // 构造时已保证标准布局.
        self.data.as_slice().unwrap_or(&[])
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> (Array3<Label>, Resolution) {
        (self.data, self.resolution)
    }

    /// 获取标签体 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> LabelSlice {
        LabelSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = LabelSlice> {
        self.data.axis_iter(Axis(0)).map(LabelSlice::new)
    }

    /// 获得 `pos` 的 6-邻居 (钻石型) 索引及其所在轴. 保证返回的索引都不越界.
    #[inline]
    pub fn diamond_neighbours(&self, pos: Idx3d) -> impl Iterator<Item = (Idx3d, usize)> + '_ {
        neighbour6(pos).into_iter().filter(|(p, _)| self.check(p))
    }

    /// 获取标签体中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: Label) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取所有出现过的标签, 升序排列.
    pub fn labels(&self) -> Vec<Label> {
        let set: BTreeSet<Label> = self.data.iter().copied().collect();
        set.into_iter().collect()
    }

    /// 三维行优先下标转换为线性下标.
    #[inline]
    pub fn linear_index(&self, (z, h, w): Idx3d) -> usize {
        let (_, hl, wl) = self.shape();
        (z * hl + h) * wl + w
    }

    /// 线性下标转换为三维行优先下标.
    #[inline]
    pub fn position(&self, index: usize) -> Idx3d {
        let (_, hl, wl) = self.shape();
        (index / (hl * wl), (index / wl) % hl, index % wl)
    }

    /// 复制自身数据, 并对每个水平切片实施 `op`, 得到新的标签体.
    /// 分辨率保持不变.
    pub fn map_slices<F>(&self, op: F) -> Self
    where
        F: Fn(LabelSliceMut) + Sync + Send,
    {
        let mut data = self.data.clone();

        #[cfg(feature = "rayon")]
        {
            use rayon::iter::{IntoParallelIterator, ParallelIterator};
            data.axis_iter_mut(Axis(0))
                .into_par_iter()
                .for_each(|v| op(LabelSliceMut::new(v)));
        }
        #[cfg(not(feature = "rayon"))]
        data.axis_iter_mut(Axis(0))
            .for_each(|v| op(LabelSliceMut::new(v)));

        Self {
            data,
            resolution: self.resolution,
        }
    }

    /// 由线性存储的新标签构建一个同形状、同分辨率的标签体.
    pub(crate) fn with_same_geometry(&self, labels: Vec<Label>) -> Self {
        debug_assert_eq!(labels.len(), self.size());
        // 长度与形状一致, 该操作不会生成 `Err`, 可直接 unwrap.
        Self {
            data: Array3::from_shape_vec(self.shape(), labels).unwrap(),
            resolution: self.resolution,
        }
    }
}
