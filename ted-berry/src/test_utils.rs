//! 测试用标签体构造工具.

use crate::{Idx3d, Label, LabelVolume, Resolution};

/// 安装测试日志. 可重复调用, 只有第一次生效.
pub(crate) fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

/// 按 `[z][高][宽]` 嵌套切片构造标签体, 分辨率为 1.
///
/// 各层、各行长度必须一致.
pub(crate) fn volume_from_slices(slices: &[&[&[Label]]]) -> LabelVolume {
    let z = slices.len();
    let h = slices[0].len();
    let w = slices[0][0].len();
    let data: Vec<Label> = slices
        .iter()
        .flat_map(|s| s.iter())
        .flat_map(|row| row.iter().copied())
        .collect();
    LabelVolume::from_shape_vec((z, h, w), data, Resolution::default()).unwrap()
}

/// 以函数 `f(位置)` 填充一个标签体.
pub(crate) fn volume_from_fn(shape: Idx3d, f: impl Fn(Idx3d) -> Label) -> LabelVolume {
    let (z, h, w) = shape;
    let data = itertools::iproduct!(0..z, 0..h, 0..w).map(f).collect();
    LabelVolume::from_shape_vec(shape, data, Resolution::default()).unwrap()
}

/// `[lo, hi)` 三维立方体内为 `label`, 其它为背景.
pub(crate) fn cube_volume(shape: Idx3d, lo: usize, hi: usize, label: Label) -> LabelVolume {
    volume_from_fn(shape, |(z, h, w)| {
        let inside = (lo..hi).contains(&z) && (lo..hi).contains(&h) && (lo..hi).contains(&w);
        if inside {
            label
        } else {
            0
        }
    })
}

/// 确定性的伪随机数生成器 (xorshift64*), 只用于生成测试数据.
pub(crate) struct Rng(u64);

impl Rng {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// `[0, n)` 内的整数.
    pub(crate) fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// 标签在 `[0, n_labels)` 内均匀随机的标签体.
pub(crate) fn random_volume(shape: Idx3d, n_labels: u64, seed: u64) -> LabelVolume {
    let mut rng = Rng::new(seed);
    let (z, h, w) = shape;
    let data = (0..z * h * w).map(|_| rng.below(n_labels)).collect();
    LabelVolume::from_shape_vec(shape, data, Resolution::default()).unwrap()
}

/// 以 `0.0..1.0` 的概率 `p` 随机扰动 `volume` 中的体素为 `[0, n_labels)` 中的标签.
pub(crate) fn perturb(volume: &LabelVolume, p: f64, n_labels: u64, seed: u64) -> LabelVolume {
    let mut rng = Rng::new(seed);
    let threshold = (p * 1_000_000.0) as u64;
    let data = volume
        .iter()
        .map(|&l| {
            if rng.below(1_000_000) < threshold {
                rng.below(n_labels)
            } else {
                l
            }
        })
        .collect();
    volume.with_same_geometry(data)
}
