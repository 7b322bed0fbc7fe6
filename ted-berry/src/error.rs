//! 运行时错误.
//!
//! 只有三类外部可见的错误: 形状错误 (致命), 配置错误和缺失的具名输出
//! (调用方可选择不请求该输出). 内部不变式被破坏属于 bug, 直接 panic.

use crate::{Idx3d, Label};
use thiserror::Error;

/// 标签体形状错误. 出现时应中止整个评估.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// 数据长度与给定形状不一致.
    #[error("data length {found} does not match shape {shape:?} ({expected} voxels)")]
    DataLength {
        /// 给定形状.
        shape: Idx3d,
        /// 形状对应的体素个数.
        expected: usize,
        /// 实际数据长度.
        found: usize,
    },

    /// 两个参与比较的标签体形状不同.
    #[error("{stage}: volume shapes differ, {left:?} vs {right:?}")]
    Mismatch {
        /// 发现错误的阶段.
        stage: &'static str,
        /// 左侧 (一般为真值) 形状.
        left: Idx3d,
        /// 右侧 (一般为候选) 形状.
        right: Idx3d,
    },

    /// 空标签体. 三个维度都必须非零.
    #[error("empty volume of shape {0:?}")]
    Empty(Idx3d),
}

/// 配置错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 容差半径必须非负且有限.
    #[error("tolerance radius must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    /// 显著重叠门限至少为 1.
    #[error("minimum overlap must be at least 1 voxel, got {0}")]
    InvalidMinOverlap(u64),

    /// 体素分辨率必须为正且有限.
    #[error("resolution must be positive and finite, got {0:?}")]
    InvalidResolution([f64; 3]),

    /// 标签不是非负整数.
    #[error("label {value} at {pos:?} is not a non-negative integer")]
    FractionalLabel {
        /// 原始值.
        value: f64,
        /// 体素位置.
        pos: Idx3d,
    },

    /// 整数标签为负, 或超出标签类型的表示范围.
    #[error("label {value} at {pos:?} is out of the label range")]
    LabelOutOfRange {
        /// 原始值.
        value: i128,
        /// 体素位置.
        pos: Idx3d,
    },

    /// 仅请求了报告列标题, 却调用了需要标签体的计算.
    #[error("header-only configuration cannot evaluate volumes")]
    HeaderOnly,
}

/// 请求的具名输出因配置关闭而没有被计算.
///
/// 调用方应将其视为 "不可用", 而不是致命错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no such output `{name}`: {reason}")]
pub struct NoSuchOutput {
    /// 输出名.
    pub name: String,
    /// 不可用的原因.
    pub reason: &'static str,
}

impl NoSuchOutput {
    pub(crate) fn new(name: impl Into<String>, reason: &'static str) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }
}

/// 该 crate 的统一错误类型.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TedError {
    /// 形状错误.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// 配置错误.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 缺失的具名输出.
    #[error(transparent)]
    NoSuchOutput(#[from] NoSuchOutput),
}

impl TedError {
    /// 是否是可以被调用方忽略的 "输出不可用" 错误?
    #[inline]
    pub fn is_no_such_output(&self) -> bool {
        matches!(self, Self::NoSuchOutput(_))
    }
}

/// 评估流程的运行时结果.
pub type TedResult<T> = Result<T, TedError>;

/// 用于错误信息的标签对描述.
pub(crate) fn describe_pair((gt, cand): (Label, Label)) -> String {
    format!("(gt {gt}, candidate {cand})")
}
