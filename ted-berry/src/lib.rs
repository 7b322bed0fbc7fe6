#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 对三维标签体 (例如神经元分割) 的自动分割结果进行容错评估.
//!
//! 给定形状相同的真值标签体和候选标签体, 该 crate 计算 *容错编辑距离*
//! (tolerant edit distance, TED) 以及信息变差 (VOI), RAND 指数和检测重合率.
//! 仅发生在模糊边界附近、且在容差半径以内的分歧不被计为真正的错误.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 数据流
//!
//! ```text
//! LabelVolume(真值), LabelVolume(候选)
//!     -> ToleranceCorrector -> 修正后的 LabelVolume + OverlapTable
//!     -> ErrorClassifier -> ErrorSets
//!     -> StatisticsEngine -> 标量指标
//!     -> ErrorReport -> 具名输出
//! ```
//!
//! 完整流程由 [`evaluate`] 串联.
//!
//! # 注意
//!
//! 1. 标签一律为非负整数 ([`Label`]). 标签 `0` 在需要时被视为背景.
//! 2. 内部不变式被破坏时 (例如重叠表边缘和不一致), 程序会直接 panic,
//!   因为这只能说明存在 bug, 而不是可恢复的运行时错误.
//!
//! # 模块一览
//!
//! ### 标签体与切片 ✅
//!
//! 实现位于 `ted-berry/src/data`.
//!
//! ### 稀疏重叠表 ✅
//!
//! 内存占用只与实际出现过的 (真值, 候选) 标签对个数成正比.
//!
//! 实现位于 `ted-berry/src/overlap.rs`.
//!
//! ### 容差修正 ✅
//!
//! 以真值为引导的有界膨胀, 最近认领优先, 按环同步提交.
//!
//! 实现位于 `ted-berry/src/tolerance`.
//!
//! ### 错误分类 ✅
//!
//! 分裂 / 合并 / 假阳性 / 假阴性.
//!
//! 实现位于 `ted-berry/src/classify.rs`.
//!
//! ### 统计量 ✅
//!
//! VOI, RAND, 检测重合率, 以及逐切片的背景生长 (`growSlices`).
//!
//! 实现位于 `ted-berry/src/stats.rs`.
//!
//! ### 报告 ✅
//!
//! 实现位于 `ted-berry/src/report.rs`.

/// 二维索引 (高, 宽).
pub type Idx2d = (usize, usize);

/// 三维索引 (z, 高, 宽).
pub type Idx3d = (usize, usize, usize);

/// 区域标签. 标签是整数标识符, 不是浮点数.
pub type Label = u64;

/// 标签体基础数据结构.
mod data;

pub use data::{components, LabelSlice, LabelSliceMut, LabelVolume, Resolution};

pub mod consts;

pub mod error;

pub mod neighbour;

pub mod overlap;

pub mod params;

pub mod tolerance;

pub mod classify;

pub mod stats;

pub mod report;

mod evaluate;

pub use evaluate::{evaluate, Evaluation};

pub mod prelude;

#[cfg(test)]
pub(crate) mod test_utils;
