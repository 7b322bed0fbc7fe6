//! 通用常量.

use crate::Label;

/// 背景标签. 仅在需要区分背景时 (例如 `ignore_background`,
/// 假阳性/假阴性判定) 才具有特殊含义.
pub const BACKGROUND: Label = 0;

/// 标签是否是背景?
#[inline]
pub const fn is_background(label: Label) -> bool {
    label == BACKGROUND
}

/// 标签是否是前景?
#[inline]
pub const fn is_foreground(label: Label) -> bool {
    !is_background(label)
}

/// `ErrorReport` 的具名输出.
pub mod outputs {
    /// 容差修正后的候选标签体.
    pub const CORRECTED_RECONSTRUCTION: &str = "ted corrected reconstruction";

    /// 多行人类可读报告.
    pub const HUMAN_READABLE_REPORT: &str = "human readable error report";

    /// 单行制表符分隔报告.
    pub const SINGLE_LINE_REPORT: &str = "error report";

    /// 单行报告的列标题.
    pub const REPORT_HEADER: &str = "error report header";

    /// 分裂/合并/假阳性/假阴性集合.
    pub const TED_ERRORS: &str = "ted errors";
}

/// 缺省的显著重叠体素个数门限. 小于该值的重叠被视为噪声.
pub const DEFAULT_MIN_OVERLAP_VOXELS: u64 = 1;

/// 浮点标签允许的最大取整误差.
pub const LABEL_EPSILON: f64 = 1e-6;
