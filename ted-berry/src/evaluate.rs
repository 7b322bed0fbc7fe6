//! 完整的评估流程.

use crate::classify::{ErrorClassifier, ErrorSets};
use crate::error::{ConfigError, TedResult};
use crate::overlap::OverlapTable;
use crate::params::{Parameters, StatsSource};
use crate::report::ErrorReport;
use crate::stats::{Statistics, StatisticsEngine};
use crate::tolerance::{CorrectionResult, ToleranceCorrector};
use crate::LabelVolume;

/// 一次评估的全部产物.
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// 报告.
    pub report: ErrorReport,
    /// 真值与原始候选之间的重叠表.
    pub uncorrected: OverlapTable,
    /// 真值与修正后候选之间的重叠表. 不需要分类时为 `None`.
    pub corrected: Option<OverlapTable>,
}

/// 对 `cand` 相对于 `gt` 进行评估.
///
/// 流程依次为:
///
/// 1. 构建未修正的重叠表;
/// 2. 容差修正, 并构建修正后的重叠表;
/// 3. 错误分类;
/// 4. 统计量;
/// 5. 汇总为报告.
///
/// 第 2, 3 步只在需要容错编辑距离或检测重合率时执行.
///
/// # 错误
///
/// - 参数不合法, 或 `params.header_only` 为真时返回 `ConfigError`;
/// - 两个标签体形状不同时返回 `ShapeError`.
pub fn evaluate(
    gt: &LabelVolume,
    cand: &LabelVolume,
    params: &Parameters,
) -> TedResult<Evaluation> {
    params.validate()?;
    if params.header_only {
        return Err(ConfigError::HeaderOnly.into());
    }
    gt.same_shape(cand, "evaluation")?;

    let uncorrected = OverlapTable::build(gt, cand)?;
    uncorrected.check_invariants();

    let mut correction: Option<CorrectionResult> = None;
    let mut corrected: Option<OverlapTable> = None;
    let mut errors: Option<ErrorSets> = None;
    if params.needs_classification() {
        let corrector = ToleranceCorrector::new(params.tolerance_radius)?;
        let result = corrector.correct_with_table(gt, cand, &uncorrected)?;
        let table = OverlapTable::build(gt, &result.corrected)?;
        table.check_invariants();
        errors = Some(ErrorClassifier::from_params(params)?.classify(&table, &uncorrected));
        correction = Some(result);
        corrected = Some(table);
    }

    let engine = StatisticsEngine::new(params);
    let mut stats = Statistics::default();
    let source = match (params.stats_source, correction.as_ref()) {
        (StatsSource::Corrected, Some(c)) => &c.corrected,
        _ => cand,
    };
    engine.partition_stats(gt, source, &mut stats)?;
    if let (Some(e), Some(t)) = (errors.as_ref(), corrected.as_ref()) {
        engine.detection_stats(e, t, &mut stats);
    }

    let report = ErrorReport::new(params, correction, errors, stats);
    if let Some(ted) = report.record().ted {
        log::info!(
            "ted {} (splits {}, merges {}, fps {}, fns {})",
            ted.total(),
            ted.splits,
            ted.merges,
            ted.false_positives,
            ted.false_negatives
        );
    }
    Ok(Evaluation {
        report,
        uncorrected,
        corrected,
    })
}
