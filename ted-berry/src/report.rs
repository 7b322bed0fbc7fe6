//! 评估报告.
//!
//! [`ErrorReport`] 只是汇总, 不做任何计算. 外部调用方通过名字
//! (见 [`crate::consts::outputs`]) 请求输出; 因配置关闭而没有计算的输出
//! 返回 [`NoSuchOutput`].

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::classify::ErrorSets;
use crate::consts::outputs;
use crate::error::NoSuchOutput;
use crate::params::Parameters;
use crate::stats::{Statistics, Voi};
use crate::tolerance::CorrectionResult;
use crate::{Label, LabelVolume};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 容错编辑距离的各项计数.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TedCounts {
    /// 分裂.
    pub splits: usize,
    /// 合并.
    pub merges: usize,
    /// 假阳性.
    pub false_positives: usize,
    /// 假阴性.
    pub false_negatives: usize,
}

impl TedCounts {
    /// 总数.
    #[inline]
    pub fn total(&self) -> usize {
        self.splits + self.merges + self.false_positives + self.false_negatives
    }
}

impl From<&ErrorSets> for TedCounts {
    fn from(sets: &ErrorSets) -> Self {
        Self {
            splits: sets.num_splits(),
            merges: sets.num_merges(),
            false_positives: sets.num_false_positives(),
            false_negatives: sets.num_false_negatives(),
        }
    }
}

/// 一次评估得到的全部标量. 未开启的项为 `None`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReportRecord {
    /// 容差半径.
    pub tolerance_radius: f64,
    /// 容错编辑距离.
    pub ted: Option<TedCounts>,
    /// 修正时重新赋值的体素个数.
    pub reassigned: usize,
    /// 修正后仍无法合法修正的体素个数.
    pub unresolved: usize,
    /// 信息变差.
    pub voi: Option<Voi>,
    /// RAND 指数.
    pub rand: Option<f64>,
    /// 检测重合率.
    pub detection_overlap: Option<f64>,
}

/// 报告的具名输出.
#[derive(Debug, Clone, Copy)]
pub enum ReportOutput<'a> {
    /// 标签体.
    Volume(&'a LabelVolume),
    /// 错误集合.
    Errors(&'a ErrorSets),
}

/// 评估报告.
#[derive(Clone, Debug)]
pub struct ErrorReport {
    params: Parameters,
    record: ReportRecord,
    correction: Option<CorrectionResult>,
    errors: Option<ErrorSets>,
}

impl ErrorReport {
    /// 单行报告的列标题, 只由 `params` 决定, 不需要任何数据.
    pub fn header(params: &Parameters) -> String {
        let mut cols: Vec<&str> = Vec::with_capacity(12);
        if params.compute_ted {
            cols.extend([
                "ted_tolerance",
                "ted_splits",
                "ted_merges",
                "ted_fps",
                "ted_fns",
                "ted_total",
                "ted_reassigned",
                "ted_unresolved",
            ]);
        }
        if params.compute_voi {
            cols.extend(["voi_split", "voi_merge", "voi_total"]);
        }
        if params.compute_rand {
            cols.push("rand");
        }
        if params.compute_detection_overlap {
            cols.push("detection_overlap");
        }
        cols.join("\t")
    }

    /// 只能提供列标题的报告.
    pub fn header_only(params: &Parameters) -> Self {
        Self {
            params: params.clone(),
            record: ReportRecord {
                tolerance_radius: params.tolerance_radius,
                ..Default::default()
            },
            correction: None,
            errors: None,
        }
    }

    pub(crate) fn new(
        params: &Parameters,
        correction: Option<CorrectionResult>,
        errors: Option<ErrorSets>,
        stats: Statistics,
    ) -> Self {
        let record = ReportRecord {
            tolerance_radius: params.tolerance_radius,
            ted: params
                .compute_ted
                .then(|| errors.as_ref().map(TedCounts::from))
                .flatten(),
            reassigned: correction.as_ref().map_or(0, |c| c.reassigned.len()),
            unresolved: correction.as_ref().map_or(0, |c| c.unresolved),
            voi: stats.voi,
            rand: stats.rand,
            detection_overlap: stats.detection_overlap,
        };
        Self {
            params: params.clone(),
            record,
            correction,
            errors,
        }
    }

    /// 评估参数.
    #[inline]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// 全部标量.
    #[inline]
    pub fn record(&self) -> &ReportRecord {
        &self.record
    }

    fn check_data(&self, name: &str) -> Result<(), NoSuchOutput> {
        if self.params.header_only {
            Err(NoSuchOutput::new(name, "only the report header was requested"))
        } else {
            Ok(())
        }
    }

    /// 修正结果. 未开启容错编辑距离时不可用.
    pub fn correction(&self) -> Result<&CorrectionResult, NoSuchOutput> {
        let name = outputs::CORRECTED_RECONSTRUCTION;
        self.check_data(name)?;
        self.correction
            .as_ref()
            .filter(|_| self.params.compute_ted)
            .ok_or_else(|| NoSuchOutput::new(name, "tolerant edit distance is disabled"))
    }

    /// 修正后的候选标签体.
    #[inline]
    pub fn corrected(&self) -> Result<&LabelVolume, NoSuchOutput> {
        self.correction().map(|c| &c.corrected)
    }

    /// 分裂 / 合并 / 假阳性 / 假阴性集合. 未开启容错编辑距离时不可用.
    pub fn errors(&self) -> Result<&ErrorSets, NoSuchOutput> {
        let name = outputs::TED_ERRORS;
        self.check_data(name)?;
        self.errors
            .as_ref()
            .filter(|_| self.params.compute_ted)
            .ok_or_else(|| NoSuchOutput::new(name, "tolerant edit distance is disabled"))
    }

    /// 单行制表符分隔报告, 列顺序与 [`ErrorReport::header`] 一致.
    pub fn single_line(&self) -> Result<String, NoSuchOutput> {
        self.check_data(outputs::SINGLE_LINE_REPORT)?;
        let r = &self.record;
        let mut cols: Vec<String> = Vec::with_capacity(12);
        if self.params.compute_ted {
            let ted = r.ted.unwrap_or_default();
            cols.push(r.tolerance_radius.to_string());
            cols.extend(
                [
                    ted.splits,
                    ted.merges,
                    ted.false_positives,
                    ted.false_negatives,
                    ted.total(),
                    r.reassigned,
                    r.unresolved,
                ]
                .map(|n| n.to_string()),
            );
        }
        if let Some(voi) = r.voi.filter(|_| self.params.compute_voi) {
            cols.extend([voi.split, voi.merge, voi.total()].map(|v| v.to_string()));
        }
        if let Some(rand) = r.rand.filter(|_| self.params.compute_rand) {
            cols.push(rand.to_string());
        }
        if let Some(d) = r.detection_overlap.filter(|_| self.params.compute_detection_overlap) {
            cols.push(d.to_string());
        }
        Ok(cols.join("\t"))
    }

    /// 多行人类可读报告.
    pub fn human_readable(&self) -> Result<String, NoSuchOutput> {
        self.check_data(outputs::HUMAN_READABLE_REPORT)?;
        const S4: &str = "    ";
        let r = &self.record;
        let mut s = String::with_capacity(512);

        // 向 `String` 写入不会生成 `Err`, 可直接 unwrap.
        if let Some(ted) = r.ted {
            writeln!(s, "Tolerant edit distance (tolerance {}):", r.tolerance_radius).unwrap();
            writeln!(s, "{S4}Splits: {}", ted.splits).unwrap();
            writeln!(s, "{S4}Merges: {}", ted.merges).unwrap();
            writeln!(s, "{S4}False positives: {}", ted.false_positives).unwrap();
            writeln!(s, "{S4}False negatives: {}", ted.false_negatives).unwrap();
            writeln!(s, "{S4}Total: {}", ted.total()).unwrap();
            writeln!(
                s,
                "{S4}Reassigned voxels: {} ({} unresolved)",
                r.reassigned, r.unresolved
            )
            .unwrap();
        }
        if let Some(voi) = r.voi {
            writeln!(s, "Variation of information:").unwrap();
            writeln!(s, "{S4}Split: {:.6}", voi.split).unwrap();
            writeln!(s, "{S4}Merge: {:.6}", voi.merge).unwrap();
            writeln!(s, "{S4}Total: {:.6}", voi.total()).unwrap();
        }
        if let Some(rand) = r.rand {
            writeln!(s, "RAND index: {rand:.6}").unwrap();
        }
        if let Some(d) = r.detection_overlap {
            writeln!(s, "Detection overlap: {:.2}%", d * 100.0).unwrap();
        }
        while s.ends_with('\n') {
            s.pop();
        }
        Ok(s)
    }

    /// 按名字获取文本输出.
    pub fn text(&self, name: &str) -> Result<String, NoSuchOutput> {
        match name {
            outputs::HUMAN_READABLE_REPORT => self.human_readable(),
            outputs::SINGLE_LINE_REPORT => self.single_line(),
            outputs::REPORT_HEADER => Ok(Self::header(&self.params)),
            _ => Err(NoSuchOutput::new(name, "not a text output")),
        }
    }

    /// 按名字获取非文本输出.
    pub fn output(&self, name: &str) -> Result<ReportOutput<'_>, NoSuchOutput> {
        match name {
            outputs::CORRECTED_RECONSTRUCTION => self.corrected().map(ReportOutput::Volume),
            outputs::TED_ERRORS => self.errors().map(ReportOutput::Errors),
            _ => Err(NoSuchOutput::new(name, "unknown output")),
        }
    }
}

/// 写入一行以制表符分隔的标签列表: `key\tv0\tv1...`.
fn write_label_row<'a, W: Write>(
    w: &mut W,
    key: Label,
    values: impl IntoIterator<Item = &'a Label>,
) -> io::Result<()> {
    write!(w, "{key}")?;
    for v in values {
        write!(w, "\t{v}")?;
    }
    writeln!(w)
}

/// 每行一个被分裂的真值标签, 后接它被分裂成的候选标签.
pub fn write_split_file<W: Write>(sets: &ErrorSets, w: &mut W) -> io::Result<()> {
    for (&g, cands) in sets.splits.iter() {
        write_label_row(w, g, cands)?;
    }
    Ok(())
}

/// 每行一个发生合并的候选标签, 后接它合并的真值标签.
pub fn write_merge_file<W: Write>(sets: &ErrorSets, w: &mut W) -> io::Result<()> {
    for (&c, gts) in sets.merges.iter() {
        write_label_row(w, c, gts)?;
    }
    Ok(())
}

/// 每行一个假阳性候选标签.
pub fn write_fp_file<W: Write>(sets: &ErrorSets, w: &mut W) -> io::Result<()> {
    sets.false_positives
        .iter()
        .try_for_each(|c| writeln!(w, "{c}"))
}

/// 每行一个假阴性真值标签.
pub fn write_fn_file<W: Write>(sets: &ErrorSets, w: &mut W) -> io::Result<()> {
    sets.false_negatives
        .iter()
        .try_for_each(|g| writeln!(w, "{g}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_sets() -> ErrorSets {
        ErrorSets {
            splits: BTreeMap::from([(1, BTreeSet::from([4, 5]))]),
            merges: BTreeMap::from([(5, BTreeSet::from([1, 2]))]),
            false_positives: BTreeSet::from([9]),
            false_negatives: BTreeSet::from([3, 7]),
            has_background: true,
            ..Default::default()
        }
    }

    fn sample_report(params: &Parameters) -> ErrorReport {
        let stats = Statistics {
            voi: params.compute_voi.then_some(Voi {
                split: 0.5,
                merge: 0.25,
            }),
            rand: params.compute_rand.then_some(0.875),
            detection_overlap: params.compute_detection_overlap.then_some(0.5),
        };
        ErrorReport::new(params, None, Some(sample_sets()), stats)
    }

    #[test]
    fn test_header_columns_match_line() {
        let params = Parameters {
            compute_voi: true,
            compute_rand: true,
            ..Default::default()
        };
        let header = ErrorReport::header(&params);
        let report = sample_report(&params);
        let line = report.single_line().unwrap();
        assert_eq!(header.split('\t').count(), line.split('\t').count());
        assert!(header.starts_with("ted_tolerance\tted_splits"));
        assert!(header.ends_with("rand\tdetection_overlap"));
        assert_eq!(line, "0\t1\t1\t1\t2\t5\t0\t0\t0.5\t0.25\t0.75\t0.875\t0.5");
    }

    #[test]
    fn test_header_only() {
        let params = Parameters {
            header_only: true,
            compute_ted: false,
            ..Default::default()
        };
        let report = ErrorReport::header_only(&params);
        assert_eq!(
            report.text(outputs::REPORT_HEADER).unwrap(),
            "detection_overlap"
        );
        assert!(report.text(outputs::SINGLE_LINE_REPORT).is_err());
        assert!(report.human_readable().is_err());
        assert!(report.errors().is_err());
    }

    #[test]
    fn test_no_such_output() {
        let params = Parameters {
            compute_ted: false,
            ..Default::default()
        };
        let report = sample_report(&params);
        let err = report.output(outputs::CORRECTED_RECONSTRUCTION).unwrap_err();
        assert_eq!(err.name, outputs::CORRECTED_RECONSTRUCTION);
        assert!(report.output(outputs::TED_ERRORS).is_err());
        assert!(report.output("no such thing").is_err());
        // 其它输出不受影响.
        assert_eq!(report.single_line().unwrap(), "0.5");
    }

    #[test]
    fn test_human_readable_fields() {
        let params = Parameters {
            compute_voi: true,
            compute_rand: true,
            ..Default::default()
        };
        let text = sample_report(&params).human_readable().unwrap();
        for needle in [
            "Splits: 1",
            "Merges: 1",
            "False positives: 1",
            "False negatives: 2",
            "Total: 5",
            "Split: 0.500000",
            "RAND index: 0.875000",
            "Detection overlap: 50.00%",
        ] {
            assert!(text.contains(needle), "missing `{needle}` in\n{text}");
        }
    }

    #[test]
    fn test_error_files() {
        let sets = sample_sets();
        let mut buf = Vec::new();
        write_split_file(&sets, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1\t4\t5\n");

        let mut buf = Vec::new();
        write_merge_file(&sets, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "5\t1\t2\n");

        let mut buf = Vec::new();
        write_fn_file(&sets, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "3\n7\n");

        let mut buf = Vec::new();
        write_fp_file(&sets, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "9\n");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_serde() {
        let params = Parameters {
            compute_voi: true,
            ..Default::default()
        };
        let record = *sample_report(&params).record();
        let bytes = bincode::serialize(&record).unwrap();
        let back: ReportRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, record);
    }
}
