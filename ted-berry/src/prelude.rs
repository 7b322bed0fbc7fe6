//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Label};

pub use crate::data::{LabelSlice, LabelSliceMut, LabelVolume, Resolution};

pub use crate::components::extract_ground_truth_labels;

pub use crate::consts::{outputs, BACKGROUND};

pub use crate::error::{ConfigError, NoSuchOutput, ShapeError, TedError, TedResult};

pub use crate::params::{Parameters, StatsSource};

pub use crate::overlap::OverlapTable;

pub use crate::tolerance::{CorrectionResult, Reassigned, ToleranceCorrector};

pub use crate::classify::{ErrorClassifier, ErrorSets};

pub use crate::stats::{grow_slices, Statistics, StatisticsEngine, Voi};

pub use crate::report::{ErrorReport, ReportOutput, ReportRecord, TedCounts};

pub use crate::{evaluate, Evaluation};
