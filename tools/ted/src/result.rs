//! 评估结果的落盘.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ted_berry::prelude::ErrorSets;
use ted_berry::report;

/// `root/<stem>.<kind>.data`.
fn report_path(root: &Path, stem: &str, kind: &str) -> PathBuf {
    root.join(format!("{stem}.{kind}.data"))
}

fn write_with<F>(path: &Path, sets: &ErrorSets, f: F) -> io::Result<()>
where
    F: FnOnce(&ErrorSets, &mut BufWriter<File>) -> io::Result<()>,
{
    let mut w = BufWriter::new(File::create(path)?);
    f(sets, &mut w)?;
    w.flush()?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// 在 `root` 下写出分裂与合并列表. 存在背景标签时还会写出假阳性与假阴性列表.
pub fn write_error_files(root: &Path, stem: &str, sets: &ErrorSets) -> io::Result<()> {
    std::fs::create_dir_all(root)?;
    write_with(&report_path(root, stem, "splits"), sets, report::write_split_file)?;
    write_with(&report_path(root, stem, "merges"), sets, report::write_merge_file)?;
    if sets.has_background {
        write_with(&report_path(root, stem, "fps"), sets, report::write_fp_file)?;
        write_with(&report_path(root, stem, "fns"), sets, report::write_fn_file)?;
    }
    Ok(())
}

/// 向 `path` 末尾追加一行.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{line}")
}
