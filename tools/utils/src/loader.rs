//! 标签体的读取与写入.
//!
//! 支持的路径格式:
//!
//! - `file.nii` / `file.nii.gz`: nifti 文件, 分辨率取自文件头;
//! - `file.npy`: NumPy 数组, 按 `(z, 高, 宽)` 存储;
//! - `archive.npz:dataset`: NumPy 压缩归档中的某个数组.

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Ix3};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpzError, WriteNpyError};
use nifti::{IntoNdArray, NiftiObject, NiftiType, ReaderOptions};
use ted_berry::error::TedError;
use ted_berry::{LabelVolume, Resolution};
use thiserror::Error;

/// 读写标签体错误.
#[derive(Debug, Error)]
pub enum LoadError {
    /// 底层 I/O 错误.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// 读取 nifti 文件错误.
    #[error("nifti error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// nifti 数据不是三维的.
    #[error("volume is not 3-dimensional: {0}")]
    Dimension(#[from] ndarray::ShapeError),

    /// 读取 npy 文件错误.
    #[error("npy error: {0}")]
    ReadNpy(#[from] ReadNpyError),

    /// 读取 npz 归档错误.
    #[error("npz error: {0}")]
    ReadNpz(#[from] ReadNpzError),

    /// 写入 npy 文件错误.
    #[error("npy write error: {0}")]
    WriteNpy(#[from] WriteNpyError),

    /// 数据不是合法的标签体.
    #[error(transparent)]
    Ted(#[from] TedError),

    /// 无法识别的文件格式.
    #[error("unsupported volume path `{0}`")]
    UnsupportedFormat(String),

    /// 数组元素类型不能作为标签.
    #[error("unsupported element type in `{0}`")]
    UnsupportedDtype(String),

    /// 找不到用户主目录.
    #[error("cannot determine the home directory")]
    NoHomeDir,
}

/// 标签体来源.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    /// nifti 文件.
    Nifti(PathBuf),
    /// npy 文件.
    Npy(PathBuf),
    /// npz 归档及其中的数组名.
    Npz(PathBuf, String),
}

impl VolumeSource {
    /// 解析路径字符串.
    pub fn parse(s: &str) -> Result<Self, LoadError> {
        if let Some((archive, name)) = s.rsplit_once(':') {
            if archive.ends_with(".npz") && !name.is_empty() {
                return Ok(Self::Npz(PathBuf::from(archive), name.to_string()));
            }
        }
        if s.ends_with(".nii") || s.ends_with(".nii.gz") {
            Ok(Self::Nifti(PathBuf::from(s)))
        } else if s.ends_with(".npy") {
            Ok(Self::Npy(PathBuf::from(s)))
        } else {
            Err(LoadError::UnsupportedFormat(s.to_string()))
        }
    }

    /// 文件路径.
    pub fn path(&self) -> &Path {
        match self {
            Self::Nifti(p) | Self::Npy(p) | Self::Npz(p, _) => p.as_path(),
        }
    }

    /// 不含扩展名的文件名, 用于派生输出文件名.
    pub fn stem(&self) -> String {
        let name = self
            .path()
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = name
            .strip_suffix(".nii.gz")
            .or_else(|| name.strip_suffix(".nii"))
            .or_else(|| name.strip_suffix(".npy"))
            .or_else(|| name.strip_suffix(".npz"))
            .unwrap_or(&name)
            .to_string();
        match self {
            Self::Npz(_, dataset) => format!("{name}_{dataset}"),
            _ => name,
        }
    }
}

/// 依次以各元素类型尝试读取, 仅在元素类型不符时尝试下一种.
///
/// 读取成功后以 `LabelVolume::$build` 转换为标签体.
macro_rules! read_any_dtype {
    ($read: ident, $build: ident, $resolution: expr, $wrong: pat, [$($t: ty),+]) => {{
        $(
            match $read!($t) {
                Ok(a) => return Ok(LabelVolume::$build(a.view(), $resolution)?),
                Err($wrong) => {}
                Err(e) => return Err(e.into()),
            }
        )+
    }};
}

/// 读取 `path` 描述的标签体.
///
/// `resolution` 非空时覆盖文件自带的分辨率. npy / npz 格式不带分辨率,
/// 默认为各向同性的 1.
pub fn read_volume(path: &str, resolution: Option<Resolution>) -> Result<LabelVolume, LoadError> {
    let source = VolumeSource::parse(path)?;
    log::debug!("reading volume {source:?}");
    let volume = match &source {
        VolumeSource::Nifti(path) => read_nifti(path, resolution)?,
        VolumeSource::Npy(path) => read_npy(path, resolution.unwrap_or_default())?,
        VolumeSource::Npz(path, name) => read_npz(path, name, resolution.unwrap_or_default())?,
    };
    log::debug!(
        "volume {:?}, resolution {:?}",
        volume.shape(),
        volume.resolution()
    );
    Ok(volume)
}

fn read_nifti(path: &Path, resolution: Option<Resolution>) -> Result<LabelVolume, LoadError> {
    let obj = ReaderOptions::new().read_file(path)?;
    let [_, w, h, z, ..] = obj.header().pixdim;
    let resolution = match resolution {
        Some(r) => r,
        None => Resolution::new(z as f64, h as f64, w as f64).unwrap_or_else(|_| {
            log::warn!("invalid pixdim in {}, using unit resolution", path.display());
            Resolution::default()
        }),
    };

    let data_type = obj.header().data_type()?;
    let volume = obj.into_volume();

    // [W, H, z] -> [z, H, W].
    macro_rules! to_zhw {
        ($t: ty) => {
            volume
                .into_ndarray::<$t>()?
                .into_dimensionality::<Ix3>()?
                .permuted_axes([2, 1, 0])
        };
    }
    let labels = match data_type {
        NiftiType::Uint64 => LabelVolume::from_integer_labels(to_zhw!(u64).view(), resolution)?,
        NiftiType::Int64 => LabelVolume::from_integer_labels(to_zhw!(i64).view(), resolution)?,
        _ => LabelVolume::from_float_labels(to_zhw!(f64).view(), resolution)?,
    };
    Ok(labels)
}

fn read_npy(path: &Path, resolution: Resolution) -> Result<LabelVolume, LoadError> {
    macro_rules! read_as {
        ($t: ty) => {
            ndarray_npy::read_npy::<_, Array3<$t>>(path)
        };
    }
    read_any_dtype!(
        read_as,
        from_integer_labels,
        resolution,
        ReadNpyError::WrongDescriptor(_),
        [u64, u32, u16, u8, i64, i32, i16, i8]
    );
    read_any_dtype!(
        read_as,
        from_float_labels,
        resolution,
        ReadNpyError::WrongDescriptor(_),
        [f64, f32]
    );
    Err(LoadError::UnsupportedDtype(path.display().to_string()))
}

fn read_npz(path: &Path, name: &str, resolution: Resolution) -> Result<LabelVolume, LoadError> {
    let mut npz = NpzReader::new(File::open(path)?)?;
    // numpy 保存时会为数组名加上 `.npy` 后缀.
    let names = npz.names()?;
    let entry = if names.iter().any(|n| n == name) {
        name.to_string()
    } else {
        format!("{name}.npy")
    };
    macro_rules! read_as {
        ($t: ty) => {
            npz.by_name::<ndarray::OwnedRepr<$t>, Ix3>(&entry)
        };
    }
    read_any_dtype!(
        read_as,
        from_integer_labels,
        resolution,
        ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_)),
        [u64, u32, u16, u8, i64, i32, i16, i8]
    );
    read_any_dtype!(
        read_as,
        from_float_labels,
        resolution,
        ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_)),
        [f64, f32]
    );
    Err(LoadError::UnsupportedDtype(format!("{}:{name}", path.display())))
}

/// 以 `u64` 元素的 npy 格式写出标签体.
pub fn write_volume_npy<P: AsRef<Path>>(volume: &LabelVolume, path: P) -> Result<(), LoadError> {
    ndarray_npy::write_npy(path.as_ref(), &volume.data())?;
    log::debug!("wrote {}", path.as_ref().display());
    Ok(())
}

/// 获取 `$HOME/dataset/ted/{it...}`.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(
    it: I,
) -> Result<PathBuf, LoadError> {
    let mut ans = dirs::home_dir().ok_or(LoadError::NoHomeDir)?;
    ans.push("dataset");
    ans.push("ted");
    ans.extend(it);
    Ok(ans)
}

fn from_env_or_home(var: &str, file: &str) -> Result<String, LoadError> {
    if let Ok(d) = env::var(var) {
        if !d.is_empty() {
            return Ok(d);
        }
    }
    home_dataset_dir_with([file]).map(|p| p.to_string_lossy().into_owned())
}

/// 获取默认真值路径.
///
/// 1. 若环境变量 `$TED_GROUND_TRUTH` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/ted/groundtruth.npy`.
#[inline]
pub fn ground_truth_from_env_or_home() -> Result<String, LoadError> {
    from_env_or_home("TED_GROUND_TRUTH", "groundtruth.npy")
}

/// 获取默认候选重建路径.
///
/// 1. 若环境变量 `$TED_RECONSTRUCTION` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/ted/reconstruction.npy`.
#[inline]
pub fn reconstruction_from_env_or_home() -> Result<String, LoadError> {
    from_env_or_home("TED_RECONSTRUCTION", "reconstruction.npy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ted_berry::error::ConfigError;

    #[test]
    fn test_parse_source() {
        assert_eq!(
            VolumeSource::parse("a/b.nii.gz").unwrap(),
            VolumeSource::Nifti(PathBuf::from("a/b.nii.gz"))
        );
        assert_eq!(
            VolumeSource::parse("b.npy").unwrap(),
            VolumeSource::Npy(PathBuf::from("b.npy"))
        );
        assert_eq!(
            VolumeSource::parse("c.npz:labels").unwrap(),
            VolumeSource::Npz(PathBuf::from("c.npz"), "labels".to_string())
        );
        assert!(matches!(
            VolumeSource::parse("c.npz"),
            Err(LoadError::UnsupportedFormat(_))
        ));
        assert!(VolumeSource::parse("d.tif").is_err());
    }

    #[test]
    fn test_stem() {
        let stem = |s: &str| VolumeSource::parse(s).unwrap().stem();
        assert_eq!(stem("x/recon.nii.gz"), "recon");
        assert_eq!(stem("recon.npy"), "recon");
        assert_eq!(stem("/tmp/all.npz:seg"), "all_seg");
    }

    #[test]
    fn test_npy_round_trip() {
        let dir = env::temp_dir().join(format!("ted-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let vol = LabelVolume::from_shape_vec((2, 2, 3), (0..12).collect(), Resolution::default())
            .unwrap();
        let path = dir.join("vol.npy");
        write_volume_npy(&vol, &path).unwrap();
        let back = read_volume(path.to_str().unwrap(), None).unwrap();
        assert_eq!(back, vol);

        // 浮点标签同样可以读取.
        let floats = Array3::<f32>::from_shape_fn((1, 2, 2), |(_, h, w)| (h * 2 + w) as f32);
        let path = dir.join("float.npy");
        ndarray_npy::write_npy(&path, &floats).unwrap();
        let back = read_volume(path.to_str().unwrap(), Some(Resolution::isotropic(2.0))).unwrap();
        assert_eq!(back.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(back.resolution(), Resolution::isotropic(2.0));

        // 小数标签被拒绝.
        let path = dir.join("frac.npy");
        ndarray_npy::write_npy(&path, &Array3::<f64>::from_elem((1, 1, 2), 0.5)).unwrap();
        assert!(matches!(
            read_volume(path.to_str().unwrap(), None),
            Err(LoadError::Ted(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_npy_large_integer_labels() {
        let dir = env::temp_dir().join(format!("ted-loader-big-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let big = 1u64 << 53;
        let path = dir.join("big.npy");
        let ids = Array3::from_shape_vec((1, 1, 2), vec![big, big + 1]).unwrap();
        ndarray_npy::write_npy(&path, &ids).unwrap();
        let back = read_volume(path.to_str().unwrap(), None).unwrap();
        assert_eq!(back.as_slice(), &[big, big + 1]);

        // 负的整数标签被拒绝.
        let path = dir.join("neg.npy");
        ndarray_npy::write_npy(&path, &Array3::from_elem((1, 1, 1), -3i32)).unwrap();
        let err = read_volume(path.to_str().unwrap(), None).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Ted(TedError::Config(ConfigError::LabelOutOfRange { value: -3, .. }))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
