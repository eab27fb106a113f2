//! Filesystem probes used while preparing a run.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const OVERRIDES_PREFIX: &str = "clusterloader-overrides-";
const OVERRIDES_SUFFIX: &str = ".yaml";

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Fails unless `path` is a directory the current process can create files in.
    fn ensure_writable_dir(&self, path: &Path) -> io::Result<()>;

    fn ensure_executable(&self, path: &Path) -> io::Result<()>;

    /// Persists `contents` to a fresh temporary file and returns its path.
    /// The file outlives the call; removing it is up to the caller.
    fn write_temp_file(&self, contents: &[u8]) -> io::Result<PathBuf>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem {
    temp_dir: Option<PathBuf>,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places temporary files under `dir` instead of the system temp directory.
    pub fn with_temp_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: Some(dir.into()),
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        create_private_dir_all(path)
    }

    fn ensure_writable_dir(&self, path: &Path) -> io::Result<()> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", path.display()),
            ));
        }

        // Dropping the probe removes it again.
        tempfile::Builder::new()
            .prefix(".touch-")
            .tempfile_in(path)
            .map(drop)
    }

    fn ensure_executable(&self, path: &Path) -> io::Result<()> {
        set_executable(path)
    }

    fn write_temp_file(&self, contents: &[u8]) -> io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(OVERRIDES_PREFIX).suffix(OVERRIDES_SUFFIX);
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(contents)?;
        file.as_file().sync_all()?;

        let (_, path) = file.keep().map_err(|err| err.error)?;
        Ok(path)
    }
}

#[cfg(unix)]
fn create_private_dir_all(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir_all(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o111 == 0o111 {
        return Ok(());
    }
    permissions.set_mode(mode | 0o111);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn set_executable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(drop)
}
