use crate::host::ProcessError;
use anyhow::Error as AnyError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Error returned by [`Loader::start`](crate::Loader::start).
///
/// Deadline expiry and stop requests are not errors; they end `start` with `Ok(())`.
#[derive(Debug)]
pub enum LoaderError {
    /// Checked before anything touches the filesystem or network.
    Precondition(PreconditionError),
    Provision(ProvisionError),
    Render(RenderError),
    /// A run failed; the remaining runs were skipped.
    Run(RunError),
    /// `start` may only be called once per loader.
    AlreadyStarted,
}

impl LoaderError {
    pub fn as_run(&self) -> Option<&RunError> {
        match self {
            LoaderError::Run(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::Precondition(err) => write!(f, "precondition failed: {err}"),
            LoaderError::Provision(err) => write!(f, "failed to provision clusterloader: {err}"),
            LoaderError::Render(err) => write!(f, "failed to render test overrides: {err}"),
            LoaderError::Run(err) => fmt::Display::fmt(err, f),
            LoaderError::AlreadyStarted => write!(f, "cluster loader was already started"),
        }
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoaderError::Precondition(err) => Some(err),
            LoaderError::Provision(err) => Some(err),
            LoaderError::Render(err) => Some(err),
            LoaderError::Run(err) => Some(err),
            LoaderError::AlreadyStarted => None,
        }
    }
}

impl From<PreconditionError> for LoaderError {
    fn from(err: PreconditionError) -> Self {
        LoaderError::Precondition(err)
    }
}

impl From<ProvisionError> for LoaderError {
    fn from(err: ProvisionError) -> Self {
        LoaderError::Provision(err)
    }
}

impl From<RenderError> for LoaderError {
    fn from(err: RenderError) -> Self {
        LoaderError::Render(err)
    }
}

impl From<RunError> for LoaderError {
    fn from(err: RunError) -> Self {
        LoaderError::Run(err)
    }
}

#[derive(Debug)]
pub enum PreconditionError {
    ConfigNotFound { path: PathBuf },
    Directory { path: PathBuf, source: io::Error },
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionError::ConfigNotFound { path } => {
                write!(f, "test config {} not found", path.display())
            }
            PreconditionError::Directory { path, source } => {
                write!(f, "report dir {} is not usable: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for PreconditionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreconditionError::ConfigNotFound { .. } => None,
            PreconditionError::Directory { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub enum ProvisionError {
    CreateDir { path: PathBuf, source: io::Error },
    Download { url: String, source: AnyError },
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::CreateDir { path, source } => {
                write!(f, "could not create {} ({source})", path.display())
            }
            ProvisionError::Download { url, source } => {
                write!(f, "download from {url} failed: {source:#}")
            }
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProvisionError::CreateDir { source, .. } => Some(source),
            ProvisionError::Download { source, .. } => Some(source.as_ref()),
        }
    }
}

#[derive(Debug)]
pub enum RenderError {
    Template(fmt::Error),
    WriteTemp(io::Error),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Template(_) => write!(f, "template formatting failed"),
            RenderError::WriteTemp(source) => write!(f, "failed to write temp file: {source}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Template(source) => Some(source),
            RenderError::WriteTemp(source) => Some(source),
        }
    }
}

/// A single run that did not succeed.
#[derive(Debug)]
pub struct RunError {
    index: usize,
    source: ProcessError,
}

impl RunError {
    pub fn new(index: usize, source: ProcessError) -> Self {
        Self { index, source }
    }

    /// Zero-based index of the failed run.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn process_error(&self) -> &ProcessError {
        &self.source
    }

    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster loader run {} failed: {}", self.index, self.source)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
