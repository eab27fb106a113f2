use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_RUNS: usize = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 20 * 60;
const DEFAULT_NODES: usize = 10;

/// Tuning knobs forwarded verbatim to clusterloader2 through `--testoverrides`.
///
/// Values are opaque to the runner: they are rendered, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOverrides {
    pub nodes_per_namespace: usize,
    pub pods_per_node: usize,

    pub big_group_size: usize,
    pub medium_group_size: usize,
    pub small_group_size: usize,

    pub small_stateful_sets_per_namespace: usize,
    pub medium_stateful_sets_per_namespace: usize,

    pub cl2_enable_pvs: bool,
    pub prometheus_scrape_kube_proxy: bool,
    pub enable_system_pod_metrics: bool,
}

impl Default for TestOverrides {
    fn default() -> Self {
        Self {
            nodes_per_namespace: 10,
            pods_per_node: 10,
            big_group_size: 25,
            medium_group_size: 10,
            small_group_size: 5,
            small_stateful_sets_per_namespace: 0,
            medium_stateful_sets_per_namespace: 0,
            cl2_enable_pvs: false,
            prometheus_scrape_kube_proxy: false,
            enable_system_pod_metrics: false,
        }
    }
}

/// Runtime configuration for a [`Loader`](crate::Loader).
///
/// All instances must be constructed via [`LoaderConfig::builder`] or [`LoaderConfig::new`]
/// so invariants are validated before the loader observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    kubeconfig_path: Option<PathBuf>,
    loader_path: PathBuf,
    download_url: String,
    test_config_path: PathBuf,
    report_dir: PathBuf,
    logs_path: Option<PathBuf>,
    runs: usize,
    timeout: Duration,
    attempt_timeout: Duration,
    nodes: usize,
    overrides: TestOverrides,
}

pub struct LoaderConfigParams {
    pub kubeconfig_path: Option<PathBuf>,
    pub loader_path: PathBuf,
    pub download_url: String,
    pub test_config_path: PathBuf,
    pub report_dir: PathBuf,
    pub logs_path: Option<PathBuf>,
    pub runs: usize,
    pub timeout: Duration,
    pub attempt_timeout: Duration,
    pub nodes: usize,
    pub overrides: TestOverrides,
}

impl LoaderConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values and validates it.
    pub fn new(params: LoaderConfigParams) -> Result<Self> {
        let LoaderConfigParams {
            kubeconfig_path,
            loader_path,
            download_url,
            test_config_path,
            report_dir,
            logs_path,
            runs,
            timeout,
            attempt_timeout,
            nodes,
            overrides,
        } = params;

        let config = Self {
            kubeconfig_path: kubeconfig_path.filter(|path| !path.as_os_str().is_empty()),
            loader_path,
            download_url: download_url.trim().to_owned(),
            test_config_path,
            report_dir,
            logs_path: logs_path.filter(|path| !path.as_os_str().is_empty()),
            runs,
            timeout,
            attempt_timeout,
            nodes,
            overrides,
        };

        config.validate()?;
        Ok(config)
    }

    /// Kubeconfig handed to clusterloader2. `None` means in-cluster configuration.
    pub fn kubeconfig_path(&self) -> Option<&Path> {
        self.kubeconfig_path.as_deref()
    }

    /// Location of the clusterloader2 executable (downloaded there when missing).
    pub fn loader_path(&self) -> &Path {
        &self.loader_path
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Test configuration passed through `--testconfig`. Must exist before `start`.
    pub fn test_config_path(&self) -> &Path {
        &self.test_config_path
    }

    /// Report directory passed through `--report-dir`.
    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// File that collects the combined output of every run, if any.
    pub fn logs_path(&self) -> Option<&Path> {
        self.logs_path.as_deref()
    }

    /// Number of back-to-back runs.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Deadline bounding the whole sequence of runs.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upper bound for a single run, still capped by the global deadline.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Node count passed through `--nodes`.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn overrides(&self) -> &TestOverrides {
        &self.overrides
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        ensure_path(&self.loader_path, "loader_path")?;
        ensure_path(&self.test_config_path, "test_config_path")?;
        ensure_path(&self.report_dir, "report_dir")?;
        validate_url(&self.download_url)?;

        if self.timeout.is_zero() {
            bail!("timeout must be greater than 0");
        }

        if self.attempt_timeout.is_zero() {
            bail!("attempt_timeout must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoaderConfigBuilder {
    kubeconfig_path: Option<PathBuf>,
    loader_path: Option<PathBuf>,
    download_url: Option<String>,
    test_config_path: Option<PathBuf>,
    report_dir: Option<PathBuf>,
    logs_path: Option<PathBuf>,
    runs: Option<usize>,
    timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    nodes: Option<usize>,
    overrides: Option<TestOverrides>,
}

impl LoaderConfigBuilder {
    pub fn kubeconfig_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig_path = Some(path.into());
        self
    }

    pub fn loader_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader_path = Some(path.into());
        self
    }

    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn test_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_config_path = Some(path.into());
        self
    }

    pub fn report_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(path.into());
        self
    }

    pub fn logs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.logs_path = Some(path.into());
        self
    }

    pub fn runs(mut self, runs: usize) -> Self {
        self.runs = Some(runs);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn nodes(mut self, nodes: usize) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn overrides(mut self, overrides: TestOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn build(self) -> Result<LoaderConfig> {
        let params = LoaderConfigParams {
            kubeconfig_path: self.kubeconfig_path,
            loader_path: self.loader_path.context("loader_path is required")?,
            download_url: self.download_url.context("download_url is required")?,
            test_config_path: self
                .test_config_path
                .context("test_config_path is required")?,
            report_dir: self.report_dir.context("report_dir is required")?,
            logs_path: self.logs_path,
            runs: self.runs.unwrap_or(DEFAULT_RUNS),
            timeout: self
                .timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            attempt_timeout: self
                .attempt_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS)),
            nodes: self.nodes.unwrap_or(DEFAULT_NODES),
            overrides: self.overrides.unwrap_or_default(),
        };

        LoaderConfig::new(params)
    }
}

fn ensure_path(path: &Path, field: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("download_url must start with http:// or https://");
    }
    Ok(())
}
