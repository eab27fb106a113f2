use anyhow::Result;
use clap::Parser;
use clusterloader_runner::{init_tracing, Loader, LoaderConfig, TestOverrides};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(about = "Runs clusterloader2 back to back under a shared deadline")]
struct Args {
    /// Kubeconfig passed to clusterloader2 (in-cluster configuration when omitted)
    #[arg(long, env = "CL2_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Path of the clusterloader2 executable; downloaded there when missing
    #[arg(long, env = "CL2_PATH", default_value = "/tmp/clusterloader2")]
    clusterloader_path: PathBuf,

    /// Where to download clusterloader2 from
    #[arg(long, env = "CL2_DOWNLOAD_URL")]
    download_url: String,

    /// clusterloader2 test configuration (--testconfig)
    #[arg(long, env = "CL2_TEST_CONFIG")]
    test_config: PathBuf,

    /// clusterloader2 report directory (--report-dir)
    #[arg(long, env = "CL2_REPORT_DIR")]
    report_dir: PathBuf,

    /// File collecting the output of every run
    #[arg(long, env = "CL2_LOGS_PATH")]
    logs_path: Option<PathBuf>,

    /// Number of back-to-back runs
    #[arg(long, default_value = "1")]
    runs: usize,

    /// Deadline for all runs, in seconds
    #[arg(long, default_value = "1800")]
    timeout_secs: u64,

    /// Upper bound for one run, in seconds
    #[arg(long, default_value = "1200")]
    attempt_timeout_secs: u64,

    /// Number of nodes (--nodes)
    #[arg(long, default_value = "10")]
    nodes: usize,

    #[arg(long, default_value = "10")]
    nodes_per_namespace: usize,

    #[arg(long, default_value = "10")]
    pods_per_node: usize,

    #[arg(long, default_value = "25")]
    big_group_size: usize,

    #[arg(long, default_value = "10")]
    medium_group_size: usize,

    #[arg(long, default_value = "5")]
    small_group_size: usize,

    #[arg(long, default_value = "0")]
    small_stateful_sets_per_namespace: usize,

    #[arg(long, default_value = "0")]
    medium_stateful_sets_per_namespace: usize,

    #[arg(long)]
    cl2_enable_pvs: bool,

    #[arg(long)]
    prometheus_scrape_kube_proxy: bool,

    #[arg(long)]
    enable_system_pod_metrics: bool,
}

impl Args {
    fn to_loader_config(&self) -> Result<LoaderConfig> {
        let overrides = TestOverrides {
            nodes_per_namespace: self.nodes_per_namespace,
            pods_per_node: self.pods_per_node,
            big_group_size: self.big_group_size,
            medium_group_size: self.medium_group_size,
            small_group_size: self.small_group_size,
            small_stateful_sets_per_namespace: self.small_stateful_sets_per_namespace,
            medium_stateful_sets_per_namespace: self.medium_stateful_sets_per_namespace,
            cl2_enable_pvs: self.cl2_enable_pvs,
            prometheus_scrape_kube_proxy: self.prometheus_scrape_kube_proxy,
            enable_system_pod_metrics: self.enable_system_pod_metrics,
        };

        let mut builder = LoaderConfig::builder()
            .loader_path(&self.clusterloader_path)
            .download_url(&self.download_url)
            .test_config_path(&self.test_config)
            .report_dir(&self.report_dir)
            .runs(self.runs)
            .timeout(Duration::from_secs(self.timeout_secs))
            .attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
            .nodes(self.nodes)
            .overrides(overrides);
        if let Some(kubeconfig) = &self.kubeconfig {
            builder = builder.kubeconfig_path(kubeconfig);
        }
        if let Some(logs_path) = &self.logs_path {
            builder = builder.logs_path(logs_path);
        }
        builder.build()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let loader = Loader::new(args.to_loader_config()?)?;

    let stop = loader.stop_handle();
    let signals = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received; stopping after the in-flight run");
            stop.stop();
        }
    });

    let result = loader.start().await;
    signals.abort();
    loader.get_results();

    let snapshot = loader.telemetry().snapshot();
    tracing::info!(
        state = ?loader.state(),
        runs = loader.config().runs(),
        attempts_started = snapshot.attempts_started,
        attempts_succeeded = snapshot.attempts_succeeded,
        attempts_failed = snapshot.attempts_failed,
        attempts_cancelled = snapshot.attempts_cancelled,
        "cluster loader finished"
    );

    result.map_err(Into::into)
}
