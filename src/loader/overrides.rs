//! Renders the `--testoverrides` document consumed by clusterloader2.

use super::error::RenderError;
use crate::host::FileSystem;
use crate::runtime::config::TestOverrides;
use std::fmt::{self, Write};
use std::path::PathBuf;

/// Produces one `KEY: value` line per knob, always in the same order.
pub fn render(overrides: &TestOverrides) -> Result<String, RenderError> {
    write_document(overrides).map_err(RenderError::Template)
}

fn write_document(o: &TestOverrides) -> Result<String, fmt::Error> {
    let mut doc = String::new();
    writeln!(doc, "NODES_PER_NAMESPACE: {}", o.nodes_per_namespace)?;
    writeln!(doc, "PODS_PER_NODE: {}", o.pods_per_node)?;
    writeln!(doc, "BIG_GROUP_SIZE: {}", o.big_group_size)?;
    writeln!(doc, "MEDIUM_GROUP_SIZE: {}", o.medium_group_size)?;
    writeln!(doc, "SMALL_GROUP_SIZE: {}", o.small_group_size)?;
    writeln!(
        doc,
        "SMALL_STATEFUL_SETS_PER_NAMESPACE: {}",
        o.small_stateful_sets_per_namespace
    )?;
    writeln!(
        doc,
        "MEDIUM_STATEFUL_SETS_PER_NAMESPACE: {}",
        o.medium_stateful_sets_per_namespace
    )?;
    writeln!(doc, "CL2_ENABLE_PVS: {}", o.cl2_enable_pvs)?;
    writeln!(
        doc,
        "PROMETHEUS_SCRAPE_KUBE_PROXY: {}",
        o.prometheus_scrape_kube_proxy
    )?;
    writeln!(
        doc,
        "ENABLE_SYSTEM_POD_METRICS: {}",
        o.enable_system_pod_metrics
    )?;
    Ok(doc)
}

/// Renders `overrides` and persists them to a fresh temp file, returning its path.
pub fn write_overrides(
    fs: &dyn FileSystem,
    overrides: &TestOverrides,
) -> Result<PathBuf, RenderError> {
    let document = render(overrides)?;
    tracing::info!(overrides = %document, "test overrides configuration");

    let path = fs.write_temp_file(document.as_bytes()).map_err(|err| {
        tracing::warn!(error = %err, "failed to write test overrides");
        RenderError::WriteTemp(err)
    })?;

    tracing::info!(path = %path.display(), "wrote test overrides file");
    Ok(path)
}
