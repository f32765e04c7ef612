//! Container metrics from the Docker CLI
//!
//! Runs `docker stats --no-stream` for CPU, memory and I/O counters and a
//! single `docker inspect` over all listed containers for restart counts,
//! state and image. `docker system df` supplies image and volume totals.
//! Human-readable sizes are converted back to bytes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ContainerSource, ImageSource};
use crate::models::{ContainerSample, ImageUsage};

/// Default upper bound for a single docker invocation
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

const INSPECT_FORMAT: &str = "{{.Id}} {{.RestartCount}} {{.State.Status}} {{.Config.Image}}";

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("docker {command} exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("docker {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
}

/// One line of `docker stats --format '{{json .}}'`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatsLine {
    #[serde(rename = "ID")]
    id: String,
    name: String,
    #[serde(rename = "CPUPerc", default)]
    cpu_perc: String,
    #[serde(default)]
    mem_perc: String,
    #[serde(default)]
    mem_usage: String,
    #[serde(rename = "NetIO", default)]
    net_io: String,
    #[serde(rename = "BlockIO", default)]
    block_io: String,
}

/// Fields taken from `docker inspect`
#[derive(Debug, Clone, PartialEq)]
struct InspectInfo {
    restart_count: u64,
    status: String,
    image: String,
}

impl StatsLine {
    fn to_sample(&self, info: &InspectInfo, timestamp: DateTime<Utc>) -> ContainerSample {
        let (mem_usage, mem_limit) = parse_size_pair(&self.mem_usage);
        let (net_rx, net_tx) = parse_size_pair(&self.net_io);
        let (blk_read, blk_write) = parse_size_pair(&self.block_io);

        ContainerSample {
            name: self.name.clone(),
            id: self.id.chars().take(12).collect(),
            image: info.image.clone(),
            status: info.status.clone(),
            restart_count: info.restart_count,
            cpu_pct: parse_percent(&self.cpu_perc).unwrap_or(0.0),
            mem_pct: parse_percent(&self.mem_perc).unwrap_or(0.0),
            mem_usage,
            mem_limit,
            net_rx,
            net_tx,
            blk_read,
            blk_write,
            timestamp,
        }
    }
}

/// Collector backed by the `docker` command line client
pub struct DockerCliCollector {
    binary: PathBuf,
    timeout: Duration,
}

impl DockerCliCollector {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set custom per-command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one docker command within the timeout, whatever its exit status
    async fn exec(&self, args: &[&str]) -> Result<std::process::Output, CollectError> {
        let mut command = Command::new(&self.binary);
        command.args(args).kill_on_drop(true);

        tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CollectError::Timeout {
                command: command_name(args),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| CollectError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })
    }

    async fn run(&self, args: &[&str]) -> Result<String, CollectError> {
        let output = self.exec(args).await?;

        if !output.status.success() {
            return Err(CollectError::Failed {
                command: command_name(args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Inspect all ids at once. Docker exits non-zero when any id has gone
    /// away but still prints the records it found, so stdout is parsed
    /// regardless of the exit status.
    async fn inspect(&self, ids: &[&str]) -> Result<HashMap<String, InspectInfo>, CollectError> {
        let mut args = vec!["inspect", "--format", INSPECT_FORMAT];
        args.extend_from_slice(ids);

        let output = self.exec(&args).await?;
        if !output.status.success() {
            warn!(
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "docker inspect reported missing containers"
            );
        }

        Ok(parse_inspect_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn command_name(args: &[&str]) -> String {
    args.first().copied().unwrap_or_default().to_string()
}

#[async_trait]
impl ContainerSource for DockerCliCollector {
    async fn collect(&self) -> Result<Vec<ContainerSample>> {
        let stdout = self
            .run(&["stats", "--no-stream", "--no-trunc", "--format", "{{json .}}"])
            .await?;
        let stats = parse_stats_output(&stdout);

        if stats.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = stats.iter().map(|s| s.id.as_str()).collect();
        let inspected = self.inspect(&ids).await?;

        // A container without an inspect record exited mid-cycle; reporting
        // it with a zero restart count would reset its restart baseline.
        let now = Utc::now();
        Ok(stats
            .iter()
            .filter_map(|line| match inspected.get(&line.id) {
                Some(info) => Some(line.to_sample(info, now)),
                None => {
                    debug!(container = %line.name, "Dropping container without inspect record");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl ImageSource for DockerCliCollector {
    /// Image, build cache, volume and container writable-layer sizes from
    /// `docker system df`
    async fn collect_images(&self) -> Result<ImageUsage> {
        let stdout = self
            .run(&["system", "df", "--format", "{{json .}}"])
            .await?;
        Ok(parse_system_df_output(&stdout))
    }
}

/// One line of `docker system df --format '{{json .}}'`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SystemDfLine {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    total_count: String,
    #[serde(default)]
    size: String,
}

fn parse_system_df_output(stdout: &str) -> ImageUsage {
    let mut usage = ImageUsage::default();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(row) = serde_json::from_str::<SystemDfLine>(line) else {
            debug!(line = %line, "Skipping unparsable docker system df line");
            continue;
        };
        let count = row.total_count.trim().parse().unwrap_or(0);
        let size = parse_size(&row.size).unwrap_or(0);

        match row.kind.as_str() {
            "Images" => {
                usage.image_count = count;
                usage.image_size = size;
            }
            "Containers" => usage.container_rw_size = size,
            "Local Volumes" => {
                usage.volume_count = count;
                usage.volume_size = size;
            }
            "Build Cache" => usage.cache_size = size,
            other => debug!(kind = %other, "Unknown docker system df row"),
        }
    }

    usage
}

fn parse_stats_output(stdout: &str) -> Vec<StatsLine> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<StatsLine>(line) {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!(error = %e, line = %line, "Skipping unparsable docker stats line");
                None
            }
        })
        .collect()
}

fn parse_inspect_output(stdout: &str) -> HashMap<String, InspectInfo> {
    let mut map = HashMap::new();

    for line in stdout.lines() {
        let parts: Vec<&str> = line.trim().splitn(4, ' ').collect();
        if parts.len() < 3 {
            continue;
        }

        map.insert(
            parts[0].to_string(),
            InspectInfo {
                restart_count: parts[1].parse().unwrap_or(0),
                status: parts[2].to_string(),
                image: parts.get(3).map(|s| s.to_string()).unwrap_or_default(),
            },
        );
    }

    map
}

/// Parse a docker percentage such as `"85.20%"`. `"--"` yields `None`.
pub fn parse_percent(value: &str) -> Option<f64> {
    value.trim().trim_end_matches('%').trim().parse().ok()
}

/// Parse a docker size such as `"1.2kB"` or `"512MiB"` into bytes.
///
/// Docker prints network and block I/O in decimal units and memory in
/// binary units, so both families are accepted.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.trim().parse().ok()?;

    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "PB" => 1e15,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "PiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some((number * multiplier).round() as u64)
}

/// Parse `"<a> / <b>"` into two byte counts, 0 for unparsable halves
pub fn parse_size_pair(value: &str) -> (u64, u64) {
    let mut halves = value.split('/');
    let first = halves.next().and_then(parse_size).unwrap_or(0);
    let second = halves.next().and_then(parse_size).unwrap_or(0);
    (first, second)
}
