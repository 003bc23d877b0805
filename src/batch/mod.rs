pub mod cache;


use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::{Id, JoinError, JoinSet};

use crate::batch::cache::{DEFAULT_CACHE_TTL, ResultCache, cache_key};
use crate::discovery::{DiscoveryResult, discover};
use crate::inventory::DeviceConfigSample;
use crate::reconcile::{Reconciler, ValidationResult};
use crate::registry::DhcpRegistry;

pub const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device_name: String,
    pub dhcp_hostname: String,
    pub discovery: DiscoveryResult,
    pub validation: ValidationResult,
    /// Subnets confirmed by both the device and the registry.
    pub eligible_subnets: Vec<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub device_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub devices: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cached: usize,
}

/// Reports and failures in inventory order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub summary: BatchSummary,
    pub reports: Vec<DeviceReport>,
    pub failures: Vec<DeviceFailure>,
}

#[derive(Debug, Serialize)]
pub struct Feed<'a> {
    pub generated_at: DateTime<Utc>,
    pub summary: &'a BatchSummary,
    pub devices: &'a [DeviceReport],
    pub failures: &'a [DeviceFailure],
}

impl BatchOutcome {
    pub fn feed(&self) -> Feed<'_> {
        Feed {
            generated_at: Utc::now(),
            summary: &self.summary,
            devices: &self.reports,
            failures: &self.failures,
        }
    }

    pub fn write_feed<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, &self.feed())?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

pub struct BatchRunner<R, C> {
    reconciler: Arc<Reconciler<R>>,
    cache: Arc<C>,
    workers: usize,
    cache_ttl: Duration,
}

impl<R, C> BatchRunner<R, C>
where
    R: DhcpRegistry + 'static,
    C: ResultCache + 'static,
{
    pub fn new(reconciler: Reconciler<R>, cache: C) -> Self {
        BatchRunner {
            reconciler: Arc::new(reconciler),
            cache: Arc::new(cache),
            workers: DEFAULT_WORKERS,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Validates every sample. A failing or panicking device is recorded and
    /// the rest carry on.
    pub async fn run(&self, samples: Vec<DeviceConfigSample>) -> BatchOutcome {
        info!("Validating {} devices with {} workers", samples.len(), self.workers);

        let mut tasks = JoinSet::new();
        let mut collector = Collector::new(samples.len());

        for (index, sample) in samples.into_iter().enumerate() {
            while tasks.len() >= self.workers {
                match tasks.join_next_with_id().await {
                    Some(joined) => collector.record(joined),
                    None => break,
                }
            }

            let reconciler = self.reconciler.clone();
            let cache = self.cache.clone();
            let ttl = self.cache_ttl;
            let device_name = sample.device_name.clone();

            let handle = tasks.spawn(async move {
                process_device(&reconciler, cache.as_ref(), ttl, &sample).await
            });
            collector.pending.insert(handle.id(), (index, device_name));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            collector.record(joined);
        }

        let outcome = collector.finish();
        let summary = &outcome.summary;
        info!(
            devices = summary.devices,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cached = summary.cached;
            "DHCP validation batch finished"
        );
        outcome
    }
}

async fn process_device<R: DhcpRegistry, C: ResultCache>(
    reconciler: &Reconciler<R>,
    cache: &C,
    ttl: Duration,
    sample: &DeviceConfigSample,
) -> Result<DeviceReport> {
    let key = cache_key(&sample.device_name);
    match cache.get(&key).await {
        Ok(Some(mut report)) => {
            log::debug!("Using cached validation for {}", sample.device_name);
            report.cached = true;
            return Ok(report);
        }
        Ok(None) => {}
        Err(e) => warn!("Ignoring cached validation for {}: {e:#}", sample.device_name),
    }

    let discovery = discover(&sample.device_name, &sample.raw_config_text);
    let hostname = sample.dhcp_hostname();
    log::debug!(
        "{} discovered IPv4 [{}] IPv6 [{}]",
        sample.device_name,
        discovery.public_ipv4_cidrs().collect::<Vec<_>>().join(", "),
        discovery.public_ipv6_cidrs().collect::<Vec<_>>().join(", ")
    );
    let validation = reconciler.reconcile_discovery(hostname, &discovery).await;

    let eligible_subnets = validation
        .matched_ipv4
        .iter()
        .chain(&validation.ipv6_matched)
        .cloned()
        .collect();

    info!(
        device = sample.device_name.as_str(),
        vendor = discovery.vendor.as_str(),
        found = discovery.found,
        has_dhcp = validation.has_dhcp,
        matched = validation.matched_ipv4.len(),
        missing = validation.missing_in_dhcp.len(),
        extra = validation.extra_in_dhcp.len();
        "Validated device"
    );

    let report = DeviceReport {
        device_name: sample.device_name.clone(),
        dhcp_hostname: hostname.to_string(),
        discovery,
        validation,
        eligible_subnets,
        cached: false,
    };

    cache.set(&key, &report, ttl).await?;
    Ok(report)
}

struct Collector {
    devices: usize,
    pending: HashMap<Id, (usize, String)>,
    reports: Vec<(usize, DeviceReport)>,
    failures: Vec<(usize, DeviceFailure)>,
}

impl Collector {
    fn new(devices: usize) -> Self {
        Collector {
            devices,
            pending: HashMap::new(),
            reports: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, joined: std::result::Result<(Id, Result<DeviceReport>), JoinError>) {
        let (id, outcome) = match joined {
            Ok((id, Ok(report))) => (id, Ok(report)),
            Ok((id, Err(e))) => (id, Err(format!("{e:#}"))),
            Err(e) if e.is_panic() => (e.id(), Err("worker panicked".to_string())),
            Err(e) => (e.id(), Err(e.to_string())),
        };

        let Some((index, device_name)) = self.pending.remove(&id) else {
            return;
        };

        match outcome {
            Ok(report) => self.reports.push((index, report)),
            Err(error) => {
                error!("Validation of {device_name} failed: {error}");
                self.failures.push((index, DeviceFailure { device_name, error }));
            }
        }
    }

    fn finish(mut self) -> BatchOutcome {
        self.reports.sort_by_key(|(index, _)| *index);
        self.failures.sort_by_key(|(index, _)| *index);

        let summary = BatchSummary {
            devices: self.devices,
            succeeded: self.reports.len(),
            failed: self.failures.len(),
            cached: self.reports.iter().filter(|(_, r)| r.cached).count(),
        };

        BatchOutcome {
            summary,
            reports: self.reports.into_iter().map(|(_, r)| r).collect(),
            failures: self.failures.into_iter().map(|(_, f)| f).collect(),
        }
    }
}
