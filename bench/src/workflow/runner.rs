use crate::generator::{synthetic_bench, synthetic_stream_bench};
use crate::instrument::{CaptureTool, ScpiGenerator};
use crate::workflow::config::{BenchConfig, CampaignTemplate, WorkflowConfig};
use anyhow::{anyhow, bail, Context};
use sensecore::campaign::{Campaign, CampaignOutcome, CampaignPool, CampaignSpec, TaskStatus};
use sensecore::interface::{CancellationToken, SampleSource, StimulusSource, StreamingSource};
use std::path::Path;
use std::str::FromStr;

/// One campaign bound to one bench, ready to be handed to a pool worker.
#[derive(Clone, Debug)]
pub struct CampaignTask {
    pub label: String,
    pub spec: CampaignSpec,
    pub bench: BenchConfig,
}

/// Every `count`-th task starting at `index`, parsed from `index:count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskSlice {
    pub index: usize,
    pub count: usize,
}

impl TaskSlice {
    pub fn all() -> Self {
        Self { index: 0, count: 1 }
    }

    pub fn select<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .enumerate()
            .filter(|(position, _)| position % self.count == self.index)
            .map(|(_, item)| item)
            .collect()
    }
}

impl FromStr for TaskSlice {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (index, count) = text
            .split_once(':')
            .ok_or_else(|| anyhow!("task slice {:?} is not of the form i:n", text))?;
        let index: usize = index
            .trim()
            .parse()
            .with_context(|| format!("task slice index {:?}", index))?;
        let count: usize = count
            .trim()
            .parse()
            .with_context(|| format!("task slice count {:?}", count))?;
        if count == 0 || index >= count {
            bail!("task slice {}:{} selects nothing", index, count);
        }
        Ok(Self { index, count })
    }
}

/// One task per (bench, sampling pair), writing under `output_dir/<campaign>`.
pub fn expand(template: &CampaignTemplate, output_dir: &Path) -> Vec<CampaignTask> {
    let levels = template.levels.expand();
    let mut tasks = Vec::with_capacity(template.benches.len() * template.rates.len());
    for bench in &template.benches {
        for rate in &template.rates {
            let label = format!(
                "{} {} fs={}MHz ns={}",
                template.name,
                bench.label(),
                rate.sample_rate_hz / 1e6,
                rate.window_len
            );
            tasks.push(CampaignTask {
                spec: CampaignSpec {
                    name: label.clone(),
                    sampling: template.sampling(rate),
                    levels: levels.clone(),
                    detectors: template.detectors.clone(),
                    output_dir: output_dir.join(&template.name),
                    keep_raw: template.keep_raw,
                    failure_policy: template.failure_policy,
                },
                bench: bench.clone(),
                label,
            });
        }
    }
    tasks
}

type BenchPair = (Box<dyn SampleSource>, Box<dyn StimulusSource>);

fn open_bench(bench: &BenchConfig, cancel: CancellationToken) -> anyhow::Result<BenchPair> {
    match bench {
        BenchConfig::Synthetic(config) => match config.chunk_len {
            Some(chunk_len) => {
                let (device, stimulus) = synthetic_stream_bench(config, chunk_len)
                    .context("building streaming synthetic bench")?;
                Ok((
                    Box::new(StreamingSource::new(device, cancel)),
                    Box::new(stimulus),
                ))
            }
            None => {
                let (receiver, stimulus) = synthetic_bench(config);
                Ok((Box::new(receiver), Box::new(stimulus)))
            }
        },
        BenchConfig::External { capture, generator } => {
            let stimulus = ScpiGenerator::open(generator).with_context(|| {
                format!("opening signal generator {}", generator.device.display())
            })?;
            Ok((
                Box::new(CaptureTool::new(capture.clone())),
                Box::new(stimulus),
            ))
        }
    }
}

/// Builds the bench and runs one campaign to completion.
pub fn run_task(task: CampaignTask, cancel: CancellationToken) -> anyhow::Result<CampaignOutcome> {
    let (source, stimulus) =
        open_bench(&task.bench, cancel).with_context(|| format!("preparing {}", task.label))?;
    let mut campaign = Campaign::new(task.spec);
    campaign
        .run(source, stimulus)
        .with_context(|| format!("running {}", task.label))
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<CampaignOutcome>,
    /// Label and error chain of every failed task.
    pub failed: Vec<(String, String)>,
    pub cancelled: Vec<String>,
}

pub struct Runner {
    config: WorkflowConfig,
    pool: CampaignPool,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> anyhow::Result<Self> {
        let pool = CampaignPool::new(config.pool_size).context("creating campaign pool")?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Cancels every task that has not started yet.
    pub fn cancellation(&self) -> CancellationToken {
        self.pool.cancellation()
    }

    pub fn plan(&self, name: &str, slice: TaskSlice) -> anyhow::Result<Vec<CampaignTask>> {
        let template = self.config.find(name).ok_or_else(|| {
            let known: Vec<&str> = self
                .config
                .campaigns
                .iter()
                .map(|campaign| campaign.name.as_str())
                .collect();
            anyhow!("unknown campaign {} (available: {})", name, known.join(", "))
        })?;
        Ok(slice.select(expand(template, &self.config.output_dir)))
    }

    pub fn execute(&self, tasks: Vec<CampaignTask>) -> anyhow::Result<RunSummary> {
        let cancel = self.pool.cancellation();
        let labelled = tasks
            .into_iter()
            .map(|task| (task.label.clone(), task))
            .collect();
        let outcomes = self
            .pool
            .run(labelled, move |task| run_task(task, cancel.clone()))
            .context("running campaign pool")?;

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome.status {
                TaskStatus::Completed(result) => summary.completed.push(result),
                TaskStatus::Failed(reason) => summary.failed.push((outcome.label, reason)),
                TaskStatus::Cancelled => summary.cancelled.push(outcome.label),
            }
        }
        Ok(summary)
    }
}
