use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sensecore::analysis::{analyze_directory, analyze_vectors, write_report, AnalysisParams};
use sensecore::interface::CancellationToken;
use std::path::PathBuf;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{expand, Runner, TaskSlice};

mod benchmark;
mod generator;
mod instrument;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Spectrum-sensing campaign driver")]
struct Args {
    /// Load campaigns from a YAML workflow instead of the built-in set
    #[arg(long, global = true)]
    workflow: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available campaigns and how many tasks each expands to
    List,
    /// Run one named campaign on the task pool
    Run {
        name: String,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        pool_size: Option<usize>,
        /// Run only tasks i, i+n, i+2n, ...
        #[arg(long, value_name = "i:n")]
        slice: Option<TaskSlice>,
    },
    /// Calibrate thresholds and compute Pinmin for every campaign in a directory
    Analyze {
        dir: PathBuf,
        #[arg(long, default_value_t = 0.1)]
        pfa: f64,
        #[arg(long, default_value_t = 0.9)]
        pd: f64,
        /// Path loss between generator and receiver, in dB
        #[arg(long, default_value_t = 30.0)]
        attenuation: f64,
        /// Defaults to `<dir>/pinmin.tsv`
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print thresholds and curves as JSON instead of a summary table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Time each detector on Gaussian noise windows
    Benchmark {
        #[arg(long, value_delimiter = ',', default_values_t = [25_000, 50_000, 100_000])]
        window_lens: Vec<usize>,
        #[arg(long, value_delimiter = ',', default_values_t = [5, 10, 15, 20])]
        lags: Vec<usize>,
        #[arg(long, default_value_t = 10)]
        repeat: usize,
        #[arg(long, default_value_t = 100)]
        number: usize,
    },
}

fn load_workflow(path: Option<PathBuf>) -> anyhow::Result<WorkflowConfig> {
    match path {
        Some(path) => WorkflowConfig::load(path),
        None => Ok(WorkflowConfig::builtin()),
    }
}

/// Cancels tasks that have not started yet once Ctrl+C is received.
fn watch_interrupt(cancel: CancellationToken) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                if signal::ctrl_c().await.is_ok() {
                    log::warn!("[bench] interrupted, waiting for running campaigns");
                    cancel.cancel();
                }
            })
        })
        .context("spawning interrupt watcher")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::List => {
            let config = load_workflow(args.workflow)?;
            for template in &config.campaigns {
                println!(
                    "{}\t{} tasks\t{} levels\t{} detectors",
                    template.name,
                    expand(template, &config.output_dir).len(),
                    template.levels.expand().len(),
                    template.detectors.len()
                );
            }
        }
        Command::Run {
            name,
            output_dir,
            pool_size,
            slice,
        } => {
            let mut config = load_workflow(args.workflow)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(size) = pool_size {
                config.pool_size = size;
            }
            let runner = Runner::new(config)?;
            let tasks = runner.plan(&name, slice.unwrap_or_else(TaskSlice::all))?;
            let total = tasks.len();
            log::info!(
                "[bench] {}: {} tasks on {} workers",
                name,
                total,
                runner.config().pool_size
            );
            watch_interrupt(runner.cancellation())?;

            let summary = runner.execute(tasks)?;
            let params = AnalysisParams::default();
            for outcome in &summary.completed {
                for analysis in analyze_vectors(&outcome.vectors, &params)
                    .with_context(|| format!("analyzing {}", outcome.name))?
                {
                    println!(
                        "{}_{}\t{:.2}",
                        outcome.prefix, analysis.campaign, analysis.pinmin
                    );
                }
            }
            for label in &summary.cancelled {
                println!("cancelled\t{}", label);
            }
            for (label, reason) in &summary.failed {
                eprintln!("failed\t{}\t{}", label, reason);
            }
            if !summary.failed.is_empty() {
                bail!("{} of {} tasks failed", summary.failed.len(), total);
            }
        }
        Command::Analyze {
            dir,
            pfa,
            pd,
            attenuation,
            report,
            json,
        } => {
            let params = AnalysisParams {
                pfa,
                target_pd: pd,
                attenuation_db: attenuation,
            };
            let analyses = analyze_directory(&dir, &params)
                .with_context(|| format!("analyzing {}", dir.display()))?;
            let report = report.unwrap_or_else(|| dir.join("pinmin.tsv"));
            write_report(&report, &analyses)
                .with_context(|| format!("writing report {}", report.display()))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&analyses).context("encoding analyses")?
                );
                return Ok(());
            }
            for analysis in &analyses {
                println!(
                    "{}\tgamma0={:e}\tpinmin={:.2}",
                    analysis.campaign,
                    analysis.threshold.gamma0(),
                    analysis.pinmin
                );
            }
        }
        Command::Benchmark {
            window_lens,
            lags,
            repeat,
            number,
        } => {
            let plan = benchmark::BenchmarkPlan {
                detectors: sensecore::detectors::DetectorSpec::standard_suite(&lags),
                window_lens,
                repeat,
                number,
                ..benchmark::BenchmarkPlan::default()
            };
            for row in benchmark::run(&plan)? {
                println!("{}\t{}\t{:.3}", row.detector, row.window_len, row.micros);
            }
        }
    }

    Ok(())
}
