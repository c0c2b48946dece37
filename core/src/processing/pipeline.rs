//! Two-worker acquisition/detection pipeline.
//!
//! Requests flow orchestrator -> acquisition -> detection -> orchestrator over
//! bounded channels; each worker forwards the shutdown sentinel downstream
//! before exiting, and joining a worker is its acknowledgement.

use crate::interface::source::{SampleSource, StimulusSource};
use crate::prelude::{
    PipelineStage, SampleBlock, SamplingConfig, SenseError, SenseResult, StatisticVector,
    StimulusLevel,
};
use crate::processing::acquisition::{AcquisitionRequest, AcquisitionStage};
use crate::processing::detection::DetectionStage;
use crate::telemetry::log::LogManager;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// Capacity of the request and block channels.
pub const STAGE_CHANNEL_CAPACITY: usize = 2;

/// Work item or shutdown sentinel travelling between stages.
#[derive(Debug)]
pub enum StageMessage<T> {
    Task(T),
    Shutdown,
}

/// What the acquisition worker hands to the detection worker.
#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(SampleBlock),
    Failed {
        level: StimulusLevel,
        error: SenseError,
    },
}

/// Result delivered back to the orchestrator for one submitted level.
#[derive(Debug)]
pub enum DetectionOutcome {
    Computed {
        level: StimulusLevel,
        vectors: Vec<StatisticVector>,
        /// Raw block, only when the campaign keeps raw captures.
        block: Option<SampleBlock>,
    },
    Failed {
        level: StimulusLevel,
        error: SenseError,
    },
}

impl DetectionOutcome {
    pub fn level(&self) -> StimulusLevel {
        match self {
            DetectionOutcome::Computed { level, .. } | DetectionOutcome::Failed { level, .. } => {
                *level
            }
        }
    }
}

/// Handle held by the orchestrator on the two running workers.
pub struct Pipeline {
    requests: mpsc::Sender<StageMessage<AcquisitionRequest>>,
    results: mpsc::UnboundedReceiver<DetectionOutcome>,
    acquisition: JoinHandle<SenseResult<()>>,
    detection: JoinHandle<SenseResult<()>>,
}

impl Pipeline {
    /// Initializes both stages and starts one thread per stage.
    pub fn spawn<S, G>(
        mut acquisition: AcquisitionStage<S, G>,
        mut detection: DetectionStage,
        config: &SamplingConfig,
        keep_raw: bool,
    ) -> SenseResult<Self>
    where
        S: SampleSource + 'static,
        G: StimulusSource + 'static,
    {
        acquisition.initialize(config)?;
        detection.initialize(config)?;

        let (request_tx, request_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (block_tx, block_rx) = mpsc::channel(STAGE_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let acquisition = thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || run_acquisition(acquisition, request_rx, block_tx))?;
        let detection = thread::Builder::new()
            .name("detection".into())
            .spawn(move || run_detection(detection, block_rx, result_tx, keep_raw))?;

        Ok(Self {
            requests: request_tx,
            results: result_rx,
            acquisition,
            detection,
        })
    }

    /// Queues one level; blocks while the request channel is full.
    pub fn submit(&self, request: AcquisitionRequest) -> SenseResult<()> {
        self.requests
            .blocking_send(StageMessage::Task(request))
            .map_err(|_| SenseError::ChannelClosed("acquisition worker has stopped".into()))
    }

    /// Next finished result, if one is already available.
    pub fn try_next(&mut self) -> Option<DetectionOutcome> {
        self.results.try_recv().ok()
    }

    /// Waits for the next result; `None` once the detection worker has exited.
    pub fn next_result(&mut self) -> Option<DetectionOutcome> {
        self.results.blocking_recv()
    }

    /// Sends the sentinel, joins both workers and returns results not yet consumed.
    pub fn shutdown(self) -> SenseResult<Vec<DetectionOutcome>> {
        let Pipeline {
            requests,
            mut results,
            acquisition,
            detection,
        } = self;

        // a worker that already stopped reports its own error through join
        let _ = requests.blocking_send(StageMessage::Shutdown);
        drop(requests);

        let acquisition = join_worker("acquisition", acquisition);
        let detection = join_worker("detection", detection);

        let mut remaining = Vec::new();
        while let Some(outcome) = results.blocking_recv() {
            remaining.push(outcome);
        }

        acquisition?;
        detection?;
        Ok(remaining)
    }
}

fn join_worker(name: &str, handle: JoinHandle<SenseResult<()>>) -> SenseResult<()> {
    handle
        .join()
        .map_err(|_| SenseError::Internal(format!("{} worker panicked", name)))?
}

fn run_acquisition<S: SampleSource, G: StimulusSource>(
    mut stage: AcquisitionStage<S, G>,
    mut inbox: mpsc::Receiver<StageMessage<AcquisitionRequest>>,
    outbox: mpsc::Sender<StageMessage<CaptureOutcome>>,
) -> SenseResult<()> {
    let logger = LogManager::new("acquisition");
    let closed = || SenseError::ChannelClosed("detection worker has stopped".into());

    loop {
        // a dropped request sender counts as shutdown
        let request = match inbox.blocking_recv() {
            Some(StageMessage::Task(request)) => request,
            Some(StageMessage::Shutdown) | None => break,
        };

        let level = request.level;
        let outcome = match stage.execute(request) {
            Ok(block) => CaptureOutcome::Captured(block),
            Err(error) => {
                logger.warn(&format!("capture at {} failed: {}", level, error));
                CaptureOutcome::Failed { level, error }
            }
        };
        if outbox.blocking_send(StageMessage::Task(outcome)).is_err() {
            stage.cleanup();
            return Err(closed());
        }
    }

    stage.cleanup();
    outbox
        .blocking_send(StageMessage::Shutdown)
        .map_err(|_| closed())?;
    logger.detail("acquisition worker stopped");
    Ok(())
}

fn run_detection(
    mut stage: DetectionStage,
    mut inbox: mpsc::Receiver<StageMessage<CaptureOutcome>>,
    outbox: mpsc::UnboundedSender<DetectionOutcome>,
    keep_raw: bool,
) -> SenseResult<()> {
    let logger = LogManager::new("detection");

    loop {
        let captured = match inbox.blocking_recv() {
            Some(StageMessage::Task(captured)) => captured,
            Some(StageMessage::Shutdown) | None => break,
        };

        let outcome = match captured {
            CaptureOutcome::Captured(block) => {
                let level = block.level();
                match stage.compute(&block) {
                    Ok(vectors) => DetectionOutcome::Computed {
                        level,
                        vectors,
                        block: keep_raw.then_some(block),
                    },
                    Err(error) => {
                        logger.warn(&format!("detection at {} failed: {}", level, error));
                        DetectionOutcome::Failed { level, error }
                    }
                }
            }
            CaptureOutcome::Failed { level, error } => DetectionOutcome::Failed { level, error },
        };

        if outbox.send(outcome).is_err() {
            stage.cleanup();
            return Err(SenseError::ChannelClosed(
                "orchestrator stopped receiving results".into(),
            ));
        }
    }

    stage.cleanup();
    logger.detail("detection worker stopped");
    Ok(())
}
