//! Batch coordination: fan one conversion unit out per file, join them all,
//! and fold the outcomes back into input order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, debug, warn};

use crate::config::ConversionConfig;
use crate::error::{Result, FastConvertError, ErrorContext};
use crate::processing::{CancellationFlag, ConversionOutcome, ConversionUnit, FileDescriptor};

pub mod slots;

pub use slots::*;

/// Aggregate outcome of one batch
#[derive(Debug)]
pub enum BatchResult {
    /// Every file converted; derivative paths in input order
    AllSucceeded(Vec<PathBuf>),
    /// At least one file failed; the failure at the lowest index
    Failed(FastConvertError),
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AllSucceeded(_))
    }

    /// Convert into a plain `Result` over the ordered paths
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        match self {
            Self::AllSucceeded(paths) => Ok(paths),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Runs one conversion unit per file of a batch and aggregates the outcomes
pub struct BatchCoordinator {
    config: Arc<ConversionConfig>,
    semaphore: Option<Arc<Semaphore>>,
}

impl BatchCoordinator {
    /// Create a coordinator bound to one upload directory and codec setting
    pub fn new(config: ConversionConfig) -> Self {
        let semaphore = config
            .max_concurrent
            .map(|limit| Arc::new(Semaphore::new(limit)));

        match config.max_concurrent {
            Some(limit) => info!("Batch coordinator limited to {} concurrent units", limit),
            None => debug!("Batch coordinator running one unit per file"),
        }

        Self {
            config: Arc::new(config),
            semaphore,
        }
    }

    /// Process a whole batch
    ///
    /// Returns `Err` only when the batch cannot start (empty batch, upload
    /// directory cannot be created) or the outcome bookkeeping breaks; unit
    /// failures are reported as [`BatchResult::Failed`].
    pub async fn process(&self, batch: Vec<FileDescriptor>) -> Result<BatchResult> {
        if batch.is_empty() {
            return Err(FastConvertError::bad_request("No files uploaded"));
        }

        let start_time = Instant::now();
        let total_files = batch.len();

        tokio::fs::create_dir_all(&self.config.upload_dir).await
            .with_file_context(self.config.upload_dir.clone())?;

        info!("Converting batch of {} files into {:?}", total_files, self.config.upload_dir);

        let slots = Arc::new(OutcomeSlots::new(total_files));
        let cancellation = CancellationFlag::new();
        let unit = {
            let unit = ConversionUnit::new(Arc::clone(&self.config));
            Arc::new(if self.config.fail_fast {
                unit.with_cancellation(cancellation.clone())
            } else {
                unit
            })
        };

        let mut tasks = Vec::with_capacity(total_files);

        for (index, descriptor) in batch.into_iter().enumerate() {
            let unit = Arc::clone(&unit);
            let slots = Arc::clone(&slots);
            let semaphore = self.semaphore.clone();
            let cancellation = cancellation.clone();
            let fail_fast = self.config.fail_fast;

            let task = tokio::spawn(async move {
                let outcome = match acquire(semaphore, index).await {
                    Ok(permit) => {
                        let outcome = unit.convert_async(descriptor, index).await;
                        drop(permit);
                        outcome
                    }
                    Err(error) => ConversionOutcome { index, result: Err(error) },
                };

                if let Err(error) = &outcome.result {
                    if !error.is_cancellation() {
                        warn!("Conversion of file {} failed: {}", index, error);
                        if fail_fast {
                            cancellation.cancel();
                        }
                    }
                }

                slots.record(outcome)
            });

            tasks.push(task);
        }

        // Wait for every unit, including those started after a failure
        let joined = futures::future::join_all(tasks).await;

        for (index, task_result) in joined.into_iter().enumerate() {
            match task_result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!("Outcome bookkeeping failed for file {}: {}", index, error),
                Err(join_error) => {
                    let outcome = ConversionOutcome {
                        index,
                        result: Err(FastConvertError::system(format!("Task join error: {}", join_error))),
                    };
                    if let Err(error) = slots.record(outcome) {
                        debug!("Slot {} already filled before join error: {}", index, error);
                    }
                }
            }
        }

        let slots = Arc::try_unwrap(slots)
            .map_err(|_| FastConvertError::system("Outcome slots still shared after join"))?;
        let result = assemble_outcomes(slots.into_outcomes()?);

        info!(
            "Batch of {} files {} in {:.2}s",
            total_files,
            if result.is_success() { "converted" } else { "failed" },
            start_time.elapsed().as_secs_f64()
        );

        Ok(result)
    }
}

async fn acquire(
    semaphore: Option<Arc<Semaphore>>,
    index: usize,
) -> Result<Option<tokio::sync::OwnedSemaphorePermit>> {
    match semaphore {
        Some(semaphore) => semaphore
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|e| FastConvertError::system(format!("Unit {} could not acquire a slot: {}", index, e))),
        None => Ok(None),
    }
}

/// Fold slot contents into a batch result
///
/// Successful paths keep slot order. The reported failure is the real failure
/// with the lowest index; cancellation markers are reported only when nothing
/// else failed, and an unwritten slot counts as a failure.
pub fn assemble_outcomes(outcomes: Vec<Option<ConversionOutcome>>) -> BatchResult {
    let mut paths = Vec::with_capacity(outcomes.len());
    let mut first_failure: Option<FastConvertError> = None;
    let mut first_cancellation: Option<FastConvertError> = None;

    for (index, slot) in outcomes.into_iter().enumerate() {
        match slot.map(|outcome| outcome.result) {
            Some(Ok(path)) => paths.push(path),
            Some(Err(error)) if error.is_cancellation() => {
                if first_cancellation.is_none() {
                    first_cancellation = Some(error);
                }
            }
            Some(Err(error)) => {
                if first_failure.is_none() {
                    first_failure = Some(error);
                }
            }
            None => {
                if first_failure.is_none() {
                    first_failure = Some(FastConvertError::system(
                        format!("Outcome slot {} was never written", index)
                    ));
                }
            }
        }
    }

    match first_failure.or(first_cancellation) {
        Some(error) => BatchResult::Failed(error),
        None => BatchResult::AllSucceeded(paths),
    }
}
