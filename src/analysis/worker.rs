//! Background execution of analysis runs.
//!
//! [`spawn_analysis`] runs [`run_analysis_with_candidates`] on its own
//! thread and reports back only through a channel of [`RunEvent`]s, so the
//! caller's control thread is never blocked and never has its state touched
//! from the worker. Every event carries the [`RunId`] it belongs to;
//! consumers drop events from runs they no longer care about.
//!
//! Event order per run: at most one [`RunEvent::CurrentImage`] (single-target
//! runs only), then exactly one of [`RunEvent::Completed`] or
//! [`RunEvent::Failed`].

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use tracing::debug;

use super::run::{AnalysisConfig, AnalysisRun, RunId, run_analysis_with_candidates};
use crate::codec::{Codec, QualityLevel};
use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;

/// Notification from a background run.
#[derive(Debug)]
pub enum RunEvent {
    /// A single-target run produced a new working image.
    CurrentImage {
        /// Run that produced it.
        run_id: RunId,
        /// Decoded candidate.
        image: PixelBuffer,
        /// Quality it was encoded at.
        quality: QualityLevel,
        /// Codec format the quality applies to.
        format: String,
    },
    /// The run finished (possibly with per-target failures).
    Completed {
        /// Run identifier.
        run_id: RunId,
        /// The results.
        run: Box<AnalysisRun>,
    },
    /// The run aborted.
    Failed {
        /// Run identifier.
        run_id: RunId,
        /// Why.
        error: Error,
    },
}

impl RunEvent {
    /// Run the event belongs to.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        match self {
            Self::CurrentImage { run_id, .. }
            | Self::Completed { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }
}

/// Handle to a spawned run.
#[derive(Debug)]
pub struct RunTicket {
    id: RunId,
    thread: JoinHandle<()>,
}

impl RunTicket {
    /// Identifier of the spawned run.
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Block until the worker thread exits.
    pub fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| Error::WorkerDisconnected)
    }
}

/// Start an analysis on a background thread, delivering events to `events`.
pub fn spawn_analysis(
    codec: Arc<dyn Codec>,
    source: Arc<PixelBuffer>,
    config: AnalysisConfig,
    events: Sender<RunEvent>,
) -> Result<RunTicket> {
    let id = RunId::next();
    let thread = std::thread::Builder::new()
        .name(format!("rd-analysis-{}", id.get()))
        .spawn(move || execute(id, codec.as_ref(), source, &config, &events))?;
    Ok(RunTicket { id, thread })
}

/// Start an analysis with a private channel and wait for it to finish.
///
/// Returns the run and, for single-target runs, the candidate that would
/// have been offered as the new working image.
pub fn analyze_in_background(
    codec: Arc<dyn Codec>,
    source: Arc<PixelBuffer>,
    config: AnalysisConfig,
) -> Result<(AnalysisRun, Option<(PixelBuffer, QualityLevel)>)> {
    let (tx, rx) = mpsc::channel();
    let ticket = spawn_analysis(codec, source, config, tx)?;
    let outcome = collect(ticket.id(), &rx);
    ticket.join()?;
    outcome
}

fn collect(
    id: RunId,
    rx: &Receiver<RunEvent>,
) -> Result<(AnalysisRun, Option<(PixelBuffer, QualityLevel)>)> {
    let mut current = None;
    for event in rx {
        if event.run_id() != id {
            continue;
        }
        match event {
            RunEvent::CurrentImage { image, quality, .. } => current = Some((image, quality)),
            RunEvent::Completed { run, .. } => return Ok((*run, current)),
            RunEvent::Failed { error, .. } => return Err(error),
        }
    }
    Err(Error::WorkerDisconnected)
}

fn execute(
    id: RunId,
    codec: &dyn Codec,
    source: Arc<PixelBuffer>,
    config: &AnalysisConfig,
    events: &Sender<RunEvent>,
) {
    let single_target = config.targets_kb.len() == 1;

    let event = match run_analysis_with_candidates(codec, source, config, id) {
        Ok(output) => {
            if single_target {
                if let Some(candidate) = output.candidates.into_iter().next() {
                    let current = RunEvent::CurrentImage {
                        run_id: id,
                        image: candidate.image,
                        quality: candidate.quality,
                        format: codec.format().to_string(),
                    };
                    if events.send(current).is_err() {
                        debug!(run = %id, "event receiver dropped");
                        return;
                    }
                }
            }
            RunEvent::Completed {
                run_id: id,
                run: Box::new(output.run),
            }
        }
        Err(error) => RunEvent::Failed { run_id: id, error },
    };

    if events.send(event).is_err() {
        debug!(run = %id, "event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CallbackCodec, JpegCodec};

    fn codec() -> Arc<dyn Codec> {
        Arc::new(JpegCodec::new())
    }

    #[test]
    fn test_single_target_emits_current_image_first() {
        let (tx, rx) = mpsc::channel();
        let source = Arc::new(PixelBuffer::solid_rgb(32, 32, [10, 200, 30]));
        let config = AnalysisConfig::builder().targets_kb(vec![30]).build();
        let ticket = spawn_analysis(codec(), source, config, tx).unwrap();
        let id = ticket.id();
        ticket.join().unwrap();

        let events: Vec<RunEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.run_id() == id));
        match &events[0] {
            RunEvent::CurrentImage {
                image,
                quality,
                format,
                ..
            } => {
                assert_eq!(image.shape(), (32, 32, 3));
                assert_eq!(*quality, QualityLevel::MAX);
                assert_eq!(format, "jpeg");
            }
            other => panic!("unexpected first event: {other:?}"),
        }
        assert!(matches!(events[1], RunEvent::Completed { .. }));
    }

    #[test]
    fn test_multi_target_has_no_current_image() {
        let source = Arc::new(PixelBuffer::solid_rgb(16, 16, [0, 0, 0]));
        let config = AnalysisConfig::builder().targets_kb(vec![30, 100]).build();
        let (run, current) = analyze_in_background(codec(), source, config).unwrap();
        assert_eq!(run.results.len(), 2);
        assert!(current.is_none());
    }

    #[test]
    fn test_failure_is_reported() {
        let source = Arc::new(PixelBuffer::solid_rgb(16, 16, [0, 0, 0]));
        let config = AnalysisConfig::builder().targets_kb(vec![0]).build();
        let result = analyze_in_background(codec(), source, config);
        assert!(matches!(result, Err(Error::InvalidTarget(0))));
    }

    #[test]
    fn test_failed_single_target_has_no_current_image() {
        let broken: Arc<dyn Codec> = Arc::new(CallbackCodec::new(
            "broken",
            "broken",
            Box::new(|_, _| Ok(vec![0u8; 4])),
            Box::new(|_| Err(Error::Decode("nope".to_string()))),
        ));
        let source = Arc::new(PixelBuffer::solid_rgb(8, 8, [0, 0, 0]));
        let config = AnalysisConfig::builder().targets_kb(vec![1]).build();
        let (run, current) = analyze_in_background(broken, source, config).unwrap();
        assert!(current.is_none());
        assert!(run.results.is_empty());
        assert_eq!(run.failures.len(), 1);
    }

    #[test]
    fn test_runs_share_channel() {
        let (tx, rx) = mpsc::channel();
        let source = Arc::new(PixelBuffer::solid_rgb(16, 16, [9, 9, 9]));
        let config = AnalysisConfig::builder().targets_kb(vec![30]).build();
        let a = spawn_analysis(codec(), Arc::clone(&source), config.clone(), tx.clone()).unwrap();
        let b = spawn_analysis(codec(), source, config, tx).unwrap();
        let (ida, idb) = (a.id(), b.id());
        assert_ne!(ida, idb);
        a.join().unwrap();
        b.join().unwrap();

        let ids: Vec<RunId> = rx.try_iter().map(|e| e.run_id()).collect();
        assert_eq!(ids.iter().filter(|&&i| i == ida).count(), 2);
        assert_eq!(ids.iter().filter(|&&i| i == idb).count(), 2);
    }
}
