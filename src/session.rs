//! Editing-session state around analysis runs.
//!
//! [`EditSession`] owns the working image and the quality remembered from
//! the last single-target analysis. That quality is explicit session state:
//! it is set only by a `CurrentImage` event from the latest run, reused by
//! the next save into the codec's format, and cleared by every save, crop,
//! glare removal and history step.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::{Arc, mpsc};
//! use rd_budget::{AnalysisConfig, EditSession, JpegCodec};
//!
//! let codec = Arc::new(JpegCodec::new());
//! let mut session =
//!     EditSession::open("photo.png".as_ref(), codec, AnalysisConfig::default())?;
//! let (tx, rx) = mpsc::channel();
//! session.start_analysis(vec![100], tx)?;
//! for event in rx {
//!     session.apply_event(event)?;
//! }
//! session.save("photo.jpg".as_ref())?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;

use image::ExtendedColorType;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::run::{AnalysisConfig, AnalysisRun, RunId};
use crate::analysis::worker::{RunEvent, RunTicket, spawn_analysis};
use crate::codec::{Codec, QualityLevel};
use crate::edit::{CropStage, Cropper, GlareRemover};
use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;

/// Quality carried over from a single-target analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberedQuality {
    /// Quality the candidate was encoded at.
    pub quality: QualityLevel,
    /// Format the quality applies to.
    pub format: String,
}

/// Whether an event changed session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The event belonged to the latest run and was applied.
    Applied,
    /// The event came from a superseded run and was ignored.
    Stale,
}

/// What a save wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    /// Destination.
    pub path: PathBuf,
    /// Encode quality, when the destination format is the codec's.
    pub quality: Option<QualityLevel>,
    /// True if `quality` came from the last analysis.
    pub used_remembered: bool,
}

/// Working state of one editing session.
pub struct EditSession {
    codec: Arc<dyn Codec>,
    config: AnalysisConfig,
    source: Arc<PixelBuffer>,
    current: PixelBuffer,
    crop_step: u32,
    remembered: Option<RememberedQuality>,
    latest_run: Option<RunId>,
    analysis: Option<AnalysisRun>,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("codec", &self.codec.id())
            .field("source", &self.source)
            .field("current", &self.current)
            .field("crop_step", &self.crop_step)
            .field("remembered", &self.remembered)
            .field("latest_run", &self.latest_run)
            .finish_non_exhaustive()
    }
}

impl EditSession {
    /// Start a session on an already decoded image.
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>, image: PixelBuffer, config: AnalysisConfig) -> Self {
        Self {
            codec,
            config,
            current: image.clone(),
            source: Arc::new(image),
            crop_step: 1,
            remembered: None,
            latest_run: None,
            analysis: None,
        }
    }

    /// Start a session on an image file.
    pub fn open(path: &Path, codec: Arc<dyn Codec>, config: AnalysisConfig) -> Result<Self> {
        let image = PixelBuffer::open(path)?;
        info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "opened image"
        );
        Ok(Self::new(codec, image, config))
    }

    /// Configuration runs and saves use.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Image currently being edited.
    #[must_use]
    pub fn current(&self) -> &PixelBuffer {
        &self.current
    }

    /// Ground truth used for analysis.
    #[must_use]
    pub fn source(&self) -> &Arc<PixelBuffer> {
        &self.source
    }

    /// Quality remembered from the last single-target analysis.
    #[must_use]
    pub fn remembered_quality(&self) -> Option<&RememberedQuality> {
        self.remembered.as_ref()
    }

    /// Results of the latest completed run.
    #[must_use]
    pub fn analysis(&self) -> Option<&AnalysisRun> {
        self.analysis.as_ref()
    }

    /// Run whose events are currently accepted.
    #[must_use]
    pub fn latest_run(&self) -> Option<RunId> {
        self.latest_run
    }

    /// Stage the next automatic crop will look for.
    #[must_use]
    pub fn crop_stage(&self) -> CropStage {
        CropStage::from_step(self.crop_step)
    }

    /// Replace the source image, discarding all analysis state.
    pub fn replace_source(&mut self, image: PixelBuffer) {
        self.current = image.clone();
        self.source = Arc::new(image);
        self.crop_step = 1;
        self.remembered = None;
        self.latest_run = None;
        self.analysis = None;
    }

    /// Launch an analysis of the source image in the background.
    ///
    /// Events from earlier runs become stale.
    pub fn start_analysis(
        &mut self,
        targets_kb: Vec<u32>,
        events: Sender<RunEvent>,
    ) -> Result<RunTicket> {
        let config = self.config.with_targets(targets_kb);
        let ticket = spawn_analysis(
            Arc::clone(&self.codec),
            Arc::clone(&self.source),
            config,
            events,
        )?;
        self.latest_run = Some(ticket.id());
        self.analysis = None;
        Ok(ticket)
    }

    /// Apply a worker event on the caller's thread.
    ///
    /// # Errors
    ///
    /// Returns the run's error for a `Failed` event from the latest run.
    pub fn apply_event(&mut self, event: RunEvent) -> Result<EventDisposition> {
        if Some(event.run_id()) != self.latest_run {
            debug!(run = %event.run_id(), "ignoring event from stale run");
            return Ok(EventDisposition::Stale);
        }

        match event {
            RunEvent::CurrentImage {
                image,
                quality,
                format,
                ..
            } => {
                info!(quality = quality.get(), %format, "analysis candidate applied");
                self.current = image;
                self.remembered = Some(RememberedQuality { quality, format });
            }
            RunEvent::Completed { run, .. } => {
                self.analysis = Some(*run);
            }
            RunEvent::Failed { error, .. } => return Err(error),
        }
        Ok(EventDisposition::Applied)
    }

    /// Automatic border crop at the current stage.
    ///
    /// Returns the stage cropped, or `None` if no border was detected, in
    /// which case the next attempt starts again at the outer border.
    pub fn crop_auto(&mut self, cropper: &mut dyn Cropper) -> Result<Option<CropStage>> {
        self.remembered = None;
        let stage = self.crop_stage();

        let Some(outcome) = cropper.crop_next_stage(&self.current, stage)? else {
            info!(stage = stage.name(), "no border detected");
            self.crop_step = 1;
            return Ok(None);
        };

        debug!(
            stage = stage.name(),
            corners = ?outcome.corners,
            next_step = outcome.next_step,
            "auto crop"
        );
        self.current = outcome.image;
        self.crop_step += 1;
        Ok(Some(stage))
    }

    /// Manual crop, always starting from the uncropped source.
    pub fn crop_manual(&mut self, cropper: &mut dyn Cropper) -> Result<()> {
        self.remembered = None;
        let (image, corners) = cropper.manual_crop(&self.source)?;
        debug!(?corners, "manual crop");
        self.current = image;
        self.crop_step += 1;
        Ok(())
    }

    /// Glare removal; returns false if the remover was cancelled.
    pub fn remove_glare(&mut self, remover: &mut dyn GlareRemover) -> bool {
        self.remembered = None;
        match remover.remove_glare(&self.current) {
            Some(image) => {
                self.current = image;
                true
            }
            None => false,
        }
    }

    /// Replace the working image from an undo/redo history step.
    pub fn history_changed(&mut self, image: PixelBuffer) {
        self.remembered = None;
        self.current = image;
        self.crop_step = 1;
    }

    /// Write the working image to `path`.
    ///
    /// Paths with one of the codec's extensions are encoded with the
    /// remembered quality, or the configured default when none is
    /// remembered. Other extensions are written through the `image` crate.
    /// The remembered quality is cleared afterwards whether or not the
    /// write succeeded.
    pub fn save(&mut self, path: &Path) -> Result<SaveSummary> {
        let result = self.write(path);
        self.remembered = None;
        result
    }

    fn write(&self, path: &Path) -> Result<SaveSummary> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        if !self.codec.handles_extension(ext) {
            save_with_image_crate(&self.current, path)?;
            info!(path = %path.display(), "saved");
            return Ok(SaveSummary {
                path: path.to_path_buf(),
                quality: None,
                used_remembered: false,
            });
        }

        let remembered = self
            .remembered
            .as_ref()
            .filter(|r| r.format == self.codec.format())
            .map(|r| r.quality);
        let quality = remembered.unwrap_or(self.config.default_save_quality);

        let blob = self.codec.encode(&self.current, quality)?;
        std::fs::write(path, blob.as_bytes())?;
        info!(
            path = %path.display(),
            quality = quality.get(),
            remembered = remembered.is_some(),
            bytes = blob.len(),
            "saved"
        );

        Ok(SaveSummary {
            path: path.to_path_buf(),
            quality: Some(quality),
            used_remembered: remembered.is_some(),
        })
    }
}

fn save_with_image_crate(image: &PixelBuffer, path: &Path) -> Result<()> {
    let save_err = |reason: String| Error::ImageSave {
        path: path.to_path_buf(),
        reason,
    };
    let color = match image.channels() {
        1 => ExtendedColorType::L8,
        _ => ExtendedColorType::Rgb8,
    };
    let width = u32::try_from(image.width()).map_err(|e| save_err(e.to_string()))?;
    let height = u32::try_from(image.height()).map_err(|e| save_err(e.to_string()))?;
    image::save_buffer(path, image.as_bytes(), width, height, color)
        .map_err(|e| save_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::codec::JpegCodec;
    use crate::edit::{CropOutcome, Corners};

    fn session() -> EditSession {
        EditSession::new(
            Arc::new(JpegCodec::new()),
            PixelBuffer::solid_rgb(32, 32, [120, 60, 30]),
            AnalysisConfig::default(),
        )
    }

    /// Cropper that trims one pixel per side, or finds nothing.
    struct TrimCropper {
        detect: bool,
        stages: Vec<CropStage>,
    }

    impl Cropper for TrimCropper {
        fn crop_next_stage(
            &mut self,
            image: &PixelBuffer,
            stage: CropStage,
        ) -> Result<Option<CropOutcome>> {
            self.stages.push(stage);
            if !self.detect {
                return Ok(None);
            }
            let (h, w) = (image.height() - 2, image.width() - 2);
            Ok(Some(CropOutcome {
                image: PixelBuffer::solid_rgb(h, w, [1, 2, 3]),
                corners: Corners([
                    (1.0, 1.0),
                    (w as f32, 1.0),
                    (w as f32, h as f32),
                    (1.0, h as f32),
                ]),
                next_step: self.stages.len() as u32 + 1,
            }))
        }

        fn manual_crop(&mut self, image: &PixelBuffer) -> Result<(PixelBuffer, Corners)> {
            Ok((
                PixelBuffer::solid_rgb(image.height() / 2, image.width() / 2, [4, 5, 6]),
                Corners([(0.0, 0.0); 4]),
            ))
        }
    }

    struct Glare(Option<PixelBuffer>);

    impl GlareRemover for Glare {
        fn remove_glare(&mut self, _image: &PixelBuffer) -> Option<PixelBuffer> {
            self.0.take()
        }
    }

    fn run_single(session: &mut EditSession, target_kb: u32) {
        let (tx, rx) = mpsc::channel();
        let ticket = session.start_analysis(vec![target_kb], tx).unwrap();
        ticket.join().unwrap();
        for event in rx.try_iter() {
            assert_eq!(session.apply_event(event).unwrap(), EventDisposition::Applied);
        }
    }

    #[test]
    fn test_single_target_remembers_quality() {
        let mut s = session();
        run_single(&mut s, 30);
        let remembered = s.remembered_quality().unwrap();
        assert_eq!(remembered.quality, QualityLevel::MAX);
        assert_eq!(remembered.format, "jpeg");
        assert!(s.analysis().is_some());
    }

    #[test]
    fn test_stale_events_ignored() {
        let mut s = session();
        let (tx, rx) = mpsc::channel();
        let old = s.start_analysis(vec![30], tx.clone()).unwrap();
        let new = s.start_analysis(vec![30], tx).unwrap();
        let (old_id, new_id) = (old.id(), new.id());
        old.join().unwrap();
        new.join().unwrap();

        for event in rx.try_iter() {
            let id = event.run_id();
            let disposition = s.apply_event(event).unwrap();
            if id == old_id {
                assert_eq!(disposition, EventDisposition::Stale);
            } else {
                assert_eq!(id, new_id);
                assert_eq!(disposition, EventDisposition::Applied);
            }
        }
        assert_eq!(s.analysis().map(|r| r.id), Some(new_id));
    }

    #[test]
    fn test_failed_run_surfaces_error() {
        let mut s = session();
        let (tx, rx) = mpsc::channel();
        let ticket = s.start_analysis(vec![0], tx).unwrap();
        ticket.join().unwrap();
        let event = rx.recv().unwrap();
        assert!(matches!(s.apply_event(event), Err(Error::InvalidTarget(0))));
    }

    #[test]
    fn test_save_uses_remembered_then_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = EditSession::new(
            Arc::new(JpegCodec::new()),
            PixelBuffer::solid_rgb(32, 32, [120, 60, 30]),
            AnalysisConfig::builder()
                .default_save_quality(QualityLevel::new(90).unwrap())
                .build(),
        );
        run_single(&mut s, 30);

        let first = s.save(&dir.path().join("a.jpg")).unwrap();
        assert_eq!(first.quality, Some(QualityLevel::MAX));
        assert!(first.used_remembered);
        assert!(s.remembered_quality().is_none());

        let second = s.save(&dir.path().join("b.JPEG")).unwrap();
        assert_eq!(second.quality.map(QualityLevel::get), Some(90));
        assert!(!second.used_remembered);
        assert!(dir.path().join("b.JPEG").exists());
    }

    #[test]
    fn test_save_png_ignores_quality_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session();
        run_single(&mut s, 30);
        let path = dir.path().join("out.png");
        let summary = s.save(&path).unwrap();
        assert_eq!(summary.quality, None);
        assert!(s.remembered_quality().is_none());
        let reopened = PixelBuffer::open(&path).unwrap();
        assert_eq!(reopened.shape(), s.current().shape());
    }

    #[test]
    fn test_crop_stages_and_invalidation() {
        let mut s = session();
        run_single(&mut s, 30);
        let mut cropper = TrimCropper {
            detect: true,
            stages: Vec::new(),
        };

        assert_eq!(s.crop_auto(&mut cropper).unwrap(), Some(CropStage::Outer));
        assert!(s.remembered_quality().is_none());
        assert_eq!(s.current().shape(), (30, 30, 3));
        assert_eq!(s.crop_auto(&mut cropper).unwrap(), Some(CropStage::Inner));
        assert_eq!(s.current().shape(), (28, 28, 3));
        assert_eq!(cropper.stages, vec![CropStage::Outer, CropStage::Inner]);
    }

    #[test]
    fn test_crop_no_border_leaves_image() {
        let mut s = session();
        let mut cropper = TrimCropper {
            detect: false,
            stages: Vec::new(),
        };
        assert_eq!(s.crop_auto(&mut cropper).unwrap(), None);
        assert_eq!(s.current().shape(), (32, 32, 3));
        assert_eq!(s.crop_stage(), CropStage::Outer);

        cropper.detect = true;
        s.crop_auto(&mut cropper).unwrap();
        assert_eq!(s.crop_stage(), CropStage::Inner);
        cropper.detect = false;
        assert_eq!(s.crop_auto(&mut cropper).unwrap(), None);
        assert_eq!(s.crop_stage(), CropStage::Outer);
        assert_eq!(s.current().shape(), (30, 30, 3));
    }

    #[test]
    fn test_manual_crop_uses_source() {
        let mut s = session();
        let mut cropper = TrimCropper {
            detect: true,
            stages: Vec::new(),
        };
        s.crop_auto(&mut cropper).unwrap();
        s.crop_manual(&mut cropper).unwrap();
        assert_eq!(s.current().shape(), (16, 16, 3));
    }

    #[test]
    fn test_glare_and_history_invalidate() {
        let mut s = session();
        run_single(&mut s, 30);
        assert!(!s.remove_glare(&mut Glare(None)));
        assert!(s.remembered_quality().is_none());

        run_single(&mut s, 30);
        assert!(s.remove_glare(&mut Glare(Some(PixelBuffer::solid_rgb(8, 8, [0, 0, 0])))));
        assert_eq!(s.current().shape(), (8, 8, 3));

        run_single(&mut s, 30);
        s.history_changed(PixelBuffer::solid_rgb(32, 32, [0, 0, 0]));
        assert!(s.remembered_quality().is_none());
        assert_eq!(s.crop_stage(), CropStage::Outer);
    }

    #[test]
    fn test_replace_source_resets() {
        let mut s = session();
        run_single(&mut s, 30);
        s.replace_source(PixelBuffer::solid_rgb(10, 10, [0, 0, 0]));
        assert!(s.analysis().is_none());
        assert!(s.latest_run().is_none());
        assert!(s.remembered_quality().is_none());
        assert_eq!(s.source().shape(), (10, 10, 3));
    }
}
