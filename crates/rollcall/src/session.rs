//! The recognition loop: frames in, attendance marks out.

use crate::display::{Overlay, SessionKey, Viewer};
use crate::ledger::{Ledger, MarkOutcome};
use crate::notifier::{Notifier, NotifyReport};
use crate::report;
use crate::sheet::{SheetStore, TIME_FORMAT};
use chrono::{Local, NaiveTime};
use image::RgbImage;
use rollcall_core::{
    BoundingBox, DistanceEstimator, DistanceStatus, Embedding, FaceCatalog, FaceDetect,
    FaceEmbed, MatchOutcome, Matcher,
};
use rollcall_hw::frame::downscale;
use rollcall_hw::FrameSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not open video source: {0}")]
    CameraOpen(#[from] rollcall_hw::CameraError),
    #[error("could not open preview window: {0}")]
    Window(#[from] minifb::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `q` pressed.
    Quit,
    WindowClosed,
    /// The camera stopped delivering frames.
    ReadFailed,
    /// Headless runs with a configured duration.
    TimeLimit,
    /// The interrupt flag was raised (Ctrl-C).
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopped(StopReason),
}

/// One face found in a frame, in full-resolution coordinates.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
    pub distance_cm: Option<i32>,
    pub status: Option<DistanceStatus>,
    pub outcome: MatchOutcome,
}

impl DetectedFace {
    /// Only a known face at a good distance counts toward attendance.
    pub fn is_markable(&self) -> bool {
        self.status == Some(DistanceStatus::Good) && self.outcome.name().is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub faces: Vec<DetectedFace>,
    /// Set for this frame only; every face is still processed.
    pub multiple_faces: bool,
    pub marks: Vec<(String, MarkOutcome)>,
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionOutcome {
    pub reason: StopReason,
    pub frames: u64,
    pub notify: Option<NotifyReport>,
}

pub struct Session<'a, S: SheetStore> {
    detector: &'a mut dyn FaceDetect,
    embedder: &'a mut dyn FaceEmbed,
    catalog: &'a FaceCatalog,
    matcher: &'a dyn Matcher,
    estimator: DistanceEstimator,
    downscale: u32,
    ledger: &'a mut Ledger<S>,
    interrupt: Option<Arc<AtomicBool>>,
    state: SessionState,
}

impl<'a, S: SheetStore> Session<'a, S> {
    pub fn new(
        detector: &'a mut dyn FaceDetect,
        embedder: &'a mut dyn FaceEmbed,
        catalog: &'a FaceCatalog,
        matcher: &'a dyn Matcher,
        estimator: DistanceEstimator,
        ledger: &'a mut Ledger<S>,
    ) -> Self {
        Self {
            detector,
            embedder,
            catalog,
            matcher,
            estimator,
            downscale: 4,
            ledger,
            interrupt: None,
            state: SessionState::Running,
        }
    }

    /// Detection runs on a frame shrunk by this factor (minimum 1).
    pub fn with_downscale(mut self, factor: u32) -> Self {
        self.downscale = factor.max(1);
        self
    }

    /// Stop cleanly, with the final summary and alerts, once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Detect, embed, classify and match every face in `image`, marking
    /// attendance for known faces at a good distance.
    ///
    /// A detector failure yields an empty report; an embedder failure drops
    /// only the affected face.
    pub fn process_frame(&mut self, image: &RgbImage, now: NaiveTime) -> FrameReport {
        let small = downscale(image, self.downscale);
        let boxes = match self.detector.detect(&small) {
            Ok(boxes) => boxes,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed; frame skipped");
                return FrameReport::default();
            }
        };

        let mut report = FrameReport {
            multiple_faces: boxes.len() > 1,
            ..Default::default()
        };
        if report.multiple_faces {
            tracing::debug!(faces = boxes.len(), "multiple faces in frame");
        }

        for small_box in &boxes {
            let embedding = match self.embedder.embed(&small, small_box) {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding failed; face skipped");
                    continue;
                }
            };

            let bbox = small_box.scaled(self.downscale as f32);
            let distance_cm = self.estimator.estimate(bbox.height);
            let status = distance_cm.map(|d| self.estimator.classify(d));
            let outcome = self.matcher.find(&embedding, self.catalog);

            let face = DetectedFace {
                bbox,
                embedding,
                distance_cm,
                status,
                outcome,
            };
            if face.is_markable() {
                if let Some(name) = face.outcome.name() {
                    let mark = self.ledger.mark_present(name, now);
                    report.marks.push((name.to_string(), mark));
                }
            }
            report.faces.push(face);
        }

        report
    }

    /// Advance one frame. Returns the new state.
    pub fn step(
        &mut self,
        source: &mut dyn FrameSource,
        viewer: &mut dyn Viewer,
        overlay: &Overlay,
    ) -> SessionState {
        if self.state != SessionState::Running {
            return self.state;
        }
        if !viewer.is_open() {
            return self.stop(StopReason::WindowClosed);
        }

        let mut frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to grab frame");
                return self.stop(StopReason::ReadFailed);
            }
        };

        let now = Local::now().time();
        let faces = self.process_frame(&frame.image, now);
        for (name, mark) in &faces.marks {
            match mark {
                MarkOutcome::Marked { .. } => {
                    println!("Marked {name} as present at {}", now.format(TIME_FORMAT))
                }
                MarkOutcome::AlreadyMarked => println!("{name}'s attendance is already marked"),
                MarkOutcome::Suppressed | MarkOutcome::UnknownStudent => {}
            }
        }
        overlay.render(&mut frame.image, &faces);
        viewer.show(&frame.image);

        match viewer.poll_key() {
            Some(SessionKey::Quit) => self.stop(StopReason::Quit),
            Some(SessionKey::ShowStatus) => {
                report::print_summary(&self.ledger.summary());
                self.state
            }
            None => self.state,
        }
    }

    /// Run until stopped, then print the final summary and send absence
    /// alerts once when a notifier is given.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        viewer: &mut dyn Viewer,
        overlay: &Overlay,
        notifier: Option<&Notifier>,
        limit: Option<Duration>,
    ) -> SessionOutcome {
        let started = Instant::now();
        let mut frames = 0u64;
        tracing::info!(known_faces = self.catalog.len(), "attendance session started");

        let reason = loop {
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    self.stop(StopReason::TimeLimit);
                }
            }
            if self
                .interrupt
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                self.stop(StopReason::Interrupted);
            }
            if let SessionState::Stopped(reason) = self.step(source, viewer, overlay) {
                break reason;
            }
            frames += 1;
        };

        tracing::info!(?reason, frames, "attendance session stopped");
        report::print_summary(&self.ledger.summary());
        let notify = notifier.map(|n| n.notify_absentees(&*self.ledger));

        SessionOutcome {
            reason,
            frames,
            notify,
        }
    }

    fn stop(&mut self, reason: StopReason) -> SessionState {
        self.state = SessionState::Stopped(reason);
        self.state
    }
}
