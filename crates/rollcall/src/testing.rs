//! Test doubles for the hardware and model seams.

use crate::display::{SessionKey, Viewer};
use crate::notifier::{MailTransport, NotifyError};
use crate::sheet::{AttendanceRow, SheetError, SheetStore};
use image::RgbImage;
use lettre::Message;
use rollcall_core::{
    BoundingBox, DetectorError, Embedding, FaceDetect, FaceEmbed, RecognizerError,
};
use rollcall_hw::{CameraError, Frame, FrameSource};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub fn face_box(x: f32, y: f32, size: f32) -> BoundingBox {
    BoundingBox {
        x,
        y,
        width: size,
        height: size,
        confidence: 0.9,
        landmarks: Some([(x + size / 2.0, y + size / 2.0); 5]),
    }
}

/// Returns the same boxes for every frame.
pub struct FixedDetector {
    pub boxes: Vec<BoundingBox>,
    pub calls: usize,
}

impl FixedDetector {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self { boxes, calls: 0 }
    }

    pub fn one_face(size: f32) -> Self {
        Self::new(vec![face_box(4.0, 4.0, size)])
    }

    pub fn no_faces() -> Self {
        Self::new(Vec::new())
    }
}

impl FaceDetect for FixedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        self.calls += 1;
        Ok(self.boxes.clone())
    }
}

pub struct FailingDetector;

impl FaceDetect for FailingDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        Err(DetectorError::InferenceFailed("simulated".into()))
    }
}

/// Embeds a face as the normalized colour of the pixel at the box centre.
pub struct TintEmbedder;

impl FaceEmbed for TintEmbedder {
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let cx = ((face.x + face.width / 2.0) as u32).min(image.width().saturating_sub(1));
        let cy = ((face.y + face.height / 2.0) as u32).min(image.height().saturating_sub(1));
        let p = image.get_pixel(cx, cy);
        Ok(Embedding::new(p.0.iter().map(|&c| c as f32 / 255.0).collect()))
    }
}

/// Yields the queued images, then fails like an unplugged camera.
pub struct ScriptedSource {
    frames: VecDeque<RgbImage>,
    pub reads: usize,
}

impl ScriptedSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            reads: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.reads += 1;
        let image = self
            .frames
            .pop_front()
            .ok_or_else(|| CameraError::CaptureFailed("end of script".into()))?;
        Ok(Frame {
            image,
            timestamp: std::time::Instant::now(),
            sequence: self.reads as u32,
        })
    }
}

/// Replays one key poll result per shown frame.
#[derive(Default)]
pub struct ScriptedViewer {
    keys: VecDeque<Option<SessionKey>>,
    pub shown: usize,
    close_after: Option<usize>,
}

impl ScriptedViewer {
    pub fn with_keys(keys: Vec<Option<SessionKey>>) -> Self {
        Self {
            keys: keys.into(),
            ..Default::default()
        }
    }

    pub fn closing_after(frames: usize) -> Self {
        Self {
            close_after: Some(frames),
            ..Default::default()
        }
    }
}

impl Viewer for ScriptedViewer {
    fn show(&mut self, _frame: &RgbImage) {
        self.shown += 1;
    }

    fn poll_key(&mut self) -> Option<SessionKey> {
        self.keys.pop_front().flatten()
    }

    fn is_open(&self) -> bool {
        self.close_after.map_or(true, |n| self.shown < n)
    }
}

/// Records recipients; refuses delivery to one address.
#[derive(Default)]
pub struct RecordingTransport {
    fail_for: Option<String>,
    delivered: RefCell<Vec<String>>,
}

impl RecordingTransport {
    pub fn failing_for(address: &str) -> Self {
        Self {
            fail_for: Some(address.to_string()),
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.borrow().clone()
    }
}

impl MailTransport for RecordingTransport {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError> {
        let to: Vec<String> = message.envelope().to().iter().map(|a| a.to_string()).collect();
        if to.iter().any(|a| Some(a) == self.fail_for.as_ref()) {
            return Err(NotifyError::Transport("simulated connection refused".into()));
        }
        self.delivered.borrow_mut().extend(to);
        Ok(())
    }
}

impl<T: MailTransport + ?Sized> MailTransport for Rc<T> {
    fn deliver(&self, message: &Message) -> Result<(), NotifyError> {
        (**self).deliver(message)
    }
}

/// In-memory store with optional write failure injection.
#[derive(Default)]
pub struct MemorySheet {
    rows: RefCell<Option<Vec<AttendanceRow>>>,
    fail_writes: Cell<bool>,
    writes: Cell<usize>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<AttendanceRow>) -> Self {
        let sheet = Self::default();
        sheet.rows.replace(Some(rows));
        sheet
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn rows(&self) -> Vec<AttendanceRow> {
        self.rows.borrow().clone().unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl SheetStore for MemorySheet {
    fn exists(&self) -> bool {
        self.rows.borrow().is_some()
    }

    fn load(&self) -> Result<Vec<AttendanceRow>, SheetError> {
        self.rows
            .borrow()
            .clone()
            .ok_or_else(|| SheetError::Io(std::io::ErrorKind::NotFound.into()))
    }

    fn save(&self, rows: &[AttendanceRow]) -> Result<(), SheetError> {
        if self.fail_writes.get() {
            return Err(SheetError::Io(std::io::Error::other("simulated write failure")));
        }
        self.writes.set(self.writes.get() + 1);
        self.rows.replace(Some(rows.to_vec()));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
