//! Preview window, key polling and the recognition overlay.

use crate::session::FrameReport;
use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use rollcall_core::DistanceStatus;
use std::path::Path;

const WINDOW_TITLE: &str = "Attendance System";
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Keyboard commands understood by the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKey {
    /// `q`: end the session.
    Quit,
    /// `d`: print the current attendance summary.
    ShowStatus,
}

/// Where rendered frames go and where key presses come from.
pub trait Viewer {
    fn show(&mut self, frame: &RgbImage);
    /// Non-blocking; returns at most one key per call.
    fn poll_key(&mut self) -> Option<SessionKey>;
    fn is_open(&self) -> bool;
}

/// Desktop window backed by `minifb`.
pub struct WindowViewer {
    window: Window,
    buffer: Vec<u32>,
    pending: Vec<SessionKey>,
}

impl WindowViewer {
    pub fn open(width: u32, height: u32) -> Result<Self, minifb::Error> {
        let mut window = Window::new(
            WINDOW_TITLE,
            width as usize,
            height as usize,
            WindowOptions::default(),
        )?;
        window.set_target_fps(60);
        Ok(Self {
            window,
            buffer: Vec::new(),
            pending: Vec::new(),
        })
    }
}

impl Viewer for WindowViewer {
    fn show(&mut self, frame: &RgbImage) {
        self.buffer.clear();
        self.buffer.extend(
            frame
                .pixels()
                .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
        );
        if let Err(e) = self.window.update_with_buffer(
            &self.buffer,
            frame.width() as usize,
            frame.height() as usize,
        ) {
            tracing::warn!(error = %e, "failed to update preview window");
        }

        self.pending.extend(
            self.window
                .get_keys_pressed(KeyRepeat::No)
                .into_iter()
                .filter_map(|key| match key {
                    Key::Q => Some(SessionKey::Quit),
                    Key::D => Some(SessionKey::ShowStatus),
                    _ => None,
                }),
        );
    }

    fn poll_key(&mut self) -> Option<SessionKey> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    fn is_open(&self) -> bool {
        self.window.is_open()
    }
}

/// No window; the session ends on Ctrl-C, camera failure or its time limit.
pub struct HeadlessViewer;

impl Viewer for HeadlessViewer {
    fn show(&mut self, _frame: &RgbImage) {}

    fn poll_key(&mut self) -> Option<SessionKey> {
        None
    }

    fn is_open(&self) -> bool {
        true
    }
}

/// Draws face boxes, labels and warnings onto a frame.
pub struct Overlay {
    font: Option<FontVec>,
    optimal_cm: i32,
}

impl Overlay {
    pub fn new(font: Option<FontVec>, optimal_cm: i32) -> Self {
        Self { font, optimal_cm }
    }

    /// Load a TrueType font for labels. Without one only boxes are drawn.
    pub fn with_font_file(path: Option<&Path>, optimal_cm: i32) -> Self {
        let font = path.and_then(|p| match std::fs::read(p) {
            Ok(bytes) => FontVec::try_from_vec(bytes)
                .map_err(|e| tracing::warn!(font = %p.display(), error = %e, "invalid overlay font"))
                .ok(),
            Err(e) => {
                tracing::warn!(font = %p.display(), error = %e, "overlay font unavailable");
                None
            }
        });
        Self::new(font, optimal_cm)
    }

    pub fn render(&self, frame: &mut RgbImage, report: &FrameReport) {
        self.text(frame, 20, 20, 24.0, &format!("Optimal Distance: {}cm", self.optimal_cm));

        if report.multiple_faces {
            draw_filled_rect_mut(frame, Rect::at(20, 60).of_size(480, 40), RED);
            self.text(frame, 30, 68, 24.0, "WARNING: Multiple Faces Detected!");
        }

        for face in &report.faces {
            let colour = match face.status {
                Some(DistanceStatus::Good) => GREEN,
                _ => RED,
            };
            let (x, y) = (face.bbox.x.round() as i32, face.bbox.y.round() as i32);
            let w = face.bbox.width.round().max(1.0) as u32;
            let h = face.bbox.height.round().max(1.0) as u32;

            // Two nested outlines for a 2px border.
            draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(w, h), colour);
            if w > 2 && h > 2 {
                draw_hollow_rect_mut(frame, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), colour);
            }

            let banner = 35.min(h);
            draw_filled_rect_mut(
                frame,
                Rect::at(x, y + (h - banner) as i32).of_size(w, banner),
                GREEN,
            );
            self.text(frame, x + 6, y + h as i32 - 28, 20.0, face.outcome.label());
            if let (Some(status), Some(cm)) = (face.status, face.distance_cm) {
                self.text(frame, x, y - 24, 20.0, &format!("{} ({cm}cm)", status.as_str()));
            }
        }
    }

    fn text(&self, frame: &mut RgbImage, x: i32, y: i32, size: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(frame, WHITE, x, y, size, font, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DetectedFace;
    use crate::testing::face_box;
    use rollcall_core::{Embedding, MatchOutcome};

    fn report(status: Option<DistanceStatus>, multiple: bool) -> FrameReport {
        FrameReport {
            faces: vec![DetectedFace {
                bbox: face_box(10.0, 10.0, 60.0),
                embedding: Embedding::new(vec![1.0, 0.0]),
                distance_cm: Some(60),
                status,
                outcome: MatchOutcome::Unknown,
            }],
            multiple_faces: multiple,
            marks: Vec::new(),
        }
    }

    #[test]
    fn test_good_distance_box_is_green() {
        let mut frame = RgbImage::new(200, 200);
        Overlay::new(None, 60).render(&mut frame, &report(Some(DistanceStatus::Good), false));
        assert_eq!(*frame.get_pixel(10, 20), GREEN);
    }

    #[test]
    fn test_bad_distance_box_is_red() {
        let mut frame = RgbImage::new(200, 200);
        Overlay::new(None, 60).render(&mut frame, &report(Some(DistanceStatus::MoveCloser), false));
        assert_eq!(*frame.get_pixel(10, 20), RED);
    }

    #[test]
    fn test_multiple_faces_banner() {
        let mut frame = RgbImage::new(640, 480);
        Overlay::new(None, 60).render(&mut frame, &report(None, true));
        assert_eq!(*frame.get_pixel(300, 80), RED);
    }

    #[test]
    fn test_headless_viewer_never_quits() {
        let mut viewer = HeadlessViewer;
        viewer.show(&RgbImage::new(1, 1));
        assert!(viewer.is_open());
        assert_eq!(viewer.poll_key(), None);
    }
}
