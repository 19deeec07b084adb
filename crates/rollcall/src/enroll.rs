use crate::config::StudentEntry;
use rollcall_core::{FaceCatalog, FaceDetect, FaceEmbed};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("reference image not found: {0}")]
    ImageNotFound(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("detector error: {0}")]
    Detector(#[from] rollcall_core::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] rollcall_core::RecognizerError),
    #[error("no face found in reference image")]
    NoFaceDetected,
}

/// Per-student result of building the catalog.
#[derive(Debug)]
pub struct EnrollReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<(String, EnrollError)>,
}

/// Build the face catalog from the roster's reference images, in roster order.
///
/// A student whose image is missing or holds no detectable face is logged and
/// left out of the catalog; they stay on the roster.
pub fn build_catalog(
    students: &[StudentEntry],
    detector: &mut dyn FaceDetect,
    embedder: &mut dyn FaceEmbed,
) -> (FaceCatalog, EnrollReport) {
    tracing::info!(students = students.len(), "loading known faces");

    let mut catalog = FaceCatalog::new();
    let mut report = EnrollReport {
        loaded: Vec::new(),
        skipped: Vec::new(),
    };

    for student in students {
        match enroll_one(student, detector, embedder) {
            Ok(embedding) => {
                catalog.register(student.name.clone(), embedding);
                tracing::info!(name = %student.name, "loaded face data");
                report.loaded.push(student.name.clone());
            }
            Err(e) => {
                tracing::warn!(
                    name = %student.name,
                    image = %student.image.display(),
                    error = %e,
                    "student excluded from face matching"
                );
                report.skipped.push((student.name.clone(), e));
            }
        }
    }

    (catalog, report)
}

/// Embed the most confident face in one reference image.
fn enroll_one(
    student: &StudentEntry,
    detector: &mut dyn FaceDetect,
    embedder: &mut dyn FaceEmbed,
) -> Result<rollcall_core::Embedding, EnrollError> {
    let path = &student.image;
    if !path.exists() {
        return Err(EnrollError::ImageNotFound(path.display().to_string()));
    }

    let image = image::open(path)
        .map_err(|source| EnrollError::Decode {
            path: path.display().to_string(),
            source,
        })?
        .to_rgb8();

    let faces = detector.detect(&image)?;
    let face = faces.first().ok_or(EnrollError::NoFaceDetected)?;
    tracing::debug!(name = %student.name, confidence = face.confidence, faces = faces.len(), "reference face selected");

    Ok(embedder.embed(&image, face)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedDetector, TintEmbedder};
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn entry(name: &str, image: PathBuf) -> StudentEntry {
        StudentEntry {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            image,
        }
    }

    #[test]
    fn test_missing_image_is_skipped_but_others_load() {
        let dir = tempfile::tempdir().unwrap();
        let alice_path = dir.path().join("alice.png");
        RgbImage::from_pixel(64, 64, Rgb([200, 0, 0]))
            .save(&alice_path)
            .unwrap();

        let students = vec![
            entry("Alice", alice_path),
            entry("Bob", dir.path().join("missing.png")),
        ];

        let mut detector = FixedDetector::one_face(40.0);
        let mut embedder = TintEmbedder;
        let (catalog, report) = build_catalog(&students, &mut detector, &mut embedder);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("Alice"));
        assert_eq!(report.loaded, ["Alice"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "Bob");
        assert!(matches!(report.skipped[0].1, EnrollError::ImageNotFound(_)));
    }

    #[test]
    fn test_image_without_face_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.png");
        RgbImage::new(32, 32).save(&path).unwrap();

        let mut detector = FixedDetector::no_faces();
        let mut embedder = TintEmbedder;
        let (catalog, report) = build_catalog(&[entry("Carol", path)], &mut detector, &mut embedder);

        assert!(catalog.is_empty());
        assert!(matches!(report.skipped[0].1, EnrollError::NoFaceDetected));
    }
}
