//! Face detection adapter and dominant-face crop calculation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::command::ToolRunner;
use crate::error::{MediaError, MediaResult};

/// Face centres are bucketed into a GRID_SIZE x GRID_SIZE grid.
const GRID_SIZE: u32 = 10;

/// The face centre sits this far down the crop window.
const VERTICAL_BIAS: f64 = 0.35;

/// A detected face in relative coordinates (0-1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub confidence: f64,
}

impl FaceBox {
    fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Faces found in one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFaces {
    pub time: f64,
    #[serde(default)]
    pub faces: Vec<FaceBox>,
}

/// Detector output for a whole source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FaceDetections {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<FrameFaces>,
}

/// Pixel crop rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// FFmpeg `crop` filter expression.
    pub fn filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }

    /// Whether the rectangle fits inside a frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x + self.width <= frame_width && self.y + self.height <= frame_height
    }
}

/// Samples faces across a source.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(
        &self,
        source: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<FaceDetections>;
}

/// Face detection script settings.
#[derive(Debug, Clone)]
pub struct FaceDetectConfig {
    pub python_path: String,
    pub script_path: PathBuf,
    /// Seconds between sampled frames
    pub interval_secs: f64,
    pub max_faces: u32,
    pub timeout_secs: u64,
}

impl Default for FaceDetectConfig {
    fn default() -> Self {
        Self {
            python_path: "python3".to_string(),
            script_path: PathBuf::from("./scripts/face_detect.py"),
            interval_secs: 1.0,
            max_faces: 4,
            timeout_secs: 300,
        }
    }
}

impl FaceDetectConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let scripts_dir = std::env::var("SCRIPTS_DIR").unwrap_or_else(|_| "./scripts".to_string());
        Self {
            python_path: std::env::var("PYTHON_PATH").unwrap_or_else(|_| "python3".to_string()),
            script_path: Path::new(&scripts_dir).join("face_detect.py"),
            ..Default::default()
        }
    }
}

/// [`FaceDetector`] that shells out to `face_detect.py`.
#[derive(Debug, Clone, Default)]
pub struct ScriptFaceDetector {
    config: FaceDetectConfig,
}

impl ScriptFaceDetector {
    pub fn new(config: FaceDetectConfig) -> Self {
        Self { config }
    }

    pub fn build_args(&self, source: &Path) -> Vec<String> {
        vec![
            self.config.script_path.to_string_lossy().to_string(),
            source.to_string_lossy().to_string(),
            "--interval".to_string(),
            format!("{:.1}", self.config.interval_secs),
            "--max-faces".to_string(),
            self.config.max_faces.to_string(),
        ]
    }
}

#[async_trait]
impl FaceDetector for ScriptFaceDetector {
    async fn detect(
        &self,
        source: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<FaceDetections> {
        let output = ToolRunner::new()
            .with_cancel_opt(cancel)
            .with_timeout_secs(self.config.timeout_secs)
            .run(&self.config.python_path, &self.build_args(source))
            .await?;

        serde_json::from_str(output.stdout.trim())
            .map_err(|e| MediaError::malformed("face_detect.py", e.to_string()))
    }
}

/// Average relative box of faces in the most populated grid cell.
pub fn dominant_face(detections: &[FrameFaces]) -> Option<FaceBox> {
    let mut cells: HashMap<(u32, u32), Vec<FaceBox>> = HashMap::new();

    for face in detections.iter().flat_map(|d| d.faces.iter()) {
        let (cx, cy) = face.center();
        let cell = (grid_cell(cx), grid_cell(cy));
        cells.entry(cell).or_default().push(*face);
    }

    // Ties resolve to the lowest cell so the result is deterministic
    let (_, faces) = cells
        .into_iter()
        .max_by(|(ka, a), (kb, b)| a.len().cmp(&b.len()).then(kb.cmp(ka)))?;

    let n = faces.len() as f64;
    let sum = faces.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, f| {
        (acc.0 + f.x, acc.1 + f.y, acc.2 + f.w, acc.3 + f.h)
    });
    Some(FaceBox {
        x: sum.0 / n,
        y: sum.1 / n,
        w: sum.2 / n,
        h: sum.3 / n,
        confidence: faces.iter().map(|f| f.confidence).sum::<f64>() / n,
    })
}

fn grid_cell(coord: f64) -> u32 {
    ((coord.max(0.0) * GRID_SIZE as f64).floor() as u32).min(GRID_SIZE - 1)
}

/// Crop of `target_aspect` (width / height) centred on the dominant face.
///
/// Returns `None` when no face was detected or the frame size is unknown.
pub fn compute_crop(detections: &FaceDetections, target_aspect: f64) -> Option<CropRect> {
    let (width, height) = (detections.width, detections.height);
    if width == 0 || height == 0 || target_aspect <= 0.0 {
        return None;
    }

    let face = dominant_face(&detections.detections)?;
    let (rel_cx, rel_cy) = face.center();
    let face_cx = rel_cx * width as f64;
    let face_cy = rel_cy * height as f64;

    let mut crop_h = height;
    let mut crop_w = (height as f64 * target_aspect).round() as u32;
    if crop_w > width {
        crop_w = width;
        crop_h = ((width as f64 / target_aspect).round() as u32).min(height);
    }

    let x = clamp_offset(face_cx - crop_w as f64 / 2.0, width - crop_w);
    let y = clamp_offset(face_cy - crop_h as f64 * VERTICAL_BIAS, height - crop_h);

    let crop = CropRect {
        x,
        y,
        width: crop_w,
        height: crop_h,
    };
    debug!(?face, "Dominant face region");
    info!(
        "Face tracking crop: x={}, y={}, w={}, h={} (video: {}x{})",
        crop.x, crop.y, crop.width, crop.height, width, height
    );
    Some(crop)
}

fn clamp_offset(value: f64, max: u32) -> u32 {
    value.round().clamp(0.0, max as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTICAL: f64 = 9.0 / 16.0;

    fn face(x: f64, y: f64) -> FaceBox {
        FaceBox {
            x,
            y,
            w: 0.1,
            h: 0.1,
            confidence: 0.9,
        }
    }

    fn frames(faces: Vec<FaceBox>) -> Vec<FrameFaces> {
        faces
            .into_iter()
            .enumerate()
            .map(|(i, f)| FrameFaces {
                time: i as f64,
                faces: vec![f],
            })
            .collect()
    }

    #[test]
    fn test_no_faces_returns_none() {
        let detections = FaceDetections {
            width: 1920,
            height: 1080,
            detections: vec![FrameFaces {
                time: 0.0,
                faces: vec![],
            }],
        };
        assert!(compute_crop(&detections, VERTICAL).is_none());
        assert!(compute_crop(&FaceDetections::default(), VERTICAL).is_none());
    }

    #[test]
    fn test_dominant_cell_wins() {
        let dominant = dominant_face(&frames(vec![
            face(0.70, 0.20),
            face(0.71, 0.21),
            face(0.72, 0.20),
            face(0.10, 0.50),
        ]))
        .unwrap();
        assert!((dominant.x - 0.71).abs() < 1e-9);
        assert!((dominant.y - (0.61 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_crop_centres_on_face() {
        let detections = FaceDetections {
            width: 1920,
            height: 1080,
            detections: frames(vec![face(0.45, 0.3); 3]),
        };
        let crop = compute_crop(&detections, VERTICAL).unwrap();
        assert_eq!(crop.height, 1080);
        assert_eq!(crop.width, 608);
        // face centre x = 0.5 * 1920 = 960
        assert_eq!(crop.x, 656);
        assert_eq!(crop.y, 0);
        assert_eq!(crop.filter(), "crop=608:1080:656:0");
    }

    #[test]
    fn test_crop_stays_inside_frame() {
        for (x, y) in [(0.0, 0.0), (0.9, 0.9), (0.95, 0.0), (0.0, 0.95)] {
            for (w, h) in [(1920, 1080), (1080, 1920), (640, 360), (300, 1000)] {
                let detections = FaceDetections {
                    width: w,
                    height: h,
                    detections: frames(vec![face(x, y)]),
                };
                let crop = compute_crop(&detections, VERTICAL).unwrap();
                assert!(crop.fits_within(w, h), "{:?} outside {}x{}", crop, w, h);
            }
        }
    }

    #[test]
    fn test_narrow_source_limits_width() {
        let detections = FaceDetections {
            width: 300,
            height: 1000,
            detections: frames(vec![face(0.4, 0.4)]),
        };
        let crop = compute_crop(&detections, VERTICAL).unwrap();
        assert_eq!(crop.width, 300);
        assert_eq!(crop.height, 533);
    }

    #[test]
    fn test_script_args() {
        let args = ScriptFaceDetector::default().build_args(Path::new("v.mp4"));
        assert_eq!(&args[1..], ["v.mp4", "--interval", "1.0", "--max-faces", "4"]);
    }
}
