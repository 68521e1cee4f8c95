use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use posecast_core::{
    EstimatorFactory, Frame, PoseError, PoseEstimator, RawHuman, RawKeypoint,
};
use posecast_model::Resolution;
use posecast_server::batch::{BatchOptions, run_batch};
use tempfile::TempDir;

/// Picks its answer from the red channel of the image: `1` is one full
/// human, `2` is a full human plus a partial one, anything else is empty.
#[derive(Debug)]
struct ShadeFactory;

struct ShadeEstimator;

impl EstimatorFactory for ShadeFactory {
    fn load(
        &self,
        _model: &str,
        _resolution: Resolution,
    ) -> Result<Box<dyn PoseEstimator>, PoseError> {
        Ok(Box::new(ShadeEstimator))
    }
}

fn human(parts: usize) -> RawHuman {
    RawHuman {
        keypoints: (0..parts)
            .map(|part| RawKeypoint {
                part,
                x: 0.1 * part as f32,
                y: 0.5,
                score: 0.75,
            })
            .collect(),
    }
}

impl PoseEstimator for ShadeEstimator {
    fn infer(
        &mut self,
        frame: &Frame,
        _target: Resolution,
        upsample: f32,
    ) -> Result<Vec<RawHuman>, PoseError> {
        assert_eq!(upsample, 4.0);
        Ok(match frame.as_rgb()[0] {
            1 => vec![human(6)],
            2 => vec![human(7), human(3)],
            _ => Vec::new(),
        })
    }
}

fn read_rows(path: &Path) -> Result<Vec<Vec<f32>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(',')
                .map(|cell| {
                    cell.trim()
                        .parse::<f32>()
                        .with_context(|| format!("invalid cell '{cell}'"))
                })
                .collect()
        })
        .collect()
}

fn write_image(dir: &Path, name: &str, shade: u8) {
    RgbImage::from_pixel(8, 6, Rgb([shade, 0, 0]))
        .save(dir.join(name))
        .unwrap();
}

#[test]
fn writes_one_row_per_sufficiently_detected_human() -> Result<()> {
    let input = TempDir::new()?;
    write_image(input.path(), "a.png", 1);
    write_image(input.path(), "b.png", 2);
    write_image(input.path(), "c.png", 3);
    std::fs::write(input.path().join("notes.txt"), "not an image")?;

    let output = TempDir::new()?;
    let out = output.path().join("poses.csv");
    let options = BatchOptions {
        folders: vec![input.path().to_path_buf()],
        out: out.clone(),
        model: "cmu".into(),
        resolution: Resolution::new(0, 0),
        min_parts: 5,
        upsample: 4.0,
    };

    let summary = run_batch(&options, &ShadeFactory)?;
    assert_eq!(summary.images, 3);
    // b.png reports two humans even though only one is written
    assert_eq!(summary.detected, 3);
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.rows, 2);

    let rows = read_rows(&out)?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.len() == 54));

    // a.png: parts 0..6 present, the rest missing
    assert_eq!(&rows[0][0..3], &[0.0, 0.5, 0.75]);
    assert_eq!(rows[0][5 * 3], 0.5);
    assert_eq!(rows[0][6 * 3], -1.0);
    // b.png: only the 7-part human survives
    assert_eq!(rows[1][6 * 3], 0.6);
    assert_eq!(rows[1][7 * 3], -1.0);
    Ok(())
}

#[test]
fn missing_folder_is_an_error() {
    let options = BatchOptions {
        folders: vec!["/definitely/not/here".into()],
        out: std::env::temp_dir().join("posecast-never-written.csv"),
        model: "cmu".into(),
        resolution: Resolution::DEFAULT,
        min_parts: 5,
        upsample: 4.0,
    };
    assert!(run_batch(&options, &ShadeFactory).is_err());
}
