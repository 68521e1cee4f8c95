//! Offline mode: run pose estimation over folders of still images and write
//! one CSV row per detected human.

use anyhow::{Context, Result};
use posecast_core::{
    EstimatorFactory, ImageSource, pose::normalize, source::load_frame,
};
use posecast_model::{Human, Resolution};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    time::Instant,
};
use tracing::{info, warn};

pub const DEFAULT_MIN_PARTS: usize = 5;
pub const DEFAULT_UPSAMPLE: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub folders: Vec<PathBuf>,
    pub out: PathBuf,
    pub model: String,
    pub resolution: Resolution,
    /// Humans with fewer detected parts are not written.
    pub min_parts: usize,
    pub upsample: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub images: usize,
    /// Humans reported by the estimator, before `min_parts` filtering.
    pub detected: usize,
    /// Images with at least one human written.
    pub matched: usize,
    pub rows: usize,
}

/// Processes every image in `options.folders` and writes the CSV.
///
/// Images that fail to decode are skipped with a warning. Estimator failures
/// abort the run.
pub fn run_batch(
    options: &BatchOptions,
    estimators: &dyn EstimatorFactory,
) -> Result<BatchSummary> {
    let source = ImageSource::from_dirs(&options.folders)
        .context("failed to list input images")?;
    let resolution = options.resolution.or(Resolution::DEFAULT);
    let mut estimator = estimators
        .load(&options.model, resolution)
        .with_context(|| format!("failed to load model '{}'", options.model))?;

    let file = File::create(&options.out).with_context(|| {
        format!("failed to create {}", options.out.display())
    })?;
    let mut writer = BufWriter::new(file);
    let mut summary = BatchSummary::default();

    for (index, path) in source.paths().iter().enumerate() {
        summary.images += 1;
        let frame = match load_frame(path) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping image");
                continue;
            }
        };

        let started = Instant::now();
        let raw = estimator
            .infer(&frame, resolution, options.upsample)
            .with_context(|| format!("inference failed on {}", path.display()))?;
        info!(
            "inference image #{}: {} in {:.4} seconds",
            index,
            path.display(),
            started.elapsed().as_secs_f64()
        );

        summary.detected += raw.len();
        if raw.len() > 1 {
            info!(path = %path.display(), count = raw.len(), "Multiple humans");
        }
        if raw.is_empty() {
            info!(path = %path.display(), "No humans found");
            continue;
        }

        let humans = normalize(raw, options.min_parts);
        if humans.is_empty() {
            continue;
        }

        for human in &humans {
            write_row(&mut writer, human)?;
        }
        summary.matched += 1;
        summary.rows += humans.len();
    }

    writer
        .flush()
        .with_context(|| format!("failed to write {}", options.out.display()))?;
    info!(
        out = %options.out.display(),
        images = summary.images,
        rows = summary.rows,
        "batch finished"
    );
    Ok(summary)
}

fn write_row(writer: &mut impl Write, human: &Human) -> Result<()> {
    let row = human
        .packed_row()
        .iter()
        .map(|value| format_cell(*value))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{row}")?;
    Ok(())
}

fn format_cell(value: f32) -> String {
    if value == -1.0 {
        "-1".to_string()
    } else {
        value.to_string()
    }
}
