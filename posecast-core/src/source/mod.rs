//! Frame producers feeding the streaming loop.
//!
//! A source is owned by exactly one job and is only ever touched from the
//! blocking thread that runs that job's read + inference steps, so the
//! traits here are synchronous.

mod still;
#[cfg(feature = "ffmpeg")]
mod video;

pub use still::{IMAGE_EXTENSIONS, ImageSource, load_frame};
#[cfg(feature = "ffmpeg")]
pub use video::VideoSource;

use image::{ImageBuffer, Rgb, RgbImage};
use std::{fmt, path::Path};

use crate::error::SourceError;

/// A decoded frame as packed RGB8 rows.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgb.len())
            .finish()
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, SourceError> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || rgb.len() != expected {
            return Err(SourceError::InvalidFrame {
                width,
                height,
                len: rgb.len(),
            });
        }
        Ok(Self { width, height, rgb })
    }

    /// A frame of one solid colour.
    pub fn filled(width: u32, height: u32, pixel: [u8; 3]) -> Self {
        let image = RgbImage::from_pixel(width.max(1), height.max(1), Rgb(pixel));
        Self::from_image(image)
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            rgb: image.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_rgb(&self) -> &[u8] {
        &self.rgb
    }

    /// Borrowed image view over the frame buffer.
    pub fn view(&self) -> Result<ImageBuffer<Rgb<u8>, &[u8]>, SourceError> {
        ImageBuffer::from_raw(self.width, self.height, self.rgb.as_slice())
            .ok_or(SourceError::InvalidFrame {
                width: self.width,
                height: self.height,
                len: self.rgb.len(),
            })
    }
}

pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Human readable description for logs.
    fn describe(&self) -> String;
}

/// Opens sources by identifier; the seam the job controller uses.
pub trait SourceOpener: Send + Sync + fmt::Debug {
    fn open(&self, identifier: &str) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Resolves identifiers with [`open_source`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSourceOpener;

impl SourceOpener for DefaultSourceOpener {
    fn open(&self, identifier: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        open_source(identifier)
    }
}

/// Picks a source implementation for `identifier`.
///
/// * all digits: capture device index (`0` is `/dev/video0`)
/// * a directory: every still image inside it, in name order
/// * a still image file: that single image
/// * anything else: a video file or stream URL
pub fn open_source(identifier: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(SourceError::NotFound(identifier.to_string()));
    }

    if let Ok(index) = identifier.parse::<u32>() {
        return open_camera(index);
    }

    let path = Path::new(identifier);
    if path.is_dir() || (path.is_file() && ImageSource::is_image(path)) {
        return Ok(Box::new(ImageSource::open(path)?));
    }

    open_video(identifier)
}

#[cfg(feature = "ffmpeg")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(VideoSource::camera(index)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::Unsupported(format!(
        "camera {index}: capture devices need the `ffmpeg` feature"
    )))
}

#[cfg(feature = "ffmpeg")]
fn open_video(identifier: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(VideoSource::open(identifier)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(identifier: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    if !Path::new(identifier).exists() && !identifier.contains("://") {
        return Err(SourceError::NotFound(identifier.to_string()));
    }
    Err(SourceError::Unsupported(format!(
        "{identifier}: video decoding needs the `ffmpeg` feature"
    )))
}
