use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::{Frame, FrameSource};
use crate::error::SourceError;

/// File extensions picked up when scanning a directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A fixed, ordered list of still images played back one frame each.
#[derive(Debug, Clone)]
pub struct ImageSource {
    paths: Vec<PathBuf>,
    position: usize,
}

impl ImageSource {
    /// A single image, or every image directly inside a directory.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !path.exists() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }
        if path.is_dir() {
            let paths = Self::scan_dir(path)?;
            if paths.is_empty() {
                return Err(SourceError::Empty(path.to_path_buf()));
            }
            return Ok(Self::from_paths(paths));
        }
        Ok(Self::from_paths(vec![path.to_path_buf()]))
    }

    /// Images from several directories, concatenated in the order given.
    pub fn from_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, SourceError> {
        let mut paths = Vec::new();
        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                return Err(SourceError::NotFound(dir.display().to_string()));
            }
            paths.extend(Self::scan_dir(dir)?);
        }
        Ok(Self::from_paths(paths))
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self { paths, position: 0 }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }

    fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
        let io_err = |source: std::io::Error| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && Self::is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        debug!(dir = %dir.display(), images = paths.len(), "scanned image directory");
        Ok(paths)
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        load_frame(path).map(Some)
    }

    fn describe(&self) -> String {
        match self.paths.as_slice() {
            [single] => format!("image {}", single.display()),
            paths => format!("{} images", paths.len()),
        }
    }
}

/// Decodes one still image into an RGB frame.
pub fn load_frame(path: &Path) -> Result<Frame, SourceError> {
    let image = image::open(path).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Frame::from_image(image.to_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, shade: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(4, 3, Rgb([shade, shade, shade]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn directory_frames_come_back_in_name_order() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "b.png", 20);
        write_png(dir.path(), "a.png", 10);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSource::open(dir.path()).unwrap();
        assert_eq!(source.paths().len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (4, 3));
        assert_eq!(first.as_rgb()[0], 10);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.as_rgb()[0], 20);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ImageSource::open(dir.path()),
            Err(SourceError::Empty(_))
        ));
    }

    #[test]
    fn corrupt_image_fails_the_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"not a jpeg").unwrap();

        let mut source = ImageSource::open(&path).unwrap();
        assert!(matches!(
            source.next_frame(),
            Err(SourceError::Decode { .. })
        ));
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(ImageSource::is_image(Path::new("x.JPG")));
        assert!(!ImageSource::is_image(Path::new("x.mp4")));
        assert!(!ImageSource::is_image(Path::new("noext")));
    }
}
