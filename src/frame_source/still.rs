use std::path::{Path, PathBuf};

use eyre::WrapErr;

use crate::frame::Frame;

use super::FrameSource;

/// Replays a single image from disk on every tick.
#[derive(Debug)]
pub(crate) struct StillImageSource {
    path: PathBuf,
    frame: Frame,
}

impl StillImageSource {
    pub(crate) fn open(path: &Path) -> eyre::Result<Self> {
        let image = image::open(path)
            .wrap_err_with(|| format!("could not load still image {}", path.display()))?;

        Ok(Self {
            path: path.to_owned(),
            frame: Frame::from_image(image),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_frame(frame: Frame) -> Self {
        Self {
            path: PathBuf::new(),
            frame,
        }
    }
}

impl FrameSource for StillImageSource {
    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("still image")
    }

    fn current_frame(&mut self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_loaded_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbImage::from_pixel(5, 3, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let mut source = StillImageSource::open(&path).unwrap();

        let first = source.current_frame().unwrap();
        let second = source.current_frame().unwrap();
        assert_eq!(first, second);
        assert_eq!((first.width, first.height), (5, 3));
        assert_eq!(&first.data[0..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn missing_image_is_an_error() {
        let err = StillImageSource::open(Path::new("/nonexistent/frame.png")).unwrap_err();
        assert!(format!("{err:#}").contains("could not load still image"));
    }
}
