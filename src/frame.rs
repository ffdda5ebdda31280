use std::io::Write;

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PixelFormat {
    #[default]
    Rgba8,
}

impl PixelFormat {
    pub(crate) fn channels(&self) -> usize {
        match self {
            Self::Rgba8 => 4,
        }
    }
}

/// A single camera frame as produced by a [`crate::frame_source::FrameSource`].
///
/// Nothing checks that `data` matches the declared dimensions until the frame
/// is converted, mirroring how camera buffers arrive from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: PixelFormat,
    pub(crate) data: Vec<u8>,
}

impl Frame {
    pub(crate) fn rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data,
        }
    }

    pub(crate) fn from_image(image: DynamicImage) -> Self {
        let image = image.into_rgba8();
        let (width, height) = image.dimensions();

        Self::rgba(width, height, image.into_raw())
    }

    /// Reinterpret the buffer as (height, width, channels) and drop the alpha
    /// channel. The buffer is reused rather than copied.
    pub(crate) fn into_rgb(self) -> eyre::Result<RgbImage> {
        eyre::ensure!(
            self.width > 0 && self.height > 0,
            "frame has empty dimensions {}x{}",
            self.width,
            self.height
        );

        let expected = self.height as usize * self.width as usize * self.format.channels();
        eyre::ensure!(
            self.data.len() == expected,
            "frame buffer has {} bytes, expected {expected} for {}x{} {:?}",
            self.data.len(),
            self.width,
            self.height,
            self.format
        );

        let rgba = RgbaImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| eyre::eyre!("frame buffer could not be reshaped"))?;

        Ok(DynamicImage::ImageRgba8(rgba).into_rgb8())
    }
}

/// Write the image as a PNG into a fresh temporary file.
///
/// The file is removed when the returned handle is dropped.
#[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub(crate) fn materialize(image: &RgbImage) -> eyre::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("qr-scan-")
        .suffix(".png")
        .tempfile()?;

    image.write_to(file.as_file_mut(), ImageFormat::Png)?;
    file.as_file_mut().flush()?;

    tracing::trace!(path = %file.path().display(), "wrote transient image");

    Ok(file)
}
