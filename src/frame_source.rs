use std::fmt::Debug;

use crate::{config::SourceConfig, frame::Frame};

#[cfg(target_os = "linux")]
mod camera;
mod still;

#[cfg(target_os = "linux")]
pub(crate) use camera::CameraSource;
pub(crate) use still::StillImageSource;

/// Something that can be asked for the most recent frame.
///
/// Returning `None` means no frame is available right now, which is not an
/// error.
pub(crate) trait FrameSource: Debug + Send {
    fn name(&self) -> &str;
    fn current_frame(&mut self) -> Option<Frame>;

    /// Fails once the source can no longer produce frames.
    fn check(&self) -> eyre::Result<()> {
        Ok(())
    }
}

pub(crate) type BoxedFrameSource = Box<dyn FrameSource>;

pub(crate) fn open_source(config: &SourceConfig) -> eyre::Result<BoxedFrameSource> {
    let source: BoxedFrameSource = match config {
        #[cfg(target_os = "linux")]
        SourceConfig::Camera {
            device,
            width,
            height,
            fps,
            format,
        } => Box::new(CameraSource::open(
            device,
            (*width, *height),
            *fps,
            camera::CaptureFormat::parse(format)?,
        )?),
        #[cfg(not(target_os = "linux"))]
        SourceConfig::Camera { .. } => {
            eyre::bail!("camera capture is only supported on linux")
        }
        SourceConfig::Still { path } => Box::new(StillImageSource::open(path)?),
    };

    tracing::info!(name = source.name(), "opened frame source");

    Ok(source)
}
