use std::{fmt::Debug, path::Path, thread::JoinHandle};

use image::ImageFormat;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::frame::Frame;

use super::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureFormat {
    Mjpg,
    Yuyv,
}

impl CaptureFormat {
    pub(crate) fn parse(value: &str) -> eyre::Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "MJPG" => Ok(Self::Mjpg),
            "YUYV" => Ok(Self::Yuyv),
            other => eyre::bail!("unsupported capture format {other}, expected MJPG or YUYV"),
        }
    }

    fn fourcc(&self) -> &'static [u8] {
        match self {
            Self::Mjpg => b"MJPG",
            Self::Yuyv => b"YUYV",
        }
    }

    fn to_frame(self, data: &[u8], (width, height): (u32, u32)) -> eyre::Result<Frame> {
        match self {
            Self::Mjpg => {
                let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
                Ok(Frame::from_image(image))
            }
            Self::Yuyv => {
                let expected = width as usize * height as usize * 2;
                eyre::ensure!(
                    data.len() >= expected,
                    "short YUYV buffer: {} < {expected}",
                    data.len()
                );

                Ok(Frame::rgba(width, height, yuyv_to_rgba(&data[..expected])))
            }
        }
    }
}

/// What the capture thread last published.
#[derive(Debug, Clone)]
enum CaptureState {
    Starting,
    Frame(Frame),
    Failed(String),
}

/// Receiving side of the capture thread.
///
/// Once capture has stopped there is no current frame, so a frozen image is
/// never handed out as if it were live.
#[derive(Debug)]
struct LatestFrame {
    rx: watch::Receiver<CaptureState>,
}

impl LatestFrame {
    fn current(&mut self) -> Option<Frame> {
        if self.rx.has_changed().is_err() {
            return None;
        }

        match &*self.rx.borrow_and_update() {
            CaptureState::Frame(frame) => Some(frame.clone()),
            CaptureState::Starting | CaptureState::Failed(_) => None,
        }
    }

    fn check(&self) -> eyre::Result<()> {
        if let CaptureState::Failed(err) = &*self.rx.borrow() {
            eyre::bail!("{err}");
        }

        eyre::ensure!(
            self.rx.has_changed().is_ok(),
            "camera capture stopped unexpectedly"
        );

        Ok(())
    }
}

/// V4L2 camera that captures on its own thread and keeps only the newest frame.
pub(crate) struct CameraSource {
    device: String,
    latest: LatestFrame,
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl Debug for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSource")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl CameraSource {
    #[tracing::instrument(skip(device), fields(device = %device.display()))]
    pub(crate) fn open(
        device: &Path,
        resolution: (u32, u32),
        fps: u32,
        format: CaptureFormat,
    ) -> eyre::Result<Self> {
        eyre::ensure!(fps > 0, "camera fps must be greater than zero");

        let (tx, rx) = watch::channel(CaptureState::Starting);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let token = CancellationToken::new();

        let device_path = device.to_string_lossy().into_owned();
        let thread_token = token.clone();

        // The camera handle stays on the capture thread for its whole life, so
        // it is opened there and only the startup result is sent back.
        let thread = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let camera = match start_camera(&device_path, resolution, fps, format) {
                    Ok(camera) => {
                        let _ = ready_tx.send(Ok(()));
                        camera
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                capture_loop(camera, format, thread_token, tx);
            })?;

        ready_rx
            .recv()
            .map_err(|_| eyre::eyre!("camera thread exited before starting"))??;

        Ok(Self {
            device: device.display().to_string(),
            latest: LatestFrame { rx },
            token,
            thread: Some(thread),
        })
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> &str {
        &self.device
    }

    fn current_frame(&mut self) -> Option<Frame> {
        self.latest.current()
    }

    fn check(&self) -> eyre::Result<()> {
        self.latest.check()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.token.cancel();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("camera capture thread panicked");
            }
        }
    }
}

fn start_camera(
    device: &str,
    resolution: (u32, u32),
    fps: u32,
    format: CaptureFormat,
) -> eyre::Result<rscam::Camera> {
    let mut camera = rscam::Camera::new(device)?;
    camera
        .start(&rscam::Config {
            interval: (1, fps),
            resolution,
            format: format.fourcc(),
            ..Default::default()
        })
        .map_err(|err| eyre::eyre!("could not start camera: {err}"))?;

    Ok(camera)
}

fn capture_loop(
    camera: rscam::Camera,
    format: CaptureFormat,
    token: CancellationToken,
    tx: watch::Sender<CaptureState>,
) {
    while !token.is_cancelled() {
        let captured = match camera.capture() {
            Ok(captured) => captured,
            Err(err) => {
                tracing::error!("camera capture failed: {err}");
                tx.send_replace(CaptureState::Failed(format!("camera capture failed: {err}")));
                break;
            }
        };

        match format.to_frame(&captured, captured.resolution) {
            Ok(frame) => {
                if tx.send(CaptureState::Frame(frame)).is_err() {
                    tracing::info!("frame receiver closed, ending capture");
                    break;
                }
            }
            Err(err) => tracing::warn!("could not convert captured frame: {err}"),
        }
    }
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let y = 1.164 * (y - 16.0);
    let u = u - 128.0;
    let v = v - 128.0;

    [
        (y + 1.596 * v).clamp(0.0, 255.0) as u8,
        (y - 0.813 * v - 0.391 * u).clamp(0.0, 255.0) as u8,
        (y + 2.018 * u).clamp(0.0, 255.0) as u8,
    ]
}

/// Each 4-byte YUYV group (Y0 U Y1 V) covers two pixels.
fn yuyv_to_rgba(data: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(data.len() * 2);

    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (
            chunk[0] as f32,
            chunk[1] as f32,
            chunk[2] as f32,
            chunk[3] as f32,
        );

        for y in [y0, y1] {
            rgba.extend_from_slice(&yuv_to_rgb(y, u, v));
            rgba.push(u8::MAX);
        }
    }

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capture_formats() {
        assert_eq!(CaptureFormat::parse("mjpg").unwrap(), CaptureFormat::Mjpg);
        assert_eq!(CaptureFormat::parse("YUYV").unwrap(), CaptureFormat::Yuyv);
        assert!(CaptureFormat::parse("H264").is_err());
    }

    #[test]
    fn yuyv_expands_to_two_rgba_pixels() {
        let rgba = yuyv_to_rgba(&[235, 128, 16, 128]);

        assert_eq!(rgba.len(), 8);
        assert_eq!(&rgba[0..4], &[254, 254, 254, 255]);
        assert_eq!(&rgba[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn short_yuyv_buffer_is_rejected() {
        assert!(CaptureFormat::Yuyv.to_frame(&[0; 6], (2, 2)).is_err());

        let frame = CaptureFormat::Yuyv.to_frame(&[16, 128, 16, 128], (2, 1)).unwrap();
        assert_eq!(frame.data.len(), 2 * 4);
        assert!(frame.into_rgb().is_ok());
    }

    #[test]
    fn latest_frame_follows_capture_thread() {
        let (tx, rx) = watch::channel(CaptureState::Starting);
        let mut latest = LatestFrame { rx };

        assert!(latest.current().is_none());
        assert!(latest.check().is_ok());

        let frame = Frame::rgba(1, 1, vec![1, 2, 3, 255]);
        tx.send_replace(CaptureState::Frame(frame.clone()));
        assert_eq!(latest.current(), Some(frame));
    }

    #[test]
    fn failed_capture_stops_serving_the_last_frame() {
        let (tx, rx) = watch::channel(CaptureState::Starting);
        let mut latest = LatestFrame { rx };

        tx.send_replace(CaptureState::Frame(Frame::rgba(1, 1, vec![0; 4])));
        tx.send_replace(CaptureState::Failed(
            "camera capture failed: device unplugged".to_string(),
        ));
        drop(tx);

        assert!(latest.current().is_none());
        let err = latest.check().unwrap_err();
        assert!(err.to_string().contains("device unplugged"), "{err}");
    }

    #[test]
    fn vanished_capture_thread_is_a_fault() {
        let (tx, rx) = watch::channel(CaptureState::Starting);
        let mut latest = LatestFrame { rx };

        tx.send_replace(CaptureState::Frame(Frame::rgba(1, 1, vec![0; 4])));
        drop(tx);

        assert!(latest.current().is_none());
        assert!(latest.check().is_err());
    }
}
