use std::path::Path;

use async_trait::async_trait;
use eyre::WrapErr;

use super::BarcodeDecoder;

/// Pure Rust QR decoder backed by `rqrr`.
#[derive(Debug)]
pub(crate) struct RqrrDecoder;

#[async_trait]
impl BarcodeDecoder for RqrrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    #[tracing::instrument(skip_all)]
    async fn decode(&self, image: &Path) -> eyre::Result<Option<String>> {
        let path = image.to_owned();

        tokio::task::spawn_blocking(move || {
            let image = image::open(&path)
                .wrap_err_with(|| format!("could not read {}", path.display()))?
                .into_luma8();

            Ok::<_, eyre::Report>(decode_luma(&image))
        })
        .await?
    }
}

fn decode_luma(image: &image::GrayImage) -> Option<String> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        image.width() as usize,
        image.height() as usize,
        |x, y| image.get_pixel(x as u32, y as u32).0[0],
    );

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((meta, content)) => {
                tracing::trace!(version = meta.version.0, "decoded qr grid");
                return Some(content);
            }
            Err(err) => tracing::trace!("could not decode detected grid: {err:?}"),
        }
    }

    None
}
