use std::{collections::HashSet, fmt::Debug, path::Path, sync::Arc};

use async_trait::async_trait;
use itertools::Itertools;
use tokio::sync::RwLock;

use crate::config::DecoderConfig;

mod command;
mod qr;

pub(crate) use command::CommandDecoder;
pub(crate) use qr::RqrrDecoder;

#[cfg(test)]
pub(crate) use qr::tests as qr_tests;

/// Reads a barcode out of an image file.
///
/// `Ok(None)` means the image was readable but held no barcode.
#[async_trait]
pub trait BarcodeDecoder: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    async fn decode(&self, image: &Path) -> eyre::Result<Option<String>>;
}

pub type BoxedBarcodeDecoder = Box<dyn BarcodeDecoder>;

/// Ordered chain of decoders; the first one to find a payload wins.
#[derive(Debug, Default, Clone)]
pub struct BarcodeDecoders {
    decoders: Arc<Vec<BoxedBarcodeDecoder>>,
    disabled_decoders: Arc<RwLock<HashSet<String>>>,
}

impl BarcodeDecoders {
    pub fn new(decoders: Vec<BoxedBarcodeDecoder>) -> Self {
        BarcodeDecoders {
            decoders: Arc::new(decoders),
            disabled_decoders: Default::default(),
        }
    }

    pub(crate) fn from_config(configs: &[DecoderConfig]) -> eyre::Result<Self> {
        eyre::ensure!(!configs.is_empty(), "at least one decoder must be configured");

        let decoders = configs
            .iter()
            .map(|config| -> BoxedBarcodeDecoder {
                match config {
                    DecoderConfig::Rqrr => Box::new(RqrrDecoder),
                    DecoderConfig::Command { program, args } => {
                        Box::new(CommandDecoder::new(program.clone(), args.clone()))
                    }
                }
            })
            .collect::<Vec<_>>();

        // Decoders are enabled and disabled by name.
        if let Some(name) = decoders.iter().map(|decoder| decoder.name()).duplicates().next() {
            eyre::bail!("decoder {name} is configured more than once");
        }

        Ok(Self::new(decoders))
    }

    /// Returns the name of the decoder that matched along with the payload.
    ///
    /// Errors are only returned when no enabled decoder found a payload.
    #[tracing::instrument(skip(self, image), fields(image = %image.display()))]
    pub async fn decode(&self, image: &Path) -> eyre::Result<Option<(&'static str, String)>> {
        let disabled_decoders = self.disabled_decoders.read().await;

        let mut first_err = None;

        for decoder in self.decoders.iter() {
            if disabled_decoders.contains(decoder.name()) {
                continue;
            }

            match decoder.decode(image).await {
                Ok(Some(payload)) => return Ok(Some((decoder.name(), payload))),
                Ok(None) => {
                    tracing::trace!(name = decoder.name(), "no barcode found");
                }
                Err(err) => {
                    tracing::debug!(name = decoder.name(), "could not decode: {err}");
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> &[BoxedBarcodeDecoder] {
        &self.decoders
    }

    pub async fn toggle_decoder(&self, name: &str, enabled: bool) {
        let mut disabled_decoders = self.disabled_decoders.write().await;

        if enabled {
            disabled_decoders.remove(name);
        } else {
            disabled_decoders.insert(name.to_string());
        }
    }

    pub async fn disabled(&self) -> HashSet<String> {
        self.disabled_decoders.read().await.clone()
    }
}
