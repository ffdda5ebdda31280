use std::{borrow::Cow, collections::HashSet};

use eframe::egui::{Grid, Ui};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::{barcode_decoders::BarcodeDecoders, config::ConfigLoaderObject};

/// Persisted UI choices.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct UiConfig {
    pub(crate) disabled_decoders: Vec<String>,
}

impl ConfigLoaderObject for UiConfig {
    fn key(&self) -> Cow<'static, str> {
        "ui".into()
    }

    fn save(&self) -> eyre::Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    fn restore(&mut self, value: serde_json::Value) -> eyre::Result<()> {
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

/// Window for switching decoders in the chain on and off while scanning.
pub(crate) struct DecoderSettings {
    rt: Handle,
    decoders: BarcodeDecoders,
    disabled: HashSet<String>,
}

impl DecoderSettings {
    pub(crate) fn new(rt: Handle, decoders: BarcodeDecoders, disabled: HashSet<String>) -> Self {
        Self {
            rt,
            decoders,
            disabled,
        }
    }

    pub(crate) fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.contains(name)
    }

    pub(crate) fn set_enabled(&mut self, name: &'static str, enabled: bool) {
        tracing::info!(name, enabled, "toggling decoder");

        if enabled {
            self.disabled.remove(name);
        } else {
            self.disabled.insert(name.to_string());
        }

        let decoders = self.decoders.clone();
        self.rt.spawn(async move {
            decoders.toggle_decoder(name, enabled).await;
        });
    }

    pub(crate) fn render(&mut self, ui: &mut Ui) {
        let names: Vec<&'static str> = self
            .decoders
            .list()
            .iter()
            .map(|decoder| decoder.name())
            .collect();

        Grid::new("decoder_settings")
            .num_columns(2)
            .spacing([40.0, 4.0])
            .show(ui, |ui| {
                for (position, name) in names.into_iter().enumerate() {
                    ui.label(format!("{}.", position + 1));

                    let mut enabled = self.is_enabled(name);
                    if ui.checkbox(&mut enabled, name).changed() {
                        self.set_enabled(name, enabled);
                    }
                    ui.end_row();
                }
            });

        if self.disabled.len() >= self.decoders.list().len() {
            ui.separator();
            ui.label("All decoders are disabled, nothing will be scanned.");
        }
    }
}
