use eframe::egui::{CollapsingHeader, RichText, Ui};
use itertools::Itertools;
use time::{macros::format_description, OffsetDateTime};
use uuid::Uuid;

use crate::barcode_scanner::LoggedPayload;

const SUMMARY_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PayloadKind {
    Link(url::Url),
    Text,
}

impl PayloadKind {
    pub(crate) fn classify(payload: &str) -> Self {
        match url::Url::parse(payload.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Link(url),
            _ => Self::Text,
        }
    }
}

/// A payload that was logged for the first time this session.
#[derive(Debug)]
pub(crate) struct HistoryEntry {
    id: Uuid,
    payload: String,
    decoder: &'static str,
    kind: PayloadKind,
    scanned_at: OffsetDateTime,
}

impl HistoryEntry {
    pub(crate) fn new(logged: LoggedPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: PayloadKind::classify(&logged.payload),
            payload: logged.payload,
            decoder: logged.decoder,
            scanned_at: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
        }
    }

    pub(crate) fn summary(&self) -> String {
        let trimmed_data = self.payload.trim();

        let mut display = trimmed_data
            .chars()
            .filter(|c| !c.is_control())
            .take(SUMMARY_LEN)
            .join("");
        if trimmed_data.chars().count() > SUMMARY_LEN {
            display.push('…');
        }
        display
    }

    pub(crate) fn render(&self, ui: &mut Ui) {
        let scanned_at = self
            .scanned_at
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();

        ui.horizontal(|ui| {
            ui.label(RichText::new(scanned_at).small().weak());
            ui.label(RichText::new(self.decoder).small());
        });

        match &self.kind {
            PayloadKind::Link(url) => {
                if ui.link(self.summary()).on_hover_text(url.as_str()).clicked() {
                    if let Err(err) = open::that(url.as_str()) {
                        tracing::error!("could not open link: {err}");
                    }
                }
            }
            PayloadKind::Text => {
                ui.label(self.summary());

                CollapsingHeader::new("Raw Data")
                    .id_source(format!("{}-data", self.id))
                    .default_open(false)
                    .show(ui, |ui| {
                        let theme =
                            egui_extras::syntax_highlighting::CodeTheme::from_memory(ui.ctx());
                        egui_extras::syntax_highlighting::code_view_ui(
                            ui,
                            &theme,
                            &self.payload,
                            "text",
                        );
                    });
            }
        }
    }
}
