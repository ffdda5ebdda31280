use std::{collections::VecDeque, time::Duration};

use eframe::{
    egui::{
        self, load::SizedTexture, menu, pos2, vec2, CentralPanel, Color32, ColorImage, Rect,
        ScrollArea, SidePanel, TextureHandle, TextureOptions, TopBottomPanel, Window,
    },
    run_native, App, NativeOptions,
};
use eyre::WrapErr;
use itertools::Itertools;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    barcode_decoders::BarcodeDecoders,
    barcode_scanner::{self, ScanEvent, ScanReport, Scanner},
    config::{self, ConfigLoader, ScannerConfig},
    frame_source,
    scan_log::ScanLog,
};

use self::{
    decoder_settings::{DecoderSettings, UiConfig},
    history::HistoryEntry,
};

mod decoder_settings;
mod history;

const HISTORY_LEN: usize = 100;
const IDLE_STATUS: &str = "Scan a QR code";

#[derive(Debug)]
struct State {
    status: String,
    last_error: Option<String>,
    decoder_settings_open: bool,
    history: VecDeque<HistoryEntry>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            status: IDLE_STATUS.to_string(),
            last_error: None,
            decoder_settings_open: false,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }
}

struct Application {
    state: State,
    rx: mpsc::Receiver<ScanEvent>,
    camera_texture: Option<TextureHandle>,
    decoder_settings: DecoderSettings,
    repaint_after: Duration,

    // Cancels the scanner once the window goes away.
    #[allow(dead_code)]
    scanner_guard: DropGuard,
}

impl Application {
    fn handle_event(&mut self, ctx: &egui::Context, event: ScanEvent) {
        match event {
            ScanEvent::Report(report) => self.apply_report(ctx, report),
            ScanEvent::TickFailed(err) => {
                self.state.last_error = Some(err);
            }
        }
    }

    fn apply_report(&mut self, ctx: &egui::Context, report: ScanReport) {
        let ScanReport {
            display,
            status,
            logged,
        } = report;

        if let Some(status) = status {
            if status != self.state.status {
                tracing::debug!(%status, "updating status");
                self.state.status = status;
            }
        }

        if let Some(logged) = logged {
            self.state.history.push_front(HistoryEntry::new(logged));
            self.state.history.truncate(HISTORY_LEN);
        }

        self.state.last_error = None;

        let size = [display.width() as usize, display.height() as usize];
        let image = ColorImage::from_rgb(size, display.as_raw());

        match &mut self.camera_texture {
            Some(texture) => texture.set(image, TextureOptions::default()),
            None => {
                self.camera_texture =
                    Some(ctx.load_texture("camera", image, TextureOptions::default()));
            }
        }
    }
}

impl App for Application {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(ctx, event);
        }

        Window::new("Decoders")
            .open(&mut self.state.decoder_settings_open)
            .resizable(false)
            .default_rect(Rect::from_min_size(pos2(10.0, 80.0), vec2(160.0, 120.0)))
            .show(ctx, |ui| self.decoder_settings.render(ui));

        TopBottomPanel::top("top_panel").show(ctx, |ui| {
            menu::bar(ui, |ui| {
                ui.menu_button("Settings", |ui| {
                    if ui.button("Decoders").clicked() {
                        self.state.decoder_settings_open = true;
                        ui.close_menu();
                    }
                });
            });
        });

        TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
            ui.heading(&self.state.status);

            if let Some(err) = &self.state.last_error {
                ui.colored_label(Color32::LIGHT_RED, err);
            }
        });

        SidePanel::right("history_panel")
            .min_width(200.0)
            .show(ctx, |ui| {
                ui.heading("Scan History");

                ScrollArea::vertical().show(ui, |ui| {
                    for entry in self.state.history.iter() {
                        entry.render(ui);
                        ui.separator();
                    }
                });
            });

        CentralPanel::default().show(ctx, |ui| match &self.camera_texture {
            Some(texture) => {
                ui.centered_and_justified(|ui| {
                    ui.add(
                        egui::Image::from_texture(SizedTexture::from_handle(texture))
                            .shrink_to_fit(),
                    );
                });
            }
            None => {
                ui.centered_and_justified(|ui| ui.label("Waiting for camera…"));
            }
        });

        ctx.request_repaint_after(self.repaint_after);
    }
}

pub(crate) fn show_ui() -> eyre::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let config_path = config::default_config_path();
    let loader = rt.block_on(ConfigLoader::read_or_default(&config_path))?;

    let mut scanner_config = ScannerConfig::default();
    let mut ui_config = UiConfig::default();
    rt.block_on(async {
        loader.restore_object(&mut scanner_config).await?;
        loader.restore_object(&mut ui_config).await
    })
    .wrap_err_with(|| format!("invalid config in {}", config_path.display()))?;

    tracing::debug!(?scanner_config, ?ui_config, "loaded config");

    let period = scanner_config.tick_period()?;
    let decoders = BarcodeDecoders::from_config(&scanner_config.decoders)?;
    rt.block_on(async {
        for name in &ui_config.disabled_decoders {
            decoders.toggle_decoder(name, false).await;
        }
    });

    let log = rt.block_on(ScanLog::open(
        &scanner_config.log_path,
        scanner_config.preload_seen,
    ))?;
    let source = frame_source::open_source(&scanner_config.source)
        .wrap_err("could not open frame source")?;

    let token = CancellationToken::new();
    let rx = barcode_scanner::start_scanner(
        rt.handle(),
        token.clone(),
        Scanner {
            source,
            decoders: decoders.clone(),
            log,
            period,
        },
    );

    let decoder_settings = DecoderSettings::new(
        rt.handle().clone(),
        decoders.clone(),
        ui_config.disabled_decoders.iter().cloned().collect(),
    );

    let scanner_guard = token.clone().drop_guard();
    let result = run_native(
        "QR Scanner",
        NativeOptions::default(),
        Box::new(move |_cc| {
            Box::new(Application {
                state: State::default(),
                rx,
                camera_texture: None,
                decoder_settings,
                repaint_after: period,
                scanner_guard,
            })
        }),
    )
    .map_err(|err| eyre::eyre!("egui error: {err}"));

    token.cancel();

    ui_config.disabled_decoders = rt
        .block_on(decoders.disabled())
        .into_iter()
        .sorted()
        .collect();

    if let Err(err) = rt.block_on(async {
        loader.save_object(&scanner_config).await?;
        loader.save_object(&ui_config).await?;
        loader.save(&config_path).await
    }) {
        tracing::warn!(path = %config_path.display(), "could not save config: {err}");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{barcode_decoders::tests::ScriptedDecoder, barcode_scanner::LoggedPayload};

    fn application(rx: mpsc::Receiver<ScanEvent>) -> Application {
        let decoders = BarcodeDecoders::new(vec![Box::new(ScriptedDecoder::always(None))]);

        Application {
            state: State::default(),
            rx,
            camera_texture: None,
            decoder_settings: DecoderSettings::new(
                tokio::runtime::Handle::current(),
                decoders,
                Default::default(),
            ),
            repaint_after: Duration::from_millis(33),
            scanner_guard: CancellationToken::new().drop_guard(),
        }
    }

    fn report(status: Option<&str>, logged: Option<&str>) -> ScanEvent {
        ScanEvent::Report(ScanReport {
            display: image::RgbImage::new(4, 2),
            status: status.map(str::to_string),
            logged: logged.map(|payload| LoggedPayload {
                payload: payload.to_string(),
                decoder: "rqrr",
            }),
        })
    }

    #[tokio::test]
    async fn reports_update_status_history_and_texture() {
        let (_tx, rx) = mpsc::channel(1);
        let mut app = application(rx);
        let ctx = egui::Context::default();

        assert_eq!(app.state.status, "Scan a QR code");

        app.handle_event(&ctx, report(None, None));
        assert_eq!(app.state.status, "Scan a QR code");
        assert_eq!(
            app.camera_texture.as_ref().map(|texture| texture.size()),
            Some([4, 2])
        );

        app.handle_event(&ctx, report(Some("QR Code Found: HELLO"), Some("HELLO")));
        app.handle_event(&ctx, report(Some("QR Code Found: HELLO"), None));

        assert_eq!(app.state.status, "QR Code Found: HELLO");
        assert_eq!(app.state.history.len(), 1);
        assert_eq!(app.state.history[0].summary(), "HELLO");
    }

    #[tokio::test]
    async fn failures_are_shown_until_next_report() {
        let (_tx, rx) = mpsc::channel(1);
        let mut app = application(rx);
        let ctx = egui::Context::default();

        app.handle_event(&ctx, ScanEvent::TickFailed("bad frame".to_string()));
        assert_eq!(app.state.last_error.as_deref(), Some("bad frame"));

        app.handle_event(&ctx, report(None, None));
        assert_eq!(app.state.last_error, None);
    }

    #[tokio::test]
    async fn history_is_capped() {
        let (_tx, rx) = mpsc::channel(1);
        let mut app = application(rx);
        let ctx = egui::Context::default();

        for i in 0..HISTORY_LEN + 5 {
            let payload = i.to_string();
            app.handle_event(&ctx, report(None, Some(&payload)));
        }

        assert_eq!(app.state.history.len(), HISTORY_LEN);
        assert_eq!(
            app.state.history[0].summary(),
            (HISTORY_LEN + 4).to_string()
        );
    }
}
