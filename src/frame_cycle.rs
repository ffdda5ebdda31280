use image::RgbImage;

use crate::{
    barcode_decoders::BarcodeDecoders,
    frame::{self, Frame},
    scan_log::{ScanLog, SeenSet},
};

pub(crate) const STATUS_PREFIX: &str = "QR Code Found: ";

pub(crate) fn status_text(payload: &str) -> String {
    format!("{STATUS_PREFIX}{payload}")
}

/// Work requested by a tick that touches something outside the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    SetStatus(String),
    AppendLog(String),
}

#[derive(Debug)]
pub(crate) struct TickOutcome {
    /// Converted frame to show in place of the previous one.
    pub(crate) display: RgbImage,
    /// Decoder that produced a payload this tick, if any.
    pub(crate) decoder: Option<&'static str>,
    pub(crate) effects: Vec<Effect>,
}

impl TickOutcome {
    pub(crate) fn status(&self) -> Option<&str> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::SetStatus(status) => Some(status.as_str()),
            _ => None,
        })
    }

    pub(crate) fn appended(&self) -> Option<&str> {
        self.effects.iter().find_map(|effect| match effect {
            Effect::AppendLog(payload) => Some(payload.as_str()),
            _ => None,
        })
    }
}

/// Run one frame through conversion, decoding and duplicate tracking.
///
/// Returns `Ok(None)` when there is no frame. Any error leaves the seen set
/// untouched and produces no effects. The transient image only lives for the
/// duration of the decode.
pub(crate) async fn tick(
    frame: Option<Frame>,
    seen: &mut SeenSet,
    decoders: &BarcodeDecoders,
) -> eyre::Result<Option<TickOutcome>> {
    let Some(frame) = frame else {
        return Ok(None);
    };

    let display = frame.into_rgb()?;

    let decoded = {
        let transient = frame::materialize(&display)?;
        decoders.decode(transient.path()).await?
    };

    let mut effects = Vec::new();
    let mut decoder = None;

    if let Some((name, payload)) = decoded {
        tracing::debug!(decoder = name, %payload, "decoded payload");

        decoder = Some(name);
        effects.push(Effect::SetStatus(status_text(&payload)));

        if seen.observe(&payload) {
            effects.push(Effect::AppendLog(payload));
        }
    }

    Ok(Some(TickOutcome {
        display,
        decoder,
        effects,
    }))
}

/// Persist the log effects of a tick.
pub(crate) async fn apply(outcome: &TickOutcome, log: &mut ScanLog) -> eyre::Result<()> {
    for effect in &outcome.effects {
        let Effect::AppendLog(payload) = effect else {
            continue;
        };

        log.record(payload).await?;

        tracing::info!(%payload, "logged new payload");
    }

    Ok(())
}
