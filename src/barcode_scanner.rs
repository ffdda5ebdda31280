use std::time::Duration;

use image::RgbImage;
use tokio::{
    runtime::Handle,
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    barcode_decoders::BarcodeDecoders,
    frame_cycle,
    frame_source::BoxedFrameSource,
    scan_log::ScanLog,
};

/// What one completed tick means for the display.
#[derive(Debug)]
pub(crate) struct ScanReport {
    pub(crate) display: RgbImage,
    pub(crate) status: Option<String>,
    /// Set when the payload was seen for the first time and written to the log.
    pub(crate) logged: Option<LoggedPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoggedPayload {
    pub(crate) payload: String,
    pub(crate) decoder: &'static str,
}

#[derive(Debug)]
pub(crate) enum ScanEvent {
    Report(ScanReport),
    TickFailed(String),
}

pub(crate) struct Scanner {
    pub(crate) source: BoxedFrameSource,
    pub(crate) decoders: BarcodeDecoders,
    pub(crate) log: ScanLog,
    pub(crate) period: Duration,
}

/// Spawn the scan loop on the given runtime.
///
/// The loop stops when the token is cancelled or the receiver is dropped.
pub(crate) fn start_scanner(
    rt: &Handle,
    token: CancellationToken,
    scanner: Scanner,
) -> mpsc::Receiver<ScanEvent> {
    let (tx, rx) = mpsc::channel(4);

    rt.spawn(async move {
        scan_loop(token, tx, scanner).await;
    });

    rx
}

#[tracing::instrument(skip_all, fields(source = scanner.source.name(), period = ?scanner.period))]
async fn scan_loop(token: CancellationToken, tx: mpsc::Sender<ScanEvent>, mut scanner: Scanner) {
    let mut interval = interval(scanner.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("starting scanner");

    // A broken source fails every tick, so only changes are worth a warning.
    let mut last_failure: Option<String> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let event = match scan_once(&mut scanner).await {
                    Ok(Some(report)) => {
                        last_failure = None;
                        ScanEvent::Report(report)
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        let message = format!("{err:#}");
                        if last_failure.as_deref() != Some(message.as_str()) {
                            tracing::warn!("scan tick failed: {message}");
                        }
                        last_failure = Some(message.clone());
                        ScanEvent::TickFailed(message)
                    }
                };

                if let Err(err) = tx.send(event).await {
                    tracing::error!("could not send scan event: {err}");
                    break;
                }
            }
            _ = tx.closed() => {
                tracing::info!("receiver closed, ending task");
                break;
            }
            _ = token.cancelled() => {
                tracing::info!("task cancelled, ending");
                break;
            }
        }
    }
}

async fn scan_once(scanner: &mut Scanner) -> eyre::Result<Option<ScanReport>> {
    scanner.source.check()?;

    let frame = scanner.source.current_frame();

    let Some(outcome) =
        frame_cycle::tick(frame, &mut scanner.log.seen, &scanner.decoders).await?
    else {
        return Ok(None);
    };

    frame_cycle::apply(&outcome, &mut scanner.log).await?;

    let logged = match (outcome.appended(), outcome.decoder) {
        (Some(payload), Some(decoder)) => Some(LoggedPayload {
            payload: payload.to_string(),
            decoder,
        }),
        _ => None,
    };

    Ok(Some(ScanReport {
        status: outcome.status().map(str::to_string),
        logged,
        display: outcome.display,
    }))
}
