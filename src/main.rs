mod barcode_decoders;
mod barcode_scanner;
mod config;
mod frame;
mod frame_cycle;
mod frame_source;
mod scan_log;
mod ui;

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("starting qr scanner");

    // Safety: Environment variables aren't mutated, so this should be safe.
    unsafe {
        time::util::local_offset::set_soundness(time::util::local_offset::Soundness::Unsound)
    };

    ui::show_ui()
}
