use std::env;
use std::path::PathBuf;
use futures::channel::mpsc::channel;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::error::AppRunError;
use crate::fusion::controller::FusionController;
use crate::transport::ble::BleTransport;
use crate::transport::TransportEvent;

pub mod actuator;
pub mod config;
pub mod error;
pub mod fusion;
pub mod registry;
pub mod sensor;
pub mod transport;

pub fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), AppRunError> {
    let config_io = ConfigIO::open(config_path)?;
    let mut locker = config_io.locker()?;
    let _lock_guard = locker.lock()?;

    let config = config_io.read().await?;
    info!("Using haptic tuning {:?}", config);

    let cancel = CancellationToken::new();
    let (event_sender, event_receiver) = channel::<TransportEvent>(128);

    let (transport, driver_handle) = BleTransport::spawn(cancel.child_token(), event_sender);
    let controller = FusionController::new(config, transport, cancel.child_token());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                cancel.cancel();
            }
        }
    });

    // if the transport driver dies (e.g. no adapter), take the controller
    // down with it
    let driver_watch = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = driver_handle.await;
            cancel.cancel();
            result
        }
    });

    controller.run(event_receiver).await;

    driver_watch
        .await
        .expect("Failed to join transport watcher")
        .expect("Failed to join transport driver")?;

    Ok(())
}
