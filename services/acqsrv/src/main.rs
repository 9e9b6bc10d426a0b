//! Weather station acquisition daemon

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use acqsrv::core::bootstrap::{self, Args, ServiceArgs};
use acqsrv::core::config::AppConfig;
use acqsrv::core::transport::SerialTransport;
use acqsrv::notify::{AlertSender, LogSender, WebhookSender};
use acqsrv::{AcqError, Station};
use common::service_bootstrap::ServiceInfo;
use errors::StationError;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("acqsrv terminated: {e}");
        eprintln!("acqsrv: {e}");
        let err: StationError = e.into();
        std::process::exit(err.exit_code());
    }
}

async fn run(args: Args) -> acqsrv::Result<()> {
    let service_args: ServiceArgs = args.clone().into();
    let service_info = ServiceInfo::new("acqsrv", "Weather Station Acquisition Service");

    // Logging needs the configured directory, so load before initializing
    let loaded = AppConfig::load(&args.config);
    let log_dir = loaded.as_ref().ok().and_then(|c| c.logging.dir.clone());
    let log_path = bootstrap::initialize_logging(&service_args, &service_info, log_dir.as_deref())?;
    if !args.no_color {
        common::service_bootstrap::print_startup_banner(&service_info);
    }
    info!("Logging to {}", log_path.display());

    if args.validate {
        bootstrap::validate_configuration(&args.config)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    let config = loaded?;
    let transport = SerialTransport::new(config.serial.transport_config())?;
    let sender: Arc<dyn AlertSender> = match &config.notify.webhook_url {
        Some(url) => Arc::new(
            WebhookSender::new(url.clone(), config.notify.send_timeout())
                .map_err(|e| AcqError::notify(e.to_string()))?,
        ),
        None => Arc::new(LogSender),
    };

    let station = Station::start(config, Box::new(transport), sender).await?;

    let token = CancellationToken::new();
    let signals = common::shutdown::spawn_signal_listener(token.clone());

    let result = station.run(token).await;
    signals.abort();
    result
}
