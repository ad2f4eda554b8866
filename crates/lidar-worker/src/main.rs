//! Worker process entry point: loads [`Settings`] from the environment,
//! wires up a broker client, and runs the poll/dispatch/publish loop until
//! a shutdown signal arrives.

use std::sync::Arc;

use lidar_worker::{install_shutdown_handler, InMemoryBroker, Settings, Worker};

fn main() {
    env_logger::init();

    let settings = Settings::from_env();
    log::info!(
        "lidar-worker starting against broker {} (queue {})",
        settings.broker_url,
        settings.queue_name
    );

    // No production broker backend (Redis, SQS, ...) is wired into this
    // workspace; the in-memory broker lets the binary run standalone for
    // local testing. A real deployment swaps this for a `BrokerClient`
    // impl backed by `settings.broker_url`.
    let broker = Arc::new(InMemoryBroker::new());
    let worker = Worker::new(broker, settings);
    install_shutdown_handler(worker.shutdown_handle());

    let processed = worker.run();
    log::info!("lidar-worker exiting after {} job(s)", processed);
}
