//! Shutdown handling for graceful daemon termination
//!
//! Waits for Ctrl+C or SIGTERM, then winds down the background work and,
//! if configured, drives every output to its stop level.

use fixture_core::config::ShutdownConfig;
use tokio::signal;
use tracing::{info, warn};

use crate::breathing::BreathingTask;
use crate::controller::FixtureController;

/// Wait for a shutdown signal.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other one still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

/// Stop the breathing task and, when enabled, every output device.
pub fn finalize(
    config: &ShutdownConfig,
    controller: &mut FixtureController,
    breathing: Option<BreathingTask>,
) {
    if let Some(task) = breathing {
        task.stop();
    }

    if config.stop_outputs {
        info!("Driving outputs to their stop level...");
        if let Err(e) = controller.stop_outputs() {
            warn!("Failed to stop outputs during shutdown: {}", e);
        }
    } else {
        info!("Leaving outputs as they are");
    }

    info!("Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FixtureParamsStore;
    use crate::sequencer::Sequencer;
    use fixture_core::config::{BreathingConfig, FixtureLayout, SequencerConfig};
    use fixture_core::Level;
    use fixture_hardware::sim::{SimPinBank, SimPwm};
    use fixture_hardware::{Device, DeviceGraph, OutputDevice, PinProvider};
    use std::time::Duration;

    fn controller(bank: &SimPinBank) -> FixtureController {
        let mut graph = DeviceGraph::new();
        let pin = bank.output_pin(7).unwrap();
        graph
            .add("valve", Device::Output(OutputDevice::new(pin, Level::High)))
            .unwrap();
        FixtureController::new(
            graph,
            Sequencer::new(FixtureLayout::default(), &SequencerConfig::default()),
            FixtureParamsStore::in_memory("/nonexistent/fixture_config.json"),
            None,
        )
    }

    #[tokio::test]
    async fn test_finalize_stops_outputs_when_enabled() {
        let bank = SimPinBank::new();
        let mut controller = controller(&bank);
        let valve = controller.graph().id("valve").unwrap();
        controller.graph_mut().on(valve).unwrap();
        assert_eq!(bank.level(7), Some(Level::High));

        finalize(&ShutdownConfig { stop_outputs: true }, &mut controller, None);
        assert_eq!(bank.level(7), Some(Level::Low));
    }

    #[tokio::test]
    async fn test_finalize_leaves_outputs_by_default() {
        let bank = SimPinBank::new();
        let mut controller = controller(&bank);
        let valve = controller.graph().id("valve").unwrap();
        controller.graph_mut().on(valve).unwrap();

        finalize(&ShutdownConfig::default(), &mut controller, None);
        assert_eq!(bank.level(7), Some(Level::High));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_aborts_breathing() {
        let bank = SimPinBank::new();
        let mut controller = controller(&bank);
        let pwm = SimPwm::new();
        let task = BreathingTask::spawn(Box::new(pwm.clone()), &BreathingConfig::default());
        tokio::time::sleep(Duration::from_millis(25)).await;

        finalize(&ShutdownConfig::default(), &mut controller, Some(task));
        let writes = pwm.writes();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pwm.writes() <= writes + 1);
    }
}
