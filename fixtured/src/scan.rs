//! Cooperative main loop
//!
//! Each tick propagates input edges, evaluates the two control buttons and
//! services at most one pending command line. Sequences triggered from here
//! or from a command block the loop until they finish.

use std::future::Future;
use std::time::Duration;

use fixture_core::{ButtonStatus, Result};
use fixture_hardware::SerialLink;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::FixtureController;
use crate::dispatcher::Dispatcher;

/// Sequence started by a held button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Reset,
    Run,
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    pub trigger: Option<Trigger>,
    pub handled_line: bool,
}

pub struct ScanLoop {
    period: Duration,
    dispatcher: Dispatcher,
    buttons_enabled: bool,
    /// Set once a long press has been acted on; cleared when neither
    /// button is held long any more
    latched: bool,
}

impl ScanLoop {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            dispatcher: Dispatcher::new(),
            buttons_enabled: true,
            latched: false,
        }
    }

    pub fn latched(&self) -> bool {
        self.latched
    }

    /// Disable button handling if either control button is missing
    pub fn check_buttons(&mut self, controller: &mut FixtureController) {
        if let Err(e) = controller.button_statuses() {
            warn!("Control buttons unavailable, hardware triggers disabled: {}", e);
            self.buttons_enabled = false;
        }
    }

    fn decide(&mut self, reset: ButtonStatus, start: ButtonStatus) -> Option<Trigger> {
        if self.latched {
            if reset != ButtonStatus::LongPress && start != ButtonStatus::LongPress {
                self.latched = false;
            }
            return None;
        }

        let trigger = if reset == ButtonStatus::LongPress {
            Some(Trigger::Reset)
        } else if start == ButtonStatus::LongPress && reset == ButtonStatus::Idle {
            Some(Trigger::Run)
        } else {
            None
        };
        self.latched = trigger.is_some();
        trigger
    }

    async fn handle_buttons(&mut self, controller: &mut FixtureController) -> Result<Option<Trigger>> {
        let (reset, start) = controller.button_statuses()?;
        let trigger = self.decide(reset, start);
        match trigger {
            Some(Trigger::Reset) => {
                info!("Reset button held, resetting fixture");
                let ok = controller.fixture_reset().await?;
                info!("Button reset finished: {}", if ok { "OK" } else { "ERR" });
            }
            Some(Trigger::Run) => {
                info!("Start button held, running fixture");
                let ok = controller.fixture_run().await?;
                info!("Button run finished: {}", if ok { "OK" } else { "ERR" });
            }
            None => {}
        }
        Ok(trigger)
    }

    /// One pass of the loop, without the trailing sleep.
    pub async fn tick(
        &mut self,
        controller: &mut FixtureController,
        link: &mut dyn SerialLink,
    ) -> Tick {
        let mut tick = Tick::default();

        match controller.graph_mut().poll_bindings() {
            Ok(0) => {}
            Ok(n) => debug!("Propagated {} binding action(s)", n),
            Err(e) => warn!("Edge propagation failed: {}", e),
        }

        if self.buttons_enabled {
            match self.handle_buttons(controller).await {
                Ok(trigger) => tick.trigger = trigger,
                Err(e) => warn!("Button handling failed: {}", e),
            }
        }

        match self.dispatcher.service(controller, link).await {
            Ok(handled) => tick.handled_line = handled,
            Err(e) => warn!("Command link error on {}: {}", link.name(), e),
        }
        tick
    }

    /// Tick every period until `shutdown` resolves. A tick in progress is
    /// finished before stopping.
    pub async fn run<F>(
        &mut self,
        controller: &mut FixtureController,
        link: &mut dyn SerialLink,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        self.check_buttons(controller);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Scan loop running every {:?} on {}", self.period, link.name());
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick(controller, link).await;
                }
            }
        }
        info!("Scan loop stopped");
    }
}
