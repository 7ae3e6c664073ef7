//! Breathing status LED
//!
//! A fixed-period task walks the PWM duty up and down a triangle wave. The
//! task is the only writer of the duty value; everyone else reads the
//! published copy.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fixture_core::config::BreathingConfig;
use fixture_hardware::pins::{BoxedPwm, SetDutyCycle};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Triangle-wave duty counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreathingRamp {
    duty: i32,
    step: i32,
    min: i32,
    max: i32,
}

impl BreathingRamp {
    pub fn new(config: &BreathingConfig) -> Self {
        let (min, max) = if config.min_duty <= config.max_duty {
            (config.min_duty, config.max_duty)
        } else {
            (config.max_duty, config.min_duty)
        };
        Self {
            duty: i32::from(config.initial_duty.clamp(min, max)),
            step: i32::from(config.step),
            min: i32::from(min),
            max: i32::from(max),
        }
    }

    /// Duty to be written on the next firing
    pub fn duty(&self) -> u16 {
        self.duty as u16
    }

    /// Return the current duty and move one step, bouncing off the range ends.
    pub fn advance(&mut self) -> u16 {
        let current = self.duty;
        let next = current + self.step;
        self.duty = if next >= self.max {
            self.step = -self.step.abs();
            self.max
        } else if next <= self.min {
            self.step = self.step.abs();
            self.min
        } else {
            next
        };
        current as u16
    }
}

/// Handle to the running breathing task
pub struct BreathingTask {
    handle: JoinHandle<()>,
    duty: Arc<AtomicU16>,
}

impl BreathingTask {
    /// Start firing every `config.period_ms`. Must be called inside a tokio
    /// runtime.
    /// Duty values span the full `u16` range and are scaled to the
    /// channel's own resolution.
    pub fn spawn(mut pwm: BoxedPwm, config: &BreathingConfig) -> Self {
        let mut ramp = BreathingRamp::new(config);
        let duty = Arc::new(AtomicU16::new(ramp.duty()));
        let published = duty.clone();
        let period = Duration::from_millis(config.period_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let value = ramp.advance();
                if let Err(e) = pwm.set_duty_cycle_fraction(value, u16::MAX) {
                    error!("Breathing LED stopped, PWM write failed: {}", e);
                    break;
                }
                published.store(value, Ordering::Relaxed);
            }
        });

        info!(
            "Breathing LED started (period {:?}, step {})",
            period, config.step
        );
        Self { handle, duty }
    }

    /// Last duty written to the PWM channel
    pub fn duty(&self) -> u16 {
        self.duty.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
        info!("Breathing LED stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixture_hardware::sim::SimPwm;

    fn config(initial: u16, step: u16, min: u16, max: u16) -> BreathingConfig {
        BreathingConfig {
            initial_duty: initial,
            step,
            min_duty: min,
            max_duty: max,
            ..BreathingConfig::default()
        }
    }

    #[test]
    fn test_ramp_bounces_between_limits() {
        let mut ramp = BreathingRamp::new(&config(0, 4, 0, 10));
        let seq: Vec<u16> = (0..10).map(|_| ramp.advance()).collect();
        assert_eq!(seq, vec![0, 4, 8, 10, 6, 2, 0, 4, 8, 10]);
    }

    #[test]
    fn test_ramp_default_stays_in_u16_range() {
        let mut ramp = BreathingRamp::new(&BreathingConfig::default());
        assert_eq!(ramp.advance(), 32768);
        let mut saw_top = false;
        let mut saw_bottom = false;
        for _ in 0..1000 {
            let duty = ramp.advance();
            saw_top |= duty == u16::MAX;
            saw_bottom |= duty == 0;
        }
        assert!(saw_top && saw_bottom);
    }

    #[test]
    fn test_initial_duty_is_clamped() {
        let ramp = BreathingRamp::new(&config(500, 1, 100, 200));
        assert_eq!(ramp.duty(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_writes_every_period_until_stopped() {
        let pwm = SimPwm::new();
        let task = BreathingTask::spawn(Box::new(pwm.clone()), &config(1000, 100, 0, 5000));

        tokio::time::sleep(Duration::from_millis(35)).await;
        let writes = pwm.writes();
        assert!((3..=5).contains(&writes), "unexpected write count {}", writes);
        assert_eq!(task.duty(), pwm.duty());
        assert!(task.is_running());

        task.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pwm.writes() <= writes + 1);
    }
}
