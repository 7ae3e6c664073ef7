//! Sensor-interlocked actuation sequences
//!
//! Every move energizes or releases one cylinder and then polls the four
//! position sensors until they report the expected pattern or the timeout
//! expires. Interlock misses and timeouts are `Ok(false)`; only device
//! lookup and driver failures are errors. Nothing is rolled back on failure.

use std::time::Duration;

use fixture_core::config::{FixtureLayout, SequencerConfig};
use fixture_core::{FixtureError, Result, SensorPattern};
use fixture_hardware::DeviceGraph;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Horizontal stage retracted inward, vertical stage parked up
const IN_AND_UP: SensorPattern = SensorPattern::new(true, false, true, false);
/// Horizontal stage pushed out, vertical stage parked up
const OUT_AND_UP: SensorPattern = SensorPattern::new(false, true, true, false);
/// Horizontal stage in, vertical stage lowered
const IN_AND_DOWN: SensorPattern = SensorPattern::new(true, false, false, true);

/// Drives the fixture's cylinders through its interlocked moves
#[derive(Debug, Clone)]
pub struct Sequencer {
    layout: FixtureLayout,
    poll_interval: Duration,
    actuation_timeout: Duration,
    settle: Duration,
    loop_dwell: Duration,
    ctl_out_timeout: Duration,
}

impl Sequencer {
    pub fn new(layout: FixtureLayout, config: &SequencerConfig) -> Self {
        Self {
            layout,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            actuation_timeout: Duration::from_millis(config.actuation_timeout_ms),
            settle: Duration::from_millis(config.settle_ms),
            loop_dwell: Duration::from_millis(config.loop_dwell_ms),
            ctl_out_timeout: Duration::from_millis(config.ctl_out_timeout_ms),
        }
    }

    pub fn layout(&self) -> &FixtureLayout {
        &self.layout
    }

    pub fn actuation_timeout(&self) -> Duration {
        self.actuation_timeout
    }

    fn read_named(graph: &mut DeviceGraph, name: &str) -> Result<bool> {
        let id = graph.lookup(name)?;
        graph.read(id)
    }

    /// Current `(in, out, up, down)` sensor pattern
    pub fn sample(&self, graph: &mut DeviceGraph) -> Result<SensorPattern> {
        Ok(SensorPattern::new(
            Self::read_named(graph, &self.layout.in_sensor)?,
            Self::read_named(graph, &self.layout.out_sensor)?,
            Self::read_named(graph, &self.layout.up_sensor)?,
            Self::read_named(graph, &self.layout.down_sensor)?,
        ))
    }

    /// Energize `valve` (release it if `reverse`), then wait up to `timeout`
    /// for the sensors to read `target`.
    pub async fn actuate_and_wait(
        &self,
        graph: &mut DeviceGraph,
        valve: &str,
        reverse: bool,
        target: SensorPattern,
        timeout: Duration,
    ) -> Result<bool> {
        let id = graph.lookup(valve)?;
        if reverse {
            graph.off(id)?;
        } else {
            graph.on(id)?;
        }

        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.sample(graph)? == target {
                debug!(
                    "'{}' reached {} after {:?}",
                    valve,
                    target,
                    start.elapsed()
                );
                return Ok(true);
            }
            sleep(self.poll_interval).await;
        }

        warn!(
            "'{}' did not reach {} within {:?}, last seen {}",
            valve,
            target,
            timeout,
            self.sample(graph)?
        );
        Ok(false)
    }

    /// True if both guard sensors read `(true, false)`
    fn interlock_clear(&self, graph: &mut DeviceGraph, high: &str, low: &str) -> Result<bool> {
        let clear = Self::read_named(graph, high)? && !Self::read_named(graph, low)?;
        if !clear {
            warn!(
                "Interlock not met: expected {}=true and {}=false",
                high, low
            );
        }
        Ok(clear)
    }

    async fn horizontal(&self, graph: &mut DeviceGraph, reverse: bool, target: SensorPattern) -> Result<bool> {
        if !self.interlock_clear(graph, &self.layout.up_sensor, &self.layout.down_sensor)? {
            return Ok(false);
        }
        self.actuate_and_wait(
            graph,
            &self.layout.in_out_cylinder,
            reverse,
            target,
            self.actuation_timeout,
        )
        .await
    }

    async fn vertical(&self, graph: &mut DeviceGraph, reverse: bool, target: SensorPattern) -> Result<bool> {
        if !self.interlock_clear(graph, &self.layout.in_sensor, &self.layout.out_sensor)? {
            return Ok(false);
        }
        self.actuate_and_wait(
            graph,
            &self.layout.up_down_cylinder,
            reverse,
            target,
            self.actuation_timeout,
        )
        .await
    }

    /// Retract the horizontal stage; requires the vertical stage parked up.
    pub async fn fixture_in(&self, graph: &mut DeviceGraph) -> Result<bool> {
        self.horizontal(graph, true, IN_AND_UP).await
    }

    /// Extend the horizontal stage; requires the vertical stage parked up.
    pub async fn fixture_out(&self, graph: &mut DeviceGraph) -> Result<bool> {
        self.horizontal(graph, false, OUT_AND_UP).await
    }

    /// Raise the vertical stage; requires the horizontal stage in.
    pub async fn fixture_up(&self, graph: &mut DeviceGraph) -> Result<bool> {
        self.vertical(graph, true, IN_AND_UP).await
    }

    /// Lower the vertical stage; requires the horizontal stage in.
    pub async fn fixture_down(&self, graph: &mut DeviceGraph) -> Result<bool> {
        self.vertical(graph, false, IN_AND_DOWN).await
    }

    /// Release the DUT, then raise and extend without checking interlocks.
    ///
    /// The raise result is not checked; the return value is that of the
    /// final horizontal move.
    pub async fn fixture_reset(&self, graph: &mut DeviceGraph) -> Result<bool> {
        info!("Resetting fixture");
        self.fixture_uninsert(graph, true)?;
        sleep(self.settle).await;

        if !self
            .actuate_and_wait(
                graph,
                &self.layout.up_down_cylinder,
                true,
                IN_AND_UP,
                self.actuation_timeout,
            )
            .await?
        {
            warn!("Reset: vertical stage did not report up, continuing");
        }

        self.actuate_and_wait(
            graph,
            &self.layout.in_out_cylinder,
            false,
            OUT_AND_UP,
            self.actuation_timeout,
        )
        .await
    }

    /// Clamp sequence: in, down, settle, insert.
    ///
    /// Every step runs even if an earlier move failed; the result is that
    /// of the final insert.
    pub async fn fixture_run(&self, graph: &mut DeviceGraph) -> Result<bool> {
        info!("Running fixture clamp sequence");
        if !self.fixture_in(graph).await? {
            warn!("Run: fixture_in failed, continuing");
        }
        if !self.fixture_down(graph).await? {
            warn!("Run: fixture_down failed, continuing");
        }
        sleep(self.settle).await;
        self.fixture_uninsert(graph, false)
    }

    /// Release (`true`, outputs off) or insert (`false`, outputs on)
    pub fn fixture_uninsert(&self, graph: &mut DeviceGraph, release: bool) -> Result<bool> {
        for name in &self.layout.uninsert_outputs {
            let id = graph.lookup(name)?;
            if release {
                graph.off(id)?;
            } else {
                graph.on(id)?;
            }
        }
        Ok(true)
    }

    /// Drive the insert outputs and wait for both type-C sensors to agree.
    pub async fn ctl_out(&self, graph: &mut DeviceGraph, engage: bool) -> Result<bool> {
        for name in &self.layout.uninsert_outputs {
            let id = graph.lookup(name)?;
            if engage {
                graph.on(id)?;
            } else {
                graph.off(id)?;
            }
        }

        let start = Instant::now();
        while start.elapsed() < self.ctl_out_timeout {
            let mut all_match = true;
            for name in &self.layout.typec_sensors {
                if Self::read_named(graph, name)? != engage {
                    all_match = false;
                }
            }
            if all_match {
                return Ok(true);
            }
            sleep(self.poll_interval).await;
        }

        warn!(
            "Type-C sensors did not read {} within {:?}",
            engage, self.ctl_out_timeout
        );
        Ok(false)
    }

    /// Endurance loop: run, dwell, reset, dwell; `cycles` times.
    pub async fn loop_test(&self, graph: &mut DeviceGraph, cycles: u32) -> Result<bool> {
        for cycle in 1..=cycles {
            debug!("loop_test cycle {}/{}", cycle, cycles);
            if !self.fixture_run(graph).await? {
                warn!("loop_test cycle {}: run failed", cycle);
            }
            sleep(self.loop_dwell).await;
            if !self.fixture_reset(graph).await? {
                warn!("loop_test cycle {}: reset failed", cycle);
            }
            sleep(self.loop_dwell).await;
        }
        Ok(true)
    }

    /// Horizontal-only endurance loop: in, release, dwell, out, dwell.
    pub async fn loop_test1(&self, graph: &mut DeviceGraph, cycles: u32) -> Result<bool> {
        for cycle in 1..=cycles {
            debug!("loop_test1 cycle {}/{}", cycle, cycles);
            if !self.fixture_in(graph).await? {
                warn!("loop_test1 cycle {}: fixture_in failed", cycle);
            }
            self.fixture_uninsert(graph, true)?;
            sleep(self.loop_dwell).await;
            if !self.fixture_out(graph).await? {
                warn!("loop_test1 cycle {}: fixture_out failed", cycle);
            }
            sleep(self.loop_dwell).await;
        }
        Ok(true)
    }
}

/// Convert a loop count argument, rejecting negatives
pub fn cycle_count(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| FixtureError::InvalidArgument(format!("cycle count {} out of range", value)))
}
