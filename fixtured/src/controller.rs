//! Fixture controller context
//!
//! Owns the device graph, sequencer, parameter store and optional LED board.
//! Constructed once at startup and passed by reference to the scan loop and
//! the dispatcher.

use fixture_core::{Arg, ButtonStatus, FixtureError, Level, Result};
use fixture_hardware::{DeviceGraph, LedBoard, LedColor};
use serde_json::{Map, Value};
use tracing::info;

use crate::dispatcher::{Command, Outcome};
use crate::params::FixtureParamsStore;
use crate::sequencer::{cycle_count, Sequencer};

pub struct FixtureController {
    graph: DeviceGraph,
    sequencer: Sequencer,
    params: FixtureParamsStore,
    led_board: Option<LedBoard>,
}

impl FixtureController {
    pub fn new(
        graph: DeviceGraph,
        sequencer: Sequencer,
        params: FixtureParamsStore,
        led_board: Option<LedBoard>,
    ) -> Self {
        Self {
            graph,
            sequencer,
            params,
            led_board,
        }
    }

    pub fn graph(&self) -> &DeviceGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut DeviceGraph {
        &mut self.graph
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn params(&self) -> &FixtureParamsStore {
        &self.params
    }

    /// Press status of the `(reset, start)` buttons
    pub fn button_statuses(&mut self) -> Result<(ButtonStatus, ButtonStatus)> {
        let layout = self.sequencer.layout();
        let reset = self.graph.lookup(&layout.reset_button)?;
        let start = self.graph.lookup(&layout.start_button)?;
        Ok((self.graph.read_status(reset)?, self.graph.read_status(start)?))
    }

    pub async fn fixture_reset(&mut self) -> Result<bool> {
        self.sequencer.fixture_reset(&mut self.graph).await
    }

    pub async fn fixture_run(&mut self) -> Result<bool> {
        self.sequencer.fixture_run(&mut self.graph).await
    }

    /// Drive every output to its stop level
    pub fn stop_outputs(&mut self) -> Result<()> {
        self.graph.stop_outputs()
    }

    fn led_board(&mut self) -> Result<&mut LedBoard> {
        self.led_board.as_mut().ok_or(FixtureError::LedBoardUnavailable)
    }

    /// Run `command` with arguments already checked for count.
    pub async fn execute(&mut self, command: Command, args: &[Arg]) -> Result<Outcome> {
        let outcome: Outcome = match command {
            Command::FixtureIn => self.sequencer.fixture_in(&mut self.graph).await?.into(),
            Command::FixtureOut => self.sequencer.fixture_out(&mut self.graph).await?.into(),
            Command::FixtureUp => self.sequencer.fixture_up(&mut self.graph).await?.into(),
            Command::FixtureDown => self.sequencer.fixture_down(&mut self.graph).await?.into(),
            Command::FixtureReset => self.fixture_reset().await?.into(),
            Command::FixtureRun => self.fixture_run().await?.into(),
            Command::FixtureUninsert => {
                let release = args[0].is_truthy();
                self.sequencer.fixture_uninsert(&mut self.graph, release)?.into()
            }
            Command::CtlOut => {
                let engage = args[0].is_truthy();
                self.sequencer.ctl_out(&mut self.graph, engage).await?.into()
            }
            Command::LoopTest => {
                let cycles = cycle_count(int_arg(&args[0], "num")?)?;
                self.sequencer.loop_test(&mut self.graph, cycles).await?.into()
            }
            Command::LoopTest1 => {
                let cycles = cycle_count(int_arg(&args[0], "num")?)?;
                self.sequencer.loop_test1(&mut self.graph, cycles).await?.into()
            }
            Command::LedStateValue => self.led_state_value(&args[0], &args[1])?,
            Command::LedOff => {
                self.led_board()?.reset()?;
                true.into()
            }
            Command::GetPinStatus => self.get_pin_status(&args[0].as_text())?,
            Command::SetPinStatus => self.set_pin_status(&args[0].as_text(), &args[1])?,
            Command::GetAllStatus => self.get_all_status()?,
            Command::GetStatus => self.get_status()?,
            Command::FixtureParaGet => {
                let value = self
                    .params
                    .get(&args[0].as_text())
                    .cloned()
                    .unwrap_or(Value::Null);
                Outcome::with_lines(true, vec![serde_json::to_string(&value)?])
            }
            Command::FixtureParaSet => {
                let key = args[0].as_text();
                self.params.set(&key, args[1].to_json()).await?;
                info!("Fixture parameter '{}' set to {}", key, args[1]);
                Outcome::with_lines(true, vec!["Save OK".to_string()])
            }
        };
        Ok(outcome)
    }

    fn led_state_value(&mut self, slot: &Arg, color: &Arg) -> Result<Outcome> {
        let slot = int_arg(slot, "slot")?;
        let slot = usize::try_from(slot)
            .map_err(|_| FixtureError::InvalidArgument(format!("LED slot {} out of range", slot)))?;
        let color: LedColor = color.as_text().parse()?;
        self.led_board()?.set_state(slot, color)?;
        Ok(true.into())
    }

    fn get_pin_status(&mut self, name: &str) -> Result<Outcome> {
        let id = self.graph.lookup(name)?;
        let level = self.graph.pin_level(id)?;
        Ok(Outcome::with_lines(
            true,
            vec![format!("Pin_num{}: {}", name, level)],
        ))
    }

    fn set_pin_status(&mut self, name: &str, value: &Arg) -> Result<Outcome> {
        let id = self.graph.lookup(name)?;
        self.graph.set_pin_level(id, Level::from(value.is_truthy()))?;
        Ok(true.into())
    }

    /// Pin level of every pin-backed device, in declaration order
    fn get_all_status(&mut self) -> Result<Outcome> {
        let ids: Vec<_> = self.graph.iter().map(|(id, _, _)| id).collect();

        let mut lines = Vec::new();
        for id in ids {
            let level = self.graph.get_mut(id).pin_level();
            if let Some(level) = level {
                lines.push(format!("{}: {}", self.graph.name(id), level?));
            }
        }
        Ok(Outcome::with_lines(true, lines))
    }

    /// `{name: read()}` over every sensing device, as one JSON line
    fn get_status(&mut self) -> Result<Outcome> {
        let ids: Vec<_> = self
            .graph
            .iter()
            .filter(|(_, _, device)| device.input().is_some())
            .map(|(id, _, _)| id)
            .collect();

        let mut info = Map::new();
        for id in ids {
            let active = self.graph.read(id)?;
            info.insert(self.graph.name(id).to_string(), Value::Bool(active));
        }
        Ok(Outcome::with_lines(
            true,
            vec![serde_json::to_string(&Value::Object(info))?],
        ))
    }
}

fn int_arg(arg: &Arg, name: &str) -> Result<i64> {
    arg.as_int().ok_or_else(|| {
        FixtureError::InvalidArgument(format!("{} must be an integer, got '{}'", name, arg))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixture_core::config::{FixtureLayout, SequencerConfig};
    use fixture_hardware::sim::{SimExpander, SimPinBank};
    use fixture_hardware::{Cat9555, Device, Led, OutputDevice, PinProvider, Sensor};

    fn controller(bank: &SimPinBank, board: Option<SimExpander>) -> FixtureController {
        let mut graph = DeviceGraph::new();
        graph
            .add(
                "start_led",
                Device::Led(Led::new(bank.output_pin(2).unwrap(), Level::Low)),
            )
            .unwrap();
        graph
            .add(
                "valve",
                Device::Output(OutputDevice::new(bank.output_pin(3).unwrap(), Level::High)),
            )
            .unwrap();
        graph
            .add(
                "presence_sensor",
                Device::Sensor(Sensor::new(bank.input_pin(10, true).unwrap(), true)),
            )
            .unwrap();

        let led_board = board.map(|expander| {
            let chip = Cat9555::new(expander, 0x20).unwrap();
            LedBoard::init(Box::new(chip)).unwrap()
        });
        FixtureController::new(
            graph,
            Sequencer::new(FixtureLayout::default(), &SequencerConfig::default()),
            FixtureParamsStore::in_memory(std::env::temp_dir().join("fixtured-unused.json")),
            led_board,
        )
    }

    #[tokio::test]
    async fn test_get_all_status_lists_pinned_devices() {
        let bank = SimPinBank::new();
        let mut ctl = controller(&bank, None);
        let outcome = ctl.execute(Command::GetAllStatus, &[]).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.lines,
            vec!["start_led: 0", "valve: 0", "presence_sensor: 1"]
        );
    }

    #[tokio::test]
    async fn test_get_status_reports_sensing_devices_as_json() {
        let bank = SimPinBank::new();
        let mut ctl = controller(&bank, None);
        bank.set(10, Level::Low);
        let outcome = ctl.execute(Command::GetStatus, &[]).await.unwrap();
        assert_eq!(outcome.lines, vec![r#"{"presence_sensor":true}"#]);
    }

    #[tokio::test]
    async fn test_set_and_get_pin_status() {
        let bank = SimPinBank::new();
        let mut ctl = controller(&bank, None);
        ctl.execute(
            Command::SetPinStatus,
            &[Arg::Str("valve".into()), Arg::Int(1)],
        )
        .await
        .unwrap();
        assert_eq!(bank.level(3), Some(Level::High));

        let outcome = ctl
            .execute(Command::GetPinStatus, &[Arg::Str("valve".into())])
            .await
            .unwrap();
        assert_eq!(outcome.lines, vec!["Pin_numvalve: 1"]);

        assert!(matches!(
            ctl.execute(Command::GetPinStatus, &[Arg::Str("nope".into())]).await,
            Err(FixtureError::DeviceNotFound(_))
        ));
        // Sensors have no writable pin
        assert!(ctl
            .execute(
                Command::SetPinStatus,
                &[Arg::Str("presence_sensor".into()), Arg::Int(0)]
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_led_commands_need_a_board() {
        let bank = SimPinBank::new();
        let mut ctl = controller(&bank, None);
        assert!(matches!(
            ctl.execute(Command::LedOff, &[]).await,
            Err(FixtureError::LedBoardUnavailable)
        ));

        let expander = SimExpander::new();
        let mut ctl = controller(&bank, Some(expander.clone()));
        ctl.execute(
            Command::LedStateValue,
            &[Arg::Int(0), Arg::Str("r".into())],
        )
        .await
        .unwrap();
        assert_eq!(expander.output_ports(), [0b001, 0]);

        assert!(ctl
            .execute(Command::LedStateValue, &[Arg::Int(9), Arg::Str("r".into())])
            .await
            .is_err());
        assert!(ctl
            .execute(Command::LedStateValue, &[Arg::Int(0), Arg::Str("x".into())])
            .await
            .is_err());

        ctl.execute(Command::LedOff, &[]).await.unwrap();
        assert_eq!(expander.output_ports(), [0, 0]);
    }

    #[tokio::test]
    async fn test_fixture_uninsert_drives_outputs() {
        let bank = SimPinBank::new();
        let mut ctl = controller(&bank, None);
        for (name, pin) in [("ctl_out1", 4), ("ctl_out2", 5)] {
            ctl.graph_mut()
                .add(
                    name,
                    Device::Output(OutputDevice::new(bank.output_pin(pin).unwrap(), Level::High)),
                )
                .unwrap();
        }

        let outcome = ctl.execute(Command::FixtureUninsert, &[Arg::Int(0)]).await.unwrap();
        assert!(outcome.success);
        assert_eq!(bank.level(4), Some(Level::High));
        assert_eq!(bank.level(5), Some(Level::High));

        ctl.execute(Command::FixtureUninsert, &[Arg::Int(1)]).await.unwrap();
        assert_eq!(bank.level(4), Some(Level::Low));
        assert_eq!(bank.level(5), Some(Level::Low));
    }

    #[tokio::test]
    async fn test_loop_count_must_be_integer() {
        let bank = SimPinBank::new();
        let mut ctl = controller(&bank, None);
        assert!(matches!(
            ctl.execute(Command::LoopTest, &[Arg::Str("many".into())]).await,
            Err(FixtureError::InvalidArgument(_))
        ));
        assert!(ctl.execute(Command::LoopTest, &[Arg::Int(-2)]).await.is_err());
        // Zero cycles is a no-op success
        assert!(ctl.execute(Command::LoopTest, &[Arg::Int(0)]).await.unwrap().success);
    }
}
