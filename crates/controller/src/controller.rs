//! The controller context: every piece of mutable state the scheduled
//! handlers and the command dispatcher share, plus the handlers themselves.
//!
//! The runtime drives it through two entry points only:
//!
//! - [`Controller::tick`] on every loop iteration, returning notices to send;
//! - [`Controller::handle_message`] for each inbound chat message.
//!
//! Both run to completion before the other is called, so a command can never
//! observe a half-processed edge.

use anyhow::{Context, Result};
use serde::Serialize;
use time::UtcOffset;
use tracing::{error, info, warn};

use crate::clock::{format_date, Now};
use crate::command::{
    help_text, restart_notice, Command, Inbound, Reply, MSG_GREETING, MSG_INVALID,
    MSG_LOW_WATER, MSG_NUTRIENT_DUE, MSG_UNAUTHORIZED,
};
use crate::edge::{ClockEdge, Edge};
use crate::float_switch::{is_check_hour, water_level_label};
use crate::hw::Hardware;
use crate::nutrient::{NutrientReminder, NUTRIENT_REMINDER_HOUR};
use crate::pump::{OverrideStart, PumpState};
use crate::store::{
    Store, KEY_MAX_RES_TEMP, KEY_NUTRIENT_REMINDER_EPOCH, KEY_START_COUNTER,
};
use crate::temperature::{is_sample_minute, is_valid_reading, Sample, TemperatureMonitor};

/// Hour at which the clock resync is requested.
pub const NTP_SYNC_HOUR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    LowWater,
    NutrientDue,
}

impl Alert {
    pub fn message(&self) -> &'static str {
        match self {
            Self::LowWater => MSG_LOW_WATER,
            Self::NutrientDue => MSG_NUTRIENT_DUE,
        }
    }
}

/// Something a tick wants the outside world to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Alert(Alert),
    ResyncClock,
}

/// Static settings the controller is built with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub authorized_chat_id: String,
    pub utc_offset: UtcOffset,
}

/// Outcome of the boot sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boot {
    /// Counter value after this boot was recorded.
    pub start_counter: u32,
    /// Greeting on first boot, restart notice afterwards.
    pub message: String,
}

/// Read-only view for the status API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStatus {
    pub pump_on: bool,
    pub pump_commanded: bool,
    pub override_remaining_ms: Option<u64>,
    pub last_temp_f: Option<f32>,
    pub max_temp_f: f32,
    pub float_switch_tripped: Option<bool>,
    pub nutrient_reminder_epoch: u64,
    pub start_counter: u32,
}

pub struct Controller<H: Hardware> {
    hw: H,
    store: Store,
    settings: Settings,

    edge: ClockEdge,
    pump: PumpState,
    temperature: TemperatureMonitor,
    reminder: NutrientReminder,
    start_counter: u32,

    /// Last value written to the pump; `None` until the first write.
    pump_output: Option<bool>,
    float_tripped: Option<bool>,
}

impl<H: Hardware> Controller<H> {
    /// Load persisted state, record this boot, and pick the startup message.
    pub async fn boot(hw: H, store: Store, settings: Settings) -> Result<(Self, Boot)> {
        let persisted = store
            .load_state()
            .await
            .context("failed to load persisted state")?;

        info!(
            max_res_temp = persisted.max_res_temp,
            start_counter = persisted.start_counter,
            nutrient_reminder_epoch = persisted.nutrient_reminder_epoch,
            "persisted state loaded"
        );

        let message = if persisted.start_counter != 0 {
            restart_notice(persisted.start_counter)
        } else {
            MSG_GREETING.to_string()
        };

        let start_counter = persisted.start_counter.saturating_add(1);
        if let Err(e) = store.put_u32(KEY_START_COUNTER, start_counter).await {
            error!("store: failed to persist start counter: {e:#}");
        }

        let controller = Self {
            hw,
            store,
            settings,
            edge: ClockEdge::new(),
            pump: PumpState::default(),
            temperature: TemperatureMonitor::new(persisted.max_res_temp),
            reminder: NutrientReminder::new(persisted.nutrient_reminder_epoch),
            start_counter,
            pump_output: None,
            float_tripped: None,
        };

        Ok((
            controller,
            Boot {
                start_counter,
                message,
            },
        ))
    }

    // -----------------------------------------------------------------------
    // Scheduled side
    // -----------------------------------------------------------------------

    /// One control-loop iteration.
    pub async fn tick(&mut self, now: &Now) -> Vec<Notice> {
        let mut notices = Vec::new();

        if self.pump.poll_override(now.uptime_ms) {
            info!("manual override expired");
        }

        if let Some(edge) = self.edge.pending(now) {
            self.on_minute(edge).await;
            if edge.hour_changed {
                self.on_hour(edge, now, &mut notices);
            }
            self.edge.acknowledge(edge);
        }

        self.sync_pump_output();
        notices
    }

    async fn on_minute(&mut self, edge: Edge) {
        self.pump.apply_schedule(edge.hour, edge.minute);
        if self.pump.commanded {
            info!(hour = edge.hour, minute = edge.minute, "scheduled pump run");
        }

        if is_sample_minute(edge.minute) {
            self.sample_temperature().await;
        }
    }

    fn on_hour(&mut self, edge: Edge, now: &Now, notices: &mut Vec<Notice>) {
        info!(hour = edge.hour, "hour changed");

        if edge.hour == NTP_SYNC_HOUR {
            notices.push(Notice::ResyncClock);
        }

        if edge.hour == NUTRIENT_REMINDER_HOUR && self.reminder.is_due(now.epoch_secs) {
            info!(
                next_epoch = self.reminder.next_epoch(),
                now = now.epoch_secs,
                "nutrient reminder due"
            );
            notices.push(Notice::Alert(Alert::NutrientDue));
        }

        if is_check_hour(edge.hour) && self.check_float_switch() {
            notices.push(Notice::Alert(Alert::LowWater));
        }
    }

    async fn sample_temperature(&mut self) {
        let reading = match self.hw.read_temperature_f() {
            Ok(t) => t,
            Err(e) => {
                warn!("temperature read failed: {e:#}");
                return;
            }
        };

        match self.temperature.observe(reading) {
            Sample::NewMax(t) => {
                info!(temp_f = t, "new maximum reservoir temperature");
                if let Err(e) = self.store.put_f32(KEY_MAX_RES_TEMP, t).await {
                    error!("store: failed to persist max temperature: {e:#}");
                }
            }
            Sample::Recorded(t) => info!(temp_f = t, "reservoir temperature"),
            Sample::Invalid(t) => warn!(temp_f = t, "ignoring invalid temperature reading"),
        }
    }

    /// Read the switch and remember it. True means the reservoir is low.
    fn check_float_switch(&mut self) -> bool {
        match self.hw.float_switch_tripped() {
            Ok(tripped) => {
                self.float_tripped = Some(tripped);
                if tripped {
                    warn!("float switch tripped: water level low");
                } else {
                    info!("float switch ok");
                }
                tripped
            }
            Err(e) => {
                error!("float switch read failed: {e:#}");
                false
            }
        }
    }

    fn sync_pump_output(&mut self) {
        let desired = self.pump.output();
        if self.pump_output != Some(desired) {
            self.hw.set_pump(desired);
            self.pump_output = Some(desired);
        }
    }

    // -----------------------------------------------------------------------
    // Command side
    // -----------------------------------------------------------------------

    /// Authorize, decode and execute one inbound message.
    pub async fn handle_message(&mut self, msg: &Inbound, now: &Now) -> Reply {
        if msg.chat_id != self.settings.authorized_chat_id {
            warn!(chat_id = %msg.chat_id, "rejecting message from unauthorized chat");
            return Reply {
                chat_id: msg.chat_id.clone(),
                text: MSG_UNAUTHORIZED.to_string(),
            };
        }

        let command = Command::parse(&msg.text);
        info!(command = command.name(), from = %msg.from_name, "command received");

        let text = match command {
            Command::Help => help_text(&msg.from_name),
            Command::RunPump => self.run_pump(now),
            Command::ReadTemperature => self.read_temperature(),
            Command::ResetNutrientReminder => self.reset_nutrient_reminder(now).await,
            Command::Status => self.status_text(now),
            Command::Unrecognized(text) => {
                info!(text = %text, "unrecognized command");
                MSG_INVALID.to_string()
            }
        };

        Reply {
            chat_id: msg.chat_id.clone(),
            text,
        }
    }

    fn run_pump(&mut self, now: &Now) -> String {
        match self.pump.start_override(now.uptime_ms) {
            OverrideStart::Started => {
                info!("manual override started");
                self.sync_pump_output();
                "Running water pump for 1 minute".to_string()
            }
            OverrideStart::AlreadyRunning { remaining_ms } => format!(
                "Water pump is already running ({}s left)",
                remaining_ms.div_ceil(1000)
            ),
        }
    }

    fn read_temperature(&mut self) -> String {
        let temp_line = match self.hw.read_temperature_f() {
            Ok(t) if is_valid_reading(t) => format!("The current water temp is {t:.2}ºF"),
            Ok(t) => {
                warn!(temp_f = t, "temperature probe returned an invalid reading");
                "Temperature sensor unavailable".to_string()
            }
            Err(e) => {
                warn!("temperature read failed: {e:#}");
                "Temperature sensor unavailable".to_string()
            }
        };

        let level_line = match self.hw.float_switch_tripped() {
            Ok(tripped) => {
                self.float_tripped = Some(tripped);
                format!("Water level is {}", water_level_label(tripped))
            }
            Err(e) => {
                error!("float switch read failed: {e:#}");
                "Water level is unknown".to_string()
            }
        };

        format!("{temp_line}\n{level_line}")
    }

    async fn reset_nutrient_reminder(&mut self, now: &Now) -> String {
        let next = self.reminder.reset(now.epoch_secs);
        if let Err(e) = self.store.put_u64(KEY_NUTRIENT_REMINDER_EPOCH, next).await {
            error!("store: failed to persist nutrient reminder: {e:#}");
        }
        info!(next_epoch = next, "nutrient reminder reset");

        format!(
            "Updated! You will be reminded on {} to refill your nutrients!",
            self.date(next)
        )
    }

    fn status_text(&self, now: &Now) -> String {
        let pump = match self.pump.override_remaining_ms(now.uptime_ms) {
            Some(ms) => format!("ON (manual, {}s left)", ms.div_ceil(1000)),
            None if self.pump.output() => "ON (scheduled)".to_string(),
            None => "OFF".to_string(),
        };
        let last = match self.temperature.last_f() {
            Some(t) => format!("{t:.2}ºF"),
            None => "n/a".to_string(),
        };
        let reminder = if self.reminder.is_enabled() {
            self.date(self.reminder.next_epoch())
        } else {
            "not set".to_string()
        };

        format!(
            "Pump: {pump}\nLast water temp: {last}\nMax water temp: {:.2}ºF\nNutrient reminder: {reminder}\nRestarts: {}",
            self.temperature.max_f(),
            self.start_counter
        )
    }

    fn date(&self, epoch: u64) -> String {
        format_date(epoch, self.settings.utc_offset).unwrap_or_else(|e| {
            warn!("failed to format date: {e:#}");
            epoch.to_string()
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn authorized_chat_id(&self) -> &str {
        &self.settings.authorized_chat_id
    }

    pub fn status(&self, now: &Now) -> ControllerStatus {
        ControllerStatus {
            pump_on: self.pump.output(),
            pump_commanded: self.pump.commanded,
            override_remaining_ms: self.pump.override_remaining_ms(now.uptime_ms),
            last_temp_f: self.temperature.last_f(),
            max_temp_f: self.temperature.max_f(),
            float_switch_tripped: self.float_tripped,
            nutrient_reminder_epoch: self.reminder.next_epoch(),
            start_counter: self.start_counter,
        }
    }

    #[cfg(test)]
    pub fn hardware(&self) -> &H {
        &self.hw
    }

    #[cfg(test)]
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

// ===========================================================================
// Tests
// ===========================================================================
