//! Hardware capabilities consumed by the controller: pump output, float
//! switch input and the reservoir temperature probe. The `gpio` feature
//! gates the real rppal driver; without it, a mock board logs state changes.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, InputPin, OutputPin};

/// Reading the DS18B20 reports when it has dropped off the bus.
pub const DISCONNECTED_F: f32 = -196.6;

pub trait Hardware {
    /// Drive the pump relay.
    fn set_pump(&mut self, on: bool);

    /// True when the reservoir is low (switch pulled high).
    fn float_switch_tripped(&mut self) -> Result<bool>;

    /// Trigger a conversion and return the result in °F.
    fn read_temperature_f(&mut self) -> Result<f32>;
}

/// Power-on reset value of the DS18B20 scratchpad (85 °C). The driver
/// reports it with a valid crc when the probe browns out mid-conversion.
const POWER_ON_RESET_MILLI_C: i32 = 85_000;

/// Sysfs directory the w1-gpio kernel driver exposes probes under.
const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

pub fn w1_slave_path(device: &str) -> PathBuf {
    PathBuf::from(W1_DEVICES_DIR).join(device).join("w1_slave")
}

/// Parse a `w1_slave` dump into °F.
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(contents: &str) -> Result<f32> {
    let mut lines = contents.lines();
    let crc_line = lines.next().context("w1_slave is empty")?;
    if !crc_line.trim_end().ends_with("YES") {
        bail!("w1_slave crc check failed: {crc_line}");
    }
    let data_line = lines.next().context("w1_slave missing data line")?;
    let (_, milli_c) = data_line
        .rsplit_once("t=")
        .with_context(|| format!("w1_slave missing t= field: {data_line}"))?;
    let milli_c: i32 = milli_c
        .trim()
        .parse()
        .with_context(|| format!("w1_slave bad temperature: {milli_c}"))?;
    if milli_c == POWER_ON_RESET_MILLI_C {
        bail!("w1_slave returned the power-on reset value, no conversion ran");
    }
    Ok(celsius_to_fahrenheit(milli_c as f32 / 1000.0))
}

pub fn celsius_to_fahrenheit(c: f32) -> f32 {
    c * 9.0 / 5.0 + 32.0
}

// ---------------------------------------------------------------------------
// Real board (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub struct GpioHardware {
    pump: OutputPin,
    float_switch: InputPin,
    w1_slave: PathBuf,
    active_low: bool, // many relay boards are active-low
}

#[cfg(feature = "gpio")]
impl GpioHardware {
    pub fn new(
        pump_pin: u8,
        float_switch_pin: u8,
        w1_device: &str,
        active_low: bool,
    ) -> Result<Self> {
        let gpio = Gpio::new().context("failed to open gpio")?;
        let pump = gpio
            .get(pump_pin)
            .with_context(|| format!("pump gpio {pump_pin} unavailable"))?
            .into_output();
        let float_switch = gpio
            .get(float_switch_pin)
            .with_context(|| format!("float switch gpio {float_switch_pin} unavailable"))?
            .into_input_pullup();

        let mut hw = Self {
            pump,
            float_switch,
            w1_slave: w1_slave_path(w1_device),
            active_low,
        };
        // Fail-safe: ensure "OFF" at startup
        hw.set_pump(false);
        Ok(hw)
    }
}

#[cfg(feature = "gpio")]
impl Hardware for GpioHardware {
    fn set_pump(&mut self, on: bool) {
        // active-low relay: LOW = ON, HIGH = OFF
        if on != self.active_low {
            self.pump.set_high();
        } else {
            self.pump.set_low();
        }
        tracing::info!(on, "pump set");
    }

    fn float_switch_tripped(&mut self) -> Result<bool> {
        Ok(self.float_switch.is_high())
    }

    fn read_temperature_f(&mut self) -> Result<f32> {
        // Reading w1_slave triggers the conversion.
        let contents = std::fs::read_to_string(&self.w1_slave)
            .with_context(|| format!("failed to read {}", self.w1_slave.display()))?;
        parse_w1_slave(&contents)
    }
}

// ---------------------------------------------------------------------------
// Mock board (development and tests — no hardware)
// ---------------------------------------------------------------------------

#[cfg(any(test, not(feature = "gpio")))]
#[derive(Debug, Default)]
pub struct MockHardware {
    pub pump_on: bool,
    /// Every value written to the pump, oldest first.
    pub pump_writes: Vec<bool>,
    pub float_tripped: bool,
    /// `None` simulates a probe that fails to respond.
    pub temperature_f: Option<f32>,
}

#[cfg(any(test, not(feature = "gpio")))]
impl MockHardware {
    pub fn new() -> Self {
        tracing::info!("[mock-gpio] board initialised (no hardware)");
        Self {
            temperature_f: Some(68.0),
            ..Self::default()
        }
    }
}

#[cfg(any(test, not(feature = "gpio")))]
impl Hardware for MockHardware {
    fn set_pump(&mut self, on: bool) {
        self.pump_on = on;
        self.pump_writes.push(on);
        tracing::info!(on, "[mock-gpio] pump set");
    }

    fn float_switch_tripped(&mut self) -> Result<bool> {
        Ok(self.float_tripped)
    }

    fn read_temperature_f(&mut self) -> Result<f32> {
        self.temperature_f.context("[mock-gpio] temperature probe not responding")
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=25000\n";

    #[test]
    fn parse_w1_slave_good_reading() {
        let f = parse_w1_slave(GOOD).unwrap();
        assert!((f - 77.0).abs() < 0.01, "got {f}");
    }

    #[test]
    fn parse_w1_slave_negative_reading() {
        let s = "ff ff : crc=00 YES\nff ff t=-10000\n";
        let f = parse_w1_slave(s).unwrap();
        assert!((f - 14.0).abs() < 0.01, "got {f}");
    }

    #[test]
    fn parse_w1_slave_bad_crc() {
        let s = "72 01 : crc=57 NO\n72 01 t=25000\n";
        let err = parse_w1_slave(s).unwrap_err();
        assert!(format!("{err:#}").contains("crc"));
    }

    #[test]
    fn parse_w1_slave_rejects_power_on_reset() {
        let s = "50 05 4b 46 7f ff 0c 10 1c : crc=1c YES\n\
                 50 05 4b 46 7f ff 0c 10 1c t=85000\n";
        let err = parse_w1_slave(s).unwrap_err();
        assert!(format!("{err:#}").contains("power-on reset"));

        // A genuine reading close to it still parses.
        let near = "50 05 : crc=1c YES\n50 05 t=84937\n";
        assert!(parse_w1_slave(near).is_ok());
    }

    #[test]
    fn parse_w1_slave_missing_data() {
        assert!(parse_w1_slave("").is_err());
        assert!(parse_w1_slave("00 : crc=00 YES\n").is_err());
        assert!(parse_w1_slave("00 : crc=00 YES\n00 00\n").is_err());
    }

    #[test]
    fn w1_path_points_at_device() {
        let p = w1_slave_path("28-0316a2795aff");
        assert_eq!(
            p.to_str().unwrap(),
            "/sys/bus/w1/devices/28-0316a2795aff/w1_slave"
        );
    }

    #[test]
    fn mock_records_pump_writes() {
        let mut hw = MockHardware::new();
        hw.set_pump(true);
        hw.set_pump(false);
        assert!(!hw.pump_on);
        assert_eq!(hw.pump_writes, vec![true, false]);
    }

    #[test]
    fn mock_missing_probe_errors() {
        let mut hw = MockHardware::new();
        hw.temperature_f = None;
        assert!(hw.read_temperature_f().is_err());
    }
}
