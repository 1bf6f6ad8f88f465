//! TOML config file loading, environment overrides and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chat: ChatConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// The only chat allowed to issue commands; alerts are sent here too.
    pub authorized_chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            client_id: "dutch-bucket".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite:dutch-bucket.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub pump_gpio_pin: i64,
    pub float_switch_gpio_pin: i64,
    /// Many common relay boards are active-low. If yours is active-high, set false.
    pub relay_active_low: bool,
    /// 1-wire device id of the reservoir probe, e.g. "28-0316a2795aff".
    pub w1_device: String,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            pump_gpio_pin: 17,
            float_switch_gpio_pin: 27,
            relay_active_low: true,
            w1_device: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Local time offset from UTC, in minutes (e.g. -300 for EST).
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 4 is claimed by the w1-gpio overlay for the temperature probe.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// Real-world offsets span UTC-12:00 to UTC+14:00.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.chat.authorized_chat_id.trim().is_empty() {
            errors.push("chat: authorized_chat_id is empty".to_string());
        } else if self.chat.authorized_chat_id.contains(['/', '+', '#']) {
            errors.push(format!(
                "chat: authorized_chat_id '{}' contains an MQTT topic character",
                self.chat.authorized_chat_id
            ));
        }

        if self.mqtt.host.trim().is_empty() {
            errors.push("mqtt: host is empty".to_string());
        }
        if self.mqtt.port == 0 {
            errors.push("mqtt: port must be non-zero".to_string());
        }
        if self.mqtt.client_id.trim().is_empty() {
            errors.push("mqtt: client_id is empty".to_string());
        }

        if self.store.db_url.trim().is_empty() {
            errors.push("store: db_url is empty".to_string());
        }

        self.validate_hardware(&mut errors);

        if self.clock.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            errors.push(format!(
                "clock: utc_offset_minutes {} out of range [-{MAX_UTC_OFFSET_MINUTES}, {MAX_UTC_OFFSET_MINUTES}]",
                self.clock.utc_offset_minutes
            ));
        }

        if self.web.port == 0 {
            errors.push("web: port must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_hardware(&self, errors: &mut Vec<String>) {
        let hw = &self.hardware;

        for (name, pin) in [
            ("pump_gpio_pin", hw.pump_gpio_pin),
            ("float_switch_gpio_pin", hw.float_switch_gpio_pin),
        ] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "hardware: {name} {pin} is not a usable BCM GPIO pin (allowed: 2-27 except 4)"
                ));
            }
        }

        if hw.pump_gpio_pin == hw.float_switch_gpio_pin {
            errors.push(format!(
                "hardware: pump and float switch share gpio {}",
                hw.pump_gpio_pin
            ));
        }

        if cfg!(feature = "gpio") && hw.w1_device.trim().is_empty() {
            errors.push("hardware: w1_device is required with real gpio".to_string());
        }
    }

    /// Apply `MQTT_HOST`, `MQTT_PORT`, `DB_URL` and `WEB_PORT` on top of the
    /// file values. Unparseable ports are ignored.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = var("MQTT_PORT").and_then(|s| s.parse().ok()) {
            self.mqtt.port = port;
        }
        if let Some(url) = var("DB_URL") {
            self.store.db_url = url;
        }
        if let Some(port) = var("WEB_PORT").and_then(|s| s.parse().ok()) {
            self.web.port = port;
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, apply env overrides, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let mut config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config.apply_env(|k| std::env::var(k).ok());
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    tracing::info!(
        mqtt_host = %config.mqtt.host,
        mqtt_port = config.mqtt.port,
        db_url = %config.store.db_url,
        utc_offset_minutes = config.clock.utc_offset_minutes,
        "config loaded"
    );

    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
