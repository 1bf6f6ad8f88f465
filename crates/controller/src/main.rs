mod clock;
mod command;
mod config;
mod controller;
mod edge;
mod float_switch;
mod hw;
mod mqtt;
mod nutrient;
mod pump;
mod state;
mod store;
mod temperature;
mod web;

use anyhow::{bail, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clock::{offset_from_minutes, SystemClock};
use command::Inbound;
use controller::{Controller, Notice, Settings};
use hw::Hardware;
use state::{SharedState, SystemState};
use store::Store;

/// Control-loop period. Bounds command latency and override precision.
const TICK_INTERVAL_MS: u64 = 250;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    let offset = offset_from_minutes(cfg.clock.utc_offset_minutes)?;

    // ── Persisted state ─────────────────────────────────────────────
    let store = Store::connect(&cfg.store.db_url).await?;
    store.migrate().await?;

    // ── Hardware ────────────────────────────────────────────────────
    #[cfg(feature = "gpio")]
    let board = hw::GpioHardware::new(
        cfg.hardware.pump_gpio_pin as u8,
        cfg.hardware.float_switch_gpio_pin as u8,
        &cfg.hardware.w1_device,
        cfg.hardware.relay_active_low,
    )?;
    #[cfg(not(feature = "gpio"))]
    let board = hw::MockHardware::new();

    let settings = Settings {
        authorized_chat_id: cfg.chat.authorized_chat_id.clone(),
        utc_offset: offset,
    };
    let (controller, boot) = Controller::boot(board, store, settings).await?;
    info!(start_counter = boot.start_counter, "controller booted");

    // ── Shared state (read-only snapshot for the web API) ───────────
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new()));
    {
        let mut st = shared.write().await;
        st.record_system(format!("controller started (boot #{})", boot.start_counter));
    }

    // ── Web server ──────────────────────────────────────────────────
    let web_state = Arc::clone(&shared);
    let web_port = cfg.web.port;
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state, web_port).await {
            error!("web: {e:#}");
        }
    });

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new(&cfg.mqtt.client_id, &cfg.mqtt.host, cfg.mqtt.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, eventloop) = AsyncClient::new(mqttoptions, 20);
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(forward_mqtt(eventloop, tx));

    // Queued until the broker connection comes up. The subscription is
    // issued on every ConnAck since clean sessions drop it on reconnect.
    publish(&client, controller.authorized_chat_id(), &boot.message);

    run(controller, SystemClock::new(offset), client, rx, shared).await
}

/// What the MQTT task forwards to the control loop.
enum Transport {
    Message(Inbound),
    Invalid(String),
    Connected,
    Disconnected,
    Error(String),
}

/// Drive the MQTT event loop on its own task; reconnects happen here.
async fn forward_mqtt(mut eventloop: EventLoop, tx: mpsc::Sender<Transport>) {
    loop {
        let item = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                match mqtt::decode_inbound(&p.topic, &p.payload) {
                    Ok(msg) => Transport::Message(msg),
                    Err(e) => Transport::Invalid(e),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => Transport::Connected,
            Ok(Event::Incoming(Packet::Disconnect)) => Transport::Disconnected,
            Ok(_) => continue,
            Err(e) => Transport::Error(e.to_string()),
        };

        let backoff = matches!(item, Transport::Error(_));
        if tx.send(item).await.is_err() {
            return; // control loop is gone
        }
        if backoff {
            sleep(Duration::from_secs(2)).await;
        }
    }
}

/// The control loop. Ticks and inbound messages are handled one at a time
/// on this task, never concurrently.
async fn run<H: Hardware>(
    mut controller: Controller<H>,
    clock: SystemClock,
    client: AsyncClient,
    mut inbound: mpsc::Receiver<Transport>,
    shared: SharedState,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tick_ms = TICK_INTERVAL_MS,
        utc_offset = %clock.offset(),
        "control loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = clock.now();
                let notices = controller.tick(&now).await;

                for notice in notices {
                    match notice {
                        Notice::Alert(alert) => {
                            warn!(?alert, "raising alert");
                            publish(&client, controller.authorized_chat_id(), alert.message());
                            shared.write().await.record_alert(alert.message().to_string());
                        }
                        Notice::ResyncClock => {
                            // Sync itself is the host's job (chrony / systemd-timesyncd).
                            info!("daily clock resync requested");
                            shared.write().await.record_system("clock resync requested".to_string());
                        }
                    }
                }

                shared.write().await.set_controller(controller.status(&now));
            }
            item = inbound.recv() => match item {
                Some(Transport::Message(msg)) => {
                    let now = clock.now();
                    let reply = controller.handle_message(&msg, &now).await;
                    publish(&client, &reply.chat_id, &reply.text);

                    let mut st = shared.write().await;
                    st.record_command(&msg.chat_id, &msg.text);
                    st.set_controller(controller.status(&now));
                }
                Some(Transport::Invalid(e)) => {
                    warn!("{e}");
                    shared.write().await.record_error(e);
                }
                Some(Transport::Connected) => {
                    info!("mqtt connected");
                    subscribe_inbound(&client);
                    let mut st = shared.write().await;
                    st.mqtt_connected = true;
                    st.record_system("mqtt connected".to_string());
                }
                Some(Transport::Disconnected) => {
                    warn!("mqtt disconnected");
                    let mut st = shared.write().await;
                    st.mqtt_connected = false;
                    st.record_system("mqtt disconnected".to_string());
                }
                Some(Transport::Error(e)) => {
                    // The schedule keeps running without a broker.
                    error!("mqtt error: {e}. reconnecting...");
                    let mut st = shared.write().await;
                    st.mqtt_connected = false;
                    st.record_error(format!("mqtt error: {e}"));
                }
                None => bail!("mqtt task exited"),
            },
        }
    }
}

/// Queue a chat message without waiting. Returns false when it was dropped.
///
/// Never blocks: while the broker is away the request channel fills up, and
/// the control loop must keep ticking regardless.
fn publish(client: &AsyncClient, chat_id: &str, text: &str) -> bool {
    let payload = match mqtt::encode_outbound(text) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to encode reply: {e}");
            return false;
        }
    };
    match client.try_publish(mqtt::outbound_topic(chat_id), QoS::AtLeastOnce, false, payload) {
        Ok(()) => true,
        Err(e) => {
            warn!(chat_id, "dropping outbound message: {e}");
            false
        }
    }
}

fn subscribe_inbound(client: &AsyncClient) -> bool {
    match client.try_subscribe(mqtt::INBOUND_FILTER, QoS::AtLeastOnce) {
        Ok(()) => {
            info!("subscribed to {}", mqtt::INBOUND_FILTER);
            true
        }
        Err(e) => {
            error!("failed to queue chat subscription: {e}");
            false
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client(cap: usize) -> (AsyncClient, EventLoop) {
        let opts = MqttOptions::new("test-controller", "localhost", 1883);
        AsyncClient::new(opts, cap)
    }

    #[tokio::test]
    async fn publish_drops_instead_of_blocking_when_queue_is_full() {
        // Event loop is held but never polled, like a broker outage.
        let (client, _eventloop) = offline_client(2);
        assert!(publish(&client, "123", "one"));
        assert!(publish(&client, "123", "two"));
        assert!(!publish(&client, "123", "three"));
    }

    #[tokio::test]
    async fn subscribe_is_queued_without_blocking() {
        let (client, _eventloop) = offline_client(1);
        assert!(subscribe_inbound(&client));
        assert!(!subscribe_inbound(&client));
    }
}
