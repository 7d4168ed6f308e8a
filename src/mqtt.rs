//! MQTT telemetry bridge.
//!
//! Publishes load settings after every successful mutation and CPU metrics
//! on each monitor tick. The bridge is optional and strictly best-effort:
//! connection failures are logged and retried by the event loop, and the
//! engine never blocks on broker availability.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{error, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

use crate::metrics::CpuMetrics;

pub struct MqttSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub client_id: String,
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttPublisher {
    /// Connects to the broker and drives the connection from a background
    /// task. Must be called from within a tokio runtime.
    pub fn connect(settings: MqttSettings) -> MqttPublisher {
        info!(
            "connecting to MQTT broker at {}:{}",
            settings.broker_host, settings.broker_port
        );

        let mut options = MqttOptions::new(
            settings.client_id,
            settings.broker_host,
            settings.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(username), Some(password)) = (settings.username, settings.password) {
            options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, 10);

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("MQTT connection error: {}", err);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        MqttPublisher {
            client,
            topic_prefix: settings.topic_prefix,
        }
    }

    /// Publishes the configured thread count and per-thread loads. Retained
    /// so late subscribers see the current settings.
    pub async fn publish_load_settings(&self, num_threads: usize, loads: &[f64]) {
        let average = if loads.is_empty() {
            0.0
        } else {
            loads.iter().sum::<f64>() / loads.len() as f64
        };
        let loads_by_thread: BTreeMap<usize, f64> = loads.iter().copied().enumerate().collect();
        let payload = serde_json::json!({
            "num_threads": num_threads,
            "loads": loads_by_thread,
            "average_load": (average * 100.0).round() / 100.0,
        });

        let topic = format!("{}/load_settings", self.topic_prefix);
        if let Err(err) = self
            .client
            .publish(topic, QoS::AtLeastOnce, true, payload.to_string())
            .await
        {
            error!("failed to publish load settings: {}", err);
        }
    }

    /// Publishes a CPU metrics sample. Not retained; stale samples are
    /// worthless. The temperature key is omitted when no sensor is available.
    pub async fn publish_cpu_metrics(&self, metrics: &CpuMetrics) {
        let mut payload = serde_json::json!({
            "total_cpu_percent": metrics.total_cpu_percent,
            "per_cpu_percent": metrics.per_cpu_percent,
        });
        if let Some(temperature) = metrics.cpu_temperature {
            payload["cpu_temperature"] = serde_json::json!(temperature);
        }

        let topic = format!("{}/cpu_metrics", self.topic_prefix);
        if let Err(err) = self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.to_string())
            .await
        {
            error!("failed to publish CPU metrics: {}", err);
        }
    }
}
