use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::info;
use uuid::Uuid;

use cpu_loadgen::metrics::{CpuMetrics, CpuSampler};
use cpu_loadgen::mqtt::{MqttPublisher, MqttSettings};
use cpu_loadgen::server::{self, AppState};
use cpu_loadgen::{ComputeKernel, LoadController};

/// Generate controllable CPU load with a REST API.
#[derive(Parser, Debug)]
#[command(name = "cpu-loadgen", version, about)]
struct Args {
    /// Host to bind the server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the server to
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Computation to run during the busy phase of each duty cycle
    /// (busy-wait, pi, primes, matrix, fibonacci)
    #[arg(long = "computation-type", default_value = "busy-wait")]
    computation_type: String,

    /// Disable CPU temperature monitoring (useful if sensors are unavailable)
    #[arg(long = "disable-temperature")]
    disable_temperature: bool,

    /// MQTT broker hostname; telemetry publishing is disabled when unset
    #[arg(long = "mqtt-broker-host", env = "MQTT_BROKER_HOST")]
    mqtt_broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long = "mqtt-broker-port", env = "MQTT_BROKER_PORT", default_value_t = 1883)]
    mqtt_broker_port: u16,

    /// MQTT username
    #[arg(long = "mqtt-username", env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long = "mqtt-password", env = "MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// MQTT topic prefix
    #[arg(long = "mqtt-topic-prefix", env = "MQTT_TOPIC_PREFIX", default_value = "cpu-loader")]
    mqtt_topic_prefix: String,

    /// MQTT client id; a random one is generated when unset
    #[arg(long = "mqtt-client-id", env = "MQTT_CLIENT_ID")]
    mqtt_client_id: Option<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let kernel = match args.computation_type.parse::<ComputeKernel>() {
        Ok(kernel) => kernel,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };

    let controller = Arc::new(LoadController::with_default_size(kernel));

    let mqtt = args.mqtt_broker_host.clone().map(|broker_host| {
        MqttPublisher::connect(MqttSettings {
            broker_host,
            broker_port: args.mqtt_broker_port,
            username: args.mqtt_username.clone(),
            password: args.mqtt_password.clone(),
            topic_prefix: args.mqtt_topic_prefix.clone(),
            client_id: args
                .mqtt_client_id
                .clone()
                .unwrap_or_else(|| format!("cpu-loadgen-{}", Uuid::new_v4())),
        })
    });

    // Background monitor: sample CPU usage once per second, keep the latest
    // reading for the REST endpoint, push it to MQTT when configured.
    let metrics = Arc::new(Mutex::new(CpuMetrics::default()));
    {
        let metrics = metrics.clone();
        let mqtt = mqtt.clone();
        let read_temperature = !args.disable_temperature;
        tokio::spawn(async move {
            let mut sampler = CpuSampler::new(read_temperature);
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            loop {
                tick.tick().await;
                let sample = sampler.sample();
                if let Some(mqtt) = &mqtt {
                    mqtt.publish_cpu_metrics(&sample).await;
                }
                *metrics.lock().unwrap() = sample;
            }
        });
    }

    let state = web::Data::new(AppState {
        controller: controller.clone(),
        mqtt,
        metrics,
    });

    info!("serving control API on {}:{}", args.host, args.port);
    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .app_data(state.clone())
            .configure(server::routes)
    })
    .bind((args.host.as_str(), args.port))?
    .run()
    .await?;

    controller.shutdown();
    Ok(())
}
