use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{debug, info};
use sensorsim_core::mqtt::MqttLink;
use sensorsim_core::{BrokerConfig, BusLink, ControlCommand, CONTROL_TOPIC};

// ===== Configuration =====
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: &str = "1883";

fn app<'a, 'b>() -> App<'a, 'b> {
    let sensor_id = || {
        Arg::with_name("id")
            .help("Sensor id")
            .required(true)
            .index(1)
    };

    App::new("sensorsim-control")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sends one control command to the sensor fleet on sensors/control")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("MQTT broker host")
                .takes_value(true)
                .env("MQTT_BROKER")
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("MQTT broker port")
                .takes_value(true)
                .env("MQTT_PORT")
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .subcommand(SubCommand::with_name("start_all").about("Start every sensor"))
        .subcommand(SubCommand::with_name("stop_all").about("Stop every sensor"))
        .subcommand(SubCommand::with_name("start").about("Start one sensor").arg(sensor_id()))
        .subcommand(SubCommand::with_name("stop").about("Stop one sensor").arg(sensor_id()))
        .subcommand(
            SubCommand::with_name("set")
                .setting(AppSettings::AllowNegativeNumbers)
                .about("Publish one value from a sensor")
                .arg(sensor_id())
                .arg(Arg::with_name("value").required(true).allow_hyphen_values(true).index(2)),
        )
        .subcommand(
            SubCommand::with_name("range")
                .setting(AppSettings::AllowNegativeNumbers)
                .about("Set the output range of a sensor")
                .arg(sensor_id())
                .arg(Arg::with_name("min").required(true).allow_hyphen_values(true).index(2))
                .arg(Arg::with_name("max").required(true).allow_hyphen_values(true).index(3)),
        )
        .subcommand(
            SubCommand::with_name("rate")
                .setting(AppSettings::AllowNegativeNumbers)
                .about("Set the publish rate of a sensor, in messages per minute")
                .arg(sensor_id())
                .arg(Arg::with_name("rate").required(true).allow_hyphen_values(true).index(2)),
        )
}

fn id_arg(m: &ArgMatches) -> Result<u32> {
    let raw = m.value_of("id").unwrap_or_default();
    raw.parse().map_err(|_| anyhow!("invalid sensor id: {raw}"))
}

fn number_arg(m: &ArgMatches, name: &str) -> Result<f64> {
    let raw = m.value_of(name).unwrap_or_default();
    raw.parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| anyhow!("{name} must be a number, got {raw}"))
}

/// Traduit la sous-commande parsée en message de contrôle.
fn parse_command(matches: &ArgMatches) -> Result<ControlCommand> {
    let cmd = match matches.subcommand() {
        ("start_all", _) => ControlCommand::StartAll,
        ("stop_all", _) => ControlCommand::StopAll,
        ("start", Some(m)) => ControlCommand::Start(id_arg(m)?),
        ("stop", Some(m)) => ControlCommand::Stop(id_arg(m)?),
        ("set", Some(m)) => ControlCommand::SetValue(id_arg(m)?, number_arg(m, "value")?),
        ("range", Some(m)) => {
            ControlCommand::SetRange(id_arg(m)?, number_arg(m, "min")?, number_arg(m, "max")?)
        }
        ("rate", Some(m)) => ControlCommand::SetRate(id_arg(m)?, number_arg(m, "rate")?),
        (other, _) => return Err(anyhow!("unknown command: {other}")),
    };
    Ok(cmd)
}

fn broker(matches: &ArgMatches) -> Result<BrokerConfig> {
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT);
    Ok(BrokerConfig {
        host: matches.value_of("host").unwrap_or(DEFAULT_HOST).to_string(),
        port: port.parse().with_context(|| format!("invalid port: {port}"))?,
        ..BrokerConfig::default()
    })
}

async fn send(broker: BrokerConfig, cmd: ControlCommand) -> Result<()> {
    let client_id = format!("{}-control-{}", broker.client_prefix, std::process::id());
    let (host, port) = (broker.host.clone(), broker.port);
    let link = MqttLink::new(&client_id, broker);

    link.connect()
        .await
        .with_context(|| format!("Failed to connect to {host}:{port}"))?;
    debug!("connected to {}:{} as {}", host, port, client_id);

    let result = link.publish(CONTROL_TOPIC, cmd.to_payload()).await;
    link.disconnect().await.ok();
    result.context("Failed to publish control command")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel, comme pour la flotte
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = app().get_matches();
    let cmd = parse_command(&matches)?;
    let broker = broker(&matches)?;
    info!("sending {:?} to {}:{}", cmd, broker.host, broker.port);

    send(broker, cmd).await?;
    println!("Sent command to {}: {}", CONTROL_TOPIC, cmd.to_json());
    Ok(())
}
