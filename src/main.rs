use clap::Parser;
use std::str::FromStr;

mod commands;
mod hass_mqtt;
mod remi_api;
mod service;
mod temperature;
mod version_info;

#[derive(clap::Parser, Debug)]
#[command(version = version_info::remi_version())]
pub struct Args {
    #[command(flatten)]
    api_args: remi_api::RemiApiArguments,
    #[command(flatten)]
    hass_args: service::hass::HassArguments,

    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(clap::Parser, Debug)]
enum SubCommand {
    /// List the devices on the account along with their current state
    List(commands::list::ListCommand),
    /// Control a single device
    Control(commands::control::ControlCommand),
    /// Inspect and toggle alarms
    Alarms(commands::alarms::AlarmsCommand),
    /// Run the MQTT bridge and HTTP API
    Serve(commands::serve::ServeCommand),
}

pub fn opt_env_var<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    <T as FromStr>::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(p) => Ok(Some(
            p.trim()
                .parse()
                .map_err(|err| anyhow::anyhow!("parsing ${name}: {err:#}"))?,
        )),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => anyhow::bail!("${name} is invalid: {err:#}"),
    }
}

impl Args {
    pub async fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            SubCommand::List(cmd) => cmd.run(self).await,
            SubCommand::Control(cmd) => cmd.run(self).await,
            SubCommand::Alarms(cmd) => cmd.run(self).await,
            SubCommand::Serve(cmd) => cmd.run(self).await,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    color_backtrace::install();
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("remi2mqtt=info,mosquitto=info"),
    )
    .init();

    let args = Args::parse();
    args.run().await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_var_parsing() {
        std::env::set_var("REMI2MQTT_TEST_PORT", " 1884 ");
        let port: Option<u16> = opt_env_var("REMI2MQTT_TEST_PORT").unwrap();
        assert_eq!(port, Some(1884));

        std::env::set_var("REMI2MQTT_TEST_PORT", "nope");
        assert!(opt_env_var::<u16>("REMI2MQTT_TEST_PORT").is_err());

        std::env::remove_var("REMI2MQTT_TEST_PORT");
        let port: Option<u16> = opt_env_var("REMI2MQTT_TEST_PORT").unwrap();
        assert_eq!(port, None);
    }

    #[test]
    fn cli_shape() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
