#[derive(clap::Parser, Debug)]
pub struct ControlCommand {
    /// The Rémi object id, as shown by `list`
    pub id: String,

    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(clap::Parser, Debug, PartialEq)]
enum SubCommand {
    /// Switch the night light on
    On,
    /// Switch the night light off
    Off,
    Luminosity {
        percent: i64,
    },
    Volume {
        percent: i64,
    },
    /// Show the current device state
    Show,
}

impl ControlCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        let client = args.api_args.logged_in_client().await?;
        if !client.device_ids().iter().any(|id| *id == self.id) {
            anyhow::bail!(
                "device {} is not associated with this account. Known devices: {}",
                self.id,
                client.device_ids().join(", ")
            );
        }

        match &self.cmd {
            SubCommand::On | SubCommand::Off => {
                let result = if self.cmd == SubCommand::On {
                    client.turn_on(&self.id).await?
                } else {
                    client.turn_off(&self.id).await?
                };
                println!("{result:#}");
            }
            SubCommand::Luminosity { percent } => {
                let result = client.set_brightness(&self.id, *percent).await?;
                println!("{result:#}");
            }
            SubCommand::Volume { percent } => {
                let result = client.set_volume(&self.id, *percent).await?;
                println!("{result:#}");
            }
            SubCommand::Show => {
                let info = client.get_device_info(&self.id).await?;
                println!("{info:#?}");
                println!("temperature: {:.1}°C", info.temperature_celsius());
            }
        }

        Ok(())
    }
}
