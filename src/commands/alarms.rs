use crate::remi_api::alarm::Alarm;

#[derive(clap::Parser, Debug)]
pub struct AlarmsCommand {
    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(clap::Parser, Debug)]
enum SubCommand {
    /// Show the alarms of every device, or of just one
    List {
        device: Option<String>,
    },
    /// Enable or disable an alarm by its setting id
    Toggle {
        setting_id: String,
        /// on or off
        #[arg(value_parser = parse_on_off, action = clap::ArgAction::Set)]
        state: bool,
    },
    /// Dump the raw alarm/schedule records of a device
    Schedules {
        device: String,
    },
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "enable" => Ok(true),
        "off" | "false" | "0" | "disable" => Ok(false),
        _ => Err(format!("expected on or off, got {s}")),
    }
}

fn print_alarm(alarm: &Alarm) {
    let days: Vec<String> = alarm.days.iter().map(|d| d.to_string()).collect();
    println!(
        "  {id:<32} {time} {state:<3} {kind:<14} {name} [{days}]",
        id = alarm.id,
        time = alarm.time,
        state = if alarm.enabled { "on" } else { "off" },
        kind = format!("{:?}", alarm.kind),
        name = alarm.name,
        days = days.join(", "),
    );
}

impl AlarmsCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        let client = args.api_args.logged_in_client().await?;

        match &self.cmd {
            SubCommand::List { device: Some(device) } => {
                println!("{device}");
                for alarm in client.get_bedtime_settings(device).await {
                    print_alarm(&alarm);
                }
            }
            SubCommand::List { device: None } => {
                let mut all: Vec<_> = client.get_all_bedtime_settings().await.into_iter().collect();
                all.sort_by(|a, b| a.0.cmp(&b.0));
                for (device, alarms) in all {
                    println!("{device}");
                    for alarm in &alarms {
                        print_alarm(alarm);
                    }
                }
            }
            SubCommand::Toggle { setting_id, state } => {
                let ack = client.toggle(setting_id, *state).await?;
                println!("{}", serde_json::to_string_pretty(&ack)?);
            }
            SubCommand::Schedules { device } => {
                let records = client.get_alarm_settings(device).await?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
        }

        Ok(())
    }
}
