use crate::service::device::collect_devices;

#[derive(clap::Parser, Debug)]
pub struct ListCommand {}

impl ListCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        let client = args.api_args.logged_in_client().await?;
        let mut devices = collect_devices(&client).await;
        devices.sort_by_key(|d| d.name());

        for d in devices {
            let Some(info) = &d.info else {
                continue;
            };
            println!(
                "{id:<12} {temp:>7} lum={lum:<3} vol={vol:<3} {face:<12} fw={fw} {name}",
                id = d.id,
                temp = d
                    .temperature()
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                lum = info.luminosity,
                vol = info.volume,
                face = info
                    .face_name
                    .as_deref()
                    .or(info.face_id.as_deref())
                    .unwrap_or("-"),
                fw = format!(
                    "{}{}",
                    info.firmware_version.as_deref().unwrap_or("?"),
                    if info.firmware_need_update {
                        " (update available)"
                    } else {
                        ""
                    }
                ),
                name = d.name(),
            );
        }

        Ok(())
    }
}
