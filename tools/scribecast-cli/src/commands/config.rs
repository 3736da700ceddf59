//! Show or save the effective configuration.

use scribecast_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, save: bool) -> anyhow::Result<()> {
    println!("# {}", config_file_path().display());
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        let path = config.save()?;
        println!();
        println!("Configuration written to: {}", path.display());
    }
    Ok(())
}
