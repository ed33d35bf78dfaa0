//! Configuration display command.

use std::path::Path;

use crate::config::{self as app_config, Config, config_path};

/// Print the effective configuration as TOML, optionally writing it out
pub fn cmd_config(config: &Config, explicit: Option<&Path>, write: bool) -> anyhow::Result<()> {
    if write {
        let path = match explicit {
            Some(path) => {
                app_config::save_to(config, path)?;
                path.to_path_buf()
            }
            None => app_config::save(config)?,
        };
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    match explicit.map(Path::to_path_buf).or_else(config_path) {
        Some(path) if path.exists() => println!("# Loaded from {}", path.display()),
        Some(path) => println!("# {} does not exist; showing defaults", path.display()),
        None => println!("# No config directory on this platform; showing defaults"),
    }
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
