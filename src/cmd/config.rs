use std::path::Path;

use anyhow::{Context, Result};
use crossterm::style::{self, Stylize};
use shuck::config::{self, Config};

/// Write the default configuration to `path` or the per-user location.
pub fn init(path: Option<&Path>) -> Result<()> {
    let dest = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let home = config::home_dir().context("HOME is not set; pass a path explicitly")?;
            config::user_config_path(&home)
        }
    };

    Config::default().save(&dest)?;
    eprintln!(
        "{} Wrote {}",
        "✔".green(),
        style::style(dest.display()).cyan()
    );
    Ok(())
}

/// Print the configuration `analyze` would use.
pub fn show(path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).or_else(Config::discover);
    let cfg = Config::load(path.as_deref())?;
    if let Some(p) = &path {
        eprintln!("{} {}", "Using".dim(), style::style(p.display()).cyan());
    }
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
