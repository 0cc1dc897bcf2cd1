use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use crossterm::style::{self, Stylize};
use shuck::config::{Config, OutputFormat};
use shuck::render;
use shuck::unpack::{self, RuntimeSaver};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::AnalyzeArgs;
use crate::progress::Spinner;

pub async fn run(image: &str, args: &AnalyzeArgs) -> Result<()> {
    let cfg = load_config(args)?;
    let mut opts = cfg.analyze_options()?;
    opts.verbose |= args.verbose;
    if let Some(n) = args.top_files {
        opts.size.top_files = n;
    }
    if let Some(n) = args.top_dirs {
        opts.size.top_dirs = n;
    }

    let json_dest = match (&args.json, cfg.default_output_format) {
        (Some(dest), _) => Some(dest.as_str()),
        (None, OutputFormat::Json) => Some("-"),
        (None, OutputFormat::Text) => None,
    };

    let workdir = work_dir()?;
    debug!(workdir = %workdir.path().display(), "created work directory");

    let spinner = Spinner::new(format!("Unpacking {image} ..."));
    let unpacked = {
        let image = image.to_string();
        let dest = workdir.path().to_path_buf();
        let saver = RuntimeSaver::new(args.runtime);
        tokio::task::spawn_blocking(move || unpack::unpack_image(&image, &dest, &saver))
            .await
            .context("Unpack task failed")?
    };

    let root = match unpacked {
        Ok(root) => root,
        Err(err) => {
            spinner.fail(format!("Could not unpack {image}"));
            cleanup(workdir, args.keep);
            return Err(err).with_context(|| format!("Failed to unpack {image}"));
        }
    };

    spinner.set_message("Analyzing filesystem ...");
    let report = shuck::analyze(image, &root, &opts).await;
    spinner.finish(format!("Analyzed {image}"));

    let written = write_report(&report, json_dest);
    cleanup(workdir, args.keep);
    written
}

fn load_config(args: &AnalyzeArgs) -> Result<Config> {
    let path = args.config.clone().or_else(Config::discover);
    if let Some(path) = &path {
        debug!(path = %path.display(), "loading config");
    }
    Config::load(path.as_deref())
}

fn write_report(report: &shuck::AnalysisReport, json_dest: Option<&str>) -> Result<()> {
    match json_dest {
        Some("-") => {
            println!("{}", render::to_json(report)?);
        }
        Some(dest) => {
            let output = render::to_json(report)?;
            fs::write(dest, &output).with_context(|| format!("Failed to write JSON to {dest}"))?;
            eprintln!("{} Wrote {}", "✔".green(), style::style(dest).cyan());
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            render::write_text(report, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Fresh, uniquely named directory under the system temp dir.
fn work_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("shuck-")
        .tempdir()
        .context("Failed to create work directory")
}

fn cleanup(workdir: TempDir, keep: bool) {
    if keep {
        let kept = workdir.keep();
        eprintln!(
            "{} Unpacked tree kept at {}",
            "▶".green().bold(),
            style::style(kept.display()).cyan()
        );
        return;
    }
    let path = workdir.path().to_path_buf();
    if let Err(err) = workdir.close() {
        warn!(workdir = %path.display(), error = %err, "failed to remove work directory");
    }
}
