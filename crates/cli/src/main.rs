mod workload;

use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tprofile_core::{Profiler, ProfilerConfig};
use tracing_subscriber::EnvFilter;

use workload::Workload;

const USAGE: &str = "Usage: tprofile [--duration-ms N] [--threads N] \
[--format tree|collapsed|json|activity] [--config FILE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Tree,
    Collapsed,
    Json,
    Activity,
}

#[derive(Debug)]
struct Args {
    duration: Duration,
    threads: usize,
    format: Format,
    config: Option<PathBuf>,
    help: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args {
        duration: Duration::from_secs(2),
        threads: 2,
        format: Format::Tree,
        config: None,
        help: false,
    };
    while let Some(flag) = args.next() {
        let mut value = || args.next().with_context(|| format!("{flag} needs a value"));
        match flag.as_str() {
            "--duration-ms" => {
                parsed.duration = Duration::from_millis(value()?.parse().context("--duration-ms")?);
            }
            "--threads" => parsed.threads = value()?.parse().context("--threads")?,
            "--format" => {
                parsed.format = match value()?.as_str() {
                    "tree" => Format::Tree,
                    "collapsed" => Format::Collapsed,
                    "json" => Format::Json,
                    "activity" => Format::Activity,
                    other => bail!("unknown format: {other}"),
                };
            }
            "--config" => parsed.config = Some(PathBuf::from(value()?)),
            "-h" | "--help" => parsed.help = true,
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(parsed)
}

fn load_config(path: Option<&PathBuf>) -> Result<ProfilerConfig> {
    let Some(path) = path else {
        return Ok(ProfilerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    ProfilerConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        writeln!(std::io::stdout().lock(), "{USAGE}")?;
        return Ok(());
    }
    let config = load_config(args.config.as_ref())?;

    let mut profiler = Profiler::start_with(config)?;
    let workload = Workload::spawn(args.threads)?;
    thread::sleep(args.duration);
    let iterations = workload.finish();
    profiler.stop();
    tracing::info!(iterations, cycles = profiler.history_len(), "workload finished");

    let output = match args.format {
        Format::Tree => profiler.get_profile(None, None).render_text(),
        Format::Collapsed => profiler.get_profile(None, None).to_collapsed(),
        Format::Json => serde_json::to_string_pretty(&profiler.get_profile(None, None))? + "\n",
        Format::Activity => {
            serde_json::to_string_pretty(&profiler.get_profile_metadata(None, None))? + "\n"
        }
    };
    std::io::stdout().lock().write_all(output.as_bytes())?;
    Ok(())
}
