use std::fs;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use studio_engine::StudioOptions;
use studio_host::HostConfig;
use studio_ipc::Settings;

#[derive(Parser, Debug)]
#[command(name = "studio-host", version)]
struct Cli {
    /// Settings JSON. When given, the studio starts before reading commands.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Orchestration options JSON.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Directory screenshots are written to.
    #[arg(long, default_value = ".")]
    screenshot_dir: PathBuf,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    studio_host::init_logging();

    let settings: Option<Settings> = cli.settings.as_ref().map(read_json).transpose()?;
    let options: StudioOptions = match &cli.options {
        Some(path) => read_json(path)?,
        None => StudioOptions::default(),
    };

    studio_host::run(HostConfig {
        settings,
        options,
        screenshot_dir: cli.screenshot_dir,
    })
}
