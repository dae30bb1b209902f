use std::fs;

use anyhow::{Context, Result, bail};
use vdb::{Engine, EngineConfig, IndexOption, IvfOption, TableOptions};

use crate::cli::{Cli, CreateTableCommand, IndexArg};

/// Open the engine named by the global flags.
pub fn open_engine(cli: &Cli) -> Result<Engine> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Engine::open(&cli.root, config)
        .with_context(|| format!("Failed to open database at {}", cli.root.display()))
}

/// Merge an options file with the command-line flags.
pub fn table_options(cmd: &CreateTableCommand) -> Result<TableOptions> {
    let mut options = match &cmd.options {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse table options TOML")?
        }
        None => TableOptions::new(),
    };

    if let Some(dimension) = cmd.dimension {
        options.dimension = Some(dimension);
    }
    if let Some(metric) = cmd.metric {
        options.metric = Some(metric);
    }
    if cmd.normalize {
        options.normalize = true;
    }

    let ivf_flags = cmd.n_lists.is_some() || cmd.n_probe.is_some();
    match cmd.index {
        Some(IndexArg::Flat) if ivf_flags => {
            bail!("--n-lists and --n-probe only apply to --index ivf")
        }
        Some(IndexArg::Flat) => options.index = Some(IndexOption::Flat),
        Some(IndexArg::Ivf) => {
            let mut ivf = match options.index.take() {
                Some(IndexOption::Ivf(ivf)) => ivf,
                _ => IvfOption::default(),
            };
            if let Some(n_lists) = cmd.n_lists {
                ivf.n_lists = n_lists;
            }
            if let Some(n_probe) = cmd.n_probe {
                ivf.n_probe = n_probe;
            }
            options.index = Some(IndexOption::Ivf(ivf));
        }
        None if ivf_flags => bail!("--n-lists and --n-probe require --index ivf"),
        None => {}
    }
    Ok(options)
}
