//! Settings: CLI flags over environment over config file over defaults.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::Value as TomlValue;

pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_POLL_MS: u64 = 100;

const ENV_STYLESHEET: &str = "STYLEWATCH_STYLESHEET";
const ENV_DELAY_MS: &str = "STYLEWATCH_DELAY_MS";
const ENV_POLL_MS: &str = "STYLEWATCH_POLL_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub stylesheet: Option<PathBuf>,
    /// Gap between one cycle's delivery and the next cycle's start.
    pub delay: Duration,
    /// How often a blocked wait re-checks for cancellation.
    pub poll_interval: Duration,
}

/// One source of settings. Unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layer {
    pub stylesheet: Option<PathBuf>,
    pub delay_ms: Option<u64>,
    pub poll_ms: Option<u64>,
}

impl Layer {
    /// Fill unset fields from `lower`.
    pub fn or(self, lower: Layer) -> Layer {
        Layer {
            stylesheet: self.stylesheet.or(lower.stylesheet),
            delay_ms: self.delay_ms.or(lower.delay_ms),
            poll_ms: self.poll_ms.or(lower.poll_ms),
        }
    }

    pub fn resolve(self) -> Result<Settings> {
        let poll_ms = self.poll_ms.unwrap_or(DEFAULT_POLL_MS);
        if poll_ms == 0 {
            bail!("poll interval must be at least 1 ms");
        }
        Ok(Settings {
            stylesheet: self.stylesheet,
            delay: Duration::from_millis(self.delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not find config directory")?;
    Ok(dir.join("stylewatch").join("config.toml"))
}

/// Load settings from every layer. `cli` wins over everything.
pub fn load(cli: Layer, config_path: Option<&Path>) -> Result<Settings> {
    let env = env_layer(|key| std::env::var(key).ok())?;
    let file = match config_path {
        Some(path) => load_file(path)?,
        None => match default_config_path() {
            Ok(path) => load_file(&path)?,
            Err(_) => Layer::default(),
        },
    };
    cli.or(env).or(file).resolve()
}

/// A missing file is an empty layer; a malformed one is an error.
pub fn load_file(path: &Path) -> Result<Layer> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Layer::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", path.display()))
        }
    };
    parse_file(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

fn parse_file(text: &str) -> Result<Layer> {
    let value = text.parse::<TomlValue>()?;
    let table = value.as_table().context("config root must be a table")?;

    let stylesheet = match table.get("stylesheet") {
        None => None,
        Some(v) => Some(PathBuf::from(
            v.as_str().context("`stylesheet` must be a string")?,
        )),
    };

    Ok(Layer {
        stylesheet,
        delay_ms: millis_field(table, "delay_ms")?,
        poll_ms: millis_field(table, "poll_ms")?,
    })
}

fn millis_field(table: &toml::map::Map<String, TomlValue>, key: &str) -> Result<Option<u64>> {
    match table.get(key) {
        None => Ok(None),
        Some(v) => {
            let n = v
                .as_integer()
                .with_context(|| format!("`{}` must be an integer", key))?;
            let n = u64::try_from(n).with_context(|| format!("`{}` must not be negative", key))?;
            Ok(Some(n))
        }
    }
}

fn env_layer(lookup: impl Fn(&str) -> Option<String>) -> Result<Layer> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let millis = |key: &str| -> Result<Option<u64>> {
        non_empty(key)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a number of milliseconds", key))
            })
            .transpose()
    };

    Ok(Layer {
        stylesheet: non_empty(ENV_STYLESHEET).map(|v| PathBuf::from(v.trim())),
        delay_ms: millis(ENV_DELAY_MS)?,
        poll_ms: millis(ENV_POLL_MS)?,
    })
}

/// Remember `stylesheet` as the one to open next time. Other keys in the
/// file are preserved. A file that cannot be read or parsed is left alone.
pub fn save_stylesheet(config_path: &Path, stylesheet: &Path) -> Result<()> {
    let mut table = match fs::read_to_string(config_path) {
        Ok(text) => match text.parse::<TomlValue>() {
            Ok(TomlValue::Table(table)) => table,
            Ok(_) => bail!("Invalid config file {}: root must be a table", config_path.display()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Invalid config file {}", config_path.display()))
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => toml::map::Map::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", config_path.display()))
        }
    };
    table.insert(
        "stylesheet".to_string(),
        TomlValue::String(stylesheet.to_string_lossy().into_owned()),
    );

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = toml::to_string(&TomlValue::Table(table)).context("Failed to encode config")?;
    fs::write(config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(())
}
