use crate::geo::Site;
use crate::levels::PressureLevel;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const URL_LIST_FILE: &str = "nam_data_url_paths.csv";
pub const OUTPUT_FILE: &str = "nam_data.csv.gz";

/// Months scraped by default: the ski season.
pub const SKI_SEASON_MONTHS: [u32; 7] = [1, 2, 3, 4, 5, 11, 12];

const DEFAULT_BASE_URL: &str =
    "https://www.ncei.noaa.gov/data/north-american-mesoscale-model/access/historical/analysis";

/// Run inputs, read from the JSON config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data_path: PathBuf,
    pub site: Site,
    pub pressure_levels: Vec<PressureLevel>,
    pub months: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    start_date: NaiveDate,
    end_date: NaiveDate,
    relative_data_path: PathBuf,
    requested_lat: Number,
    requested_lon: Number,
    pressure_levels: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    months: Option<Vec<u32>>,
}

/// JSON number, or a string holding one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Number {
    Float(f64),
    Text(String),
}

impl Number {
    fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            Number::Float(v) => Ok(*v),
            Number::Text(s) => s
                .trim()
                .parse()
                .with_context(|| format!("{} is not a number: {:?}", name, s)),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(content)?;

        if raw.start_date > raw.end_date {
            bail!(
                "start_date {} is after end_date {}",
                raw.start_date,
                raw.end_date
            );
        }

        let months = raw.months.unwrap_or_else(|| SKI_SEASON_MONTHS.to_vec());
        if let Some(m) = months.iter().find(|m| !(1..=12).contains(*m)) {
            bail!("invalid month {}", m);
        }

        let pressure_levels = raw
            .pressure_levels
            .iter()
            .map(|(label, value)| parse_level(label, value))
            .collect::<Result<Vec<_>>>()?;
        if pressure_levels.is_empty() {
            bail!("no pressure_levels configured");
        }

        Ok(Config {
            start_date: raw.start_date,
            end_date: raw.end_date,
            data_path: raw.relative_data_path,
            site: Site::new(
                raw.requested_lat.as_f64("requested_lat")?,
                raw.requested_lon.as_f64("requested_lon")?,
            ),
            pressure_levels,
            months,
        })
    }

    pub fn url_list_path(&self) -> PathBuf {
        self.data_path.join(URL_LIST_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_path.join(OUTPUT_FILE)
    }
}

fn parse_level(label: &str, value: &serde_json::Value) -> Result<PressureLevel> {
    let hpa = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match hpa.and_then(|v| i32::try_from(v).ok()) {
        Some(hpa) if hpa > 0 => Ok(PressureLevel::new(label, hpa)),
        _ => bail!("pressure level {} is not a positive integer: {}", label, value),
    }
}

/// HTTP settings, read from `NAMWIND_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl HttpSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        envy::prefixed("NAMWIND_")
            .from_iter::<_, HttpSettings>(vars)
            .context("Invalid NAMWIND_* environment settings")
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}
