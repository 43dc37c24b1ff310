use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::warn;

pub const MAPBOX_API_VAR: &str = "MAPBOX_API";
pub const CENSUS_API_VAR: &str = "CENSUS_API";

const TIGERWEB_COUNTIES: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/State_County/MapServer/1/query";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
    // Populated from the environment, never from the TOML file.
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub trees: TreesSource,
    #[serde(default)]
    pub census: CensusSource,
}

/// Socrata endpoint of the 2015 Street Tree Census.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TreesSource {
    pub base_url: String,
    pub row_limit: u32,
}

impl Default for TreesSource {
    fn default() -> Self {
        Self {
            base_url: "https://data.cityofnewyork.us/resource/nwxe-4ae8.json".to_string(),
            row_limit: 50_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CensusSource {
    pub stats_url: String,
    pub boundaries_url: String,
    pub year: u16,
    pub variable: String,
    pub state_fips: String,
    pub county_fips: Vec<String>,
    /// Boundary generalisation in degrees; 0 fetches full-resolution polygons.
    pub simplify_tolerance: f64,
}

impl Default for CensusSource {
    fn default() -> Self {
        Self {
            stats_url: "https://api.census.gov/data".to_string(),
            boundaries_url: TIGERWEB_COUNTIES.to_string(),
            year: 2019,
            variable: "B03002_001E".to_string(),
            state_fips: "36".to_string(),
            county_fips: ["005", "047", "061", "081", "085"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            simplify_tolerance: 0.0005,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub style: String,
    /// Used when no mapbox token is available.
    pub fallback_style: String,
    pub zoom: f64,
    pub center_lat: f64,
    pub center_lon: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            style: "mapbox://styles/mapbox/light-v10".to_string(),
            fallback_style: "carto-positron".to_string(),
            zoom: 9.0,
            center_lat: 40.7,
            center_lon: -73.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8050,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub mapbox_token: Option<String>,
    pub census_key: Option<String>,
}

impl Credentials {
    /// Reads both keys from the process environment (and `.env`, if present).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let credentials = Self {
            mapbox_token: read(MAPBOX_API_VAR),
            census_key: read(CENSUS_API_VAR),
        };
        if credentials.mapbox_token.is_none() {
            warn!("{} is not set, the map will use the fallback tile style", MAPBOX_API_VAR);
        }
        if credentials.census_key.is_none() {
            warn!("{} is not set, census requests are sent without a key", CENSUS_API_VAR);
        }
        credentials
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_toml(&content)?;
        config.credentials = Credentials::from_env();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
