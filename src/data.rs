use crate::config::{AppConfig, CensusSource, Credentials, TreesSource};
use crate::processing;
use crate::types::{
    BoroughGeometry, BoroughTreeCount, DashboardData, SpeciesHealthByStewardRow, SpeciesHealthRow,
};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::GeoJson;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::convert::TryInto;
use tracing::{info, warn};

const TREE_COUNT_SELECT: &str = "boroname,count(tree_id)";
const TREE_COUNT_GROUP: &str = "boroname";

const SPECIES_HEALTH_SELECT: &str = "coalesce(spc_common, 'Unknown') as spc_common,boroname,count(tree_id),\
    sum(case when health = 'Fair' then 1 else 0 end) as fair_health,\
    sum(case when health = 'Good' then 1 else 0 end) as good_health,\
    sum(case when health = 'Poor' then 1 else 0 end) as poor_health,\
    round(100 * sum(case when health = 'Poor' then 1 else 0 end) / count(tree_id), 2) as percent_poor_health,\
    round(100 * sum(case when health = 'Fair' then 1 else 0 end) / count(tree_id), 2) as percent_fair_health,\
    round(100 * sum(case when health = 'Good' then 1 else 0 end) / count(tree_id), 2) as percent_good_health";
const SPECIES_HEALTH_GROUP: &str = "spc_common,boroname";

const STEWARD_HEALTH_SELECT: &str = "coalesce(spc_common, 'Unknown') as spc_common,boroname,count(tree_id),steward,\
    round(100 * sum(case when health = 'Poor' then 1 else 0 end) / count(tree_id), 2) as percent_poor_health,\
    round(100 * sum(case when health = 'Fair' then 1 else 0 end) / count(tree_id), 2) as percent_fair_health,\
    round(100 * sum(case when health = 'Good' then 1 else 0 end) / count(tree_id), 2) as percent_good_health";
const STEWARD_HEALTH_GROUP: &str = "spc_common,boroname,steward";

pub async fn load_data(config: &AppConfig) -> Result<DashboardData> {
    info!("Loading data...");
    let client = Client::new();
    let trees = &config.sources.trees;

    // 1. Tree counts per borough
    let counts = fetch_tree_counts(&client, trees).await?;
    info!("Loaded tree counts for {} boroughs", counts.len());

    // 2. County polygons, relabelled to boroughs and joined with the counts
    let mut geometries =
        fetch_county_geometries(&client, &config.sources.census, &config.credentials).await?;
    info!("Loaded geometry for {} counties", geometries.len());
    processing::assign_boroughs(&mut geometries);
    let boroughs = processing::join_tree_counts(geometries, &counts);
    info!("Joined {} boroughs for the map", boroughs.len());

    // 3. Health tables for the dependent charts
    let health = fetch_species_health(&client, trees).await?;
    info!("Loaded {} species/borough health rows", health.len());
    let steward_health = fetch_steward_health(&client, trees).await?;
    info!("Loaded {} species/borough/steward health rows", steward_health.len());

    let data = DashboardData::new(boroughs, health, steward_health);
    if data.species.is_empty() {
        return Err(anyhow!("Tree census returned no species rows"));
    }
    Ok(data)
}

pub async fn fetch_tree_counts(
    client: &Client,
    source: &TreesSource,
) -> Result<Vec<BoroughTreeCount>> {
    let params =
        soql_params(TREE_COUNT_SELECT, TREE_COUNT_GROUP, TREE_COUNT_GROUP, source.row_limit);
    get_json(client, &source.base_url, &params)
        .await
        .context("Failed to fetch tree counts by borough")
}

pub async fn fetch_species_health(
    client: &Client,
    source: &TreesSource,
) -> Result<Vec<SpeciesHealthRow>> {
    let params = soql_params(
        SPECIES_HEALTH_SELECT,
        SPECIES_HEALTH_GROUP,
        SPECIES_HEALTH_GROUP,
        source.row_limit,
    );
    get_json(client, &source.base_url, &params)
        .await
        .context("Failed to fetch species health by borough")
}

pub async fn fetch_steward_health(
    client: &Client,
    source: &TreesSource,
) -> Result<Vec<SpeciesHealthByStewardRow>> {
    let params = soql_params(
        STEWARD_HEALTH_SELECT,
        STEWARD_HEALTH_GROUP,
        STEWARD_HEALTH_GROUP,
        source.row_limit,
    );
    get_json(client, &source.base_url, &params)
        .await
        .context("Failed to fetch species health by steward")
}

/// Census names + the demographic variable, and TIGERweb polygons, merged on
/// county FIPS into one table.
pub async fn fetch_county_geometries(
    client: &Client,
    census: &CensusSource,
    credentials: &Credentials,
) -> Result<Vec<BoroughGeometry>> {
    let stats_url = format!("{}/{}/acs/acs1", census.stats_url.trim_end_matches('/'), census.year);
    let mut params = vec![
        ("get", format!("NAME,{}", census.variable)),
        ("for", format!("county:{}", census.county_fips.join(","))),
        ("in", format!("state:{}", census.state_fips)),
    ];
    if let Some(key) = &credentials.census_key {
        params.push(("key", key.clone()));
    }
    let table: Vec<Vec<Option<String>>> = get_json(client, &stats_url, &params)
        .await
        .context("Failed to fetch census statistics")?;
    let stats = parse_census_stats(&table, &census.variable)?;

    let boundary_params = boundary_params(census);
    let body = get_text(client, &census.boundaries_url, &boundary_params)
        .await
        .context("Failed to fetch county boundaries")?;
    let boundaries = parse_county_boundaries(&body)?;

    Ok(merge_census(stats, boundaries))
}

fn soql_params(select: &str, group: &str, order: &str, limit: u32) -> Vec<(&'static str, String)> {
    vec![
        ("$select", select.to_string()),
        ("$group", group.to_string()),
        ("$order", order.to_string()),
        ("$limit", limit.to_string()),
    ]
}

fn boundary_params(census: &CensusSource) -> Vec<(&'static str, String)> {
    let counties = census
        .county_fips
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(",");
    let mut params = vec![
        ("where", format!("STATE='{}' AND COUNTY IN ({})", census.state_fips, counties)),
        ("outFields", "STATE,COUNTY,NAME".to_string()),
        ("outSR", "4326".to_string()),
        ("returnGeometry", "true".to_string()),
        ("f", "geojson".to_string()),
    ];
    // Server-side generalisation, in outSR units (degrees).
    if census.simplify_tolerance > 0.0 {
        params.push(("maxAllowableOffset", census.simplify_tolerance.to_string()));
    }
    params
}

async fn get_text(client: &Client, url: &str, params: &[(&str, String)]) -> Result<String> {
    let response = client
        .get(url)
        .query(params)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()
        .with_context(|| format!("GET {} returned an error status", url))?;
    let body = response.text().await.context("Failed to read response body")?;
    Ok(body)
}

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    params: &[(&str, String)],
) -> Result<T> {
    let body = get_text(client, url, params).await?;
    serde_json::from_str(&body)
        .with_context(|| format!("Unexpected response shape from {}", url))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CensusStat {
    pub name: String,
    pub county_fips: String,
    pub value: Option<u64>,
}

/// The census API answers with a header row followed by one row per county.
pub fn parse_census_stats(
    table: &[Vec<Option<String>>],
    variable: &str,
) -> Result<Vec<CensusStat>> {
    let (header, rows) = table
        .split_first()
        .ok_or_else(|| anyhow!("Census response is empty"))?;

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.as_deref() == Some(name))
            .ok_or_else(|| anyhow!("Column '{}' not found in census response", name))
    };
    let name_idx = column("NAME")?;
    let value_idx = column(variable)?;
    let county_idx = column("county")?;

    let mut stats = Vec::new();
    for row in rows {
        let cell = |idx: usize| row.get(idx).cloned().flatten();
        let (Some(name), Some(county_fips)) = (cell(name_idx), cell(county_idx)) else {
            warn!("Skipping census row without name or county: {:?}", row);
            continue;
        };
        stats.push(CensusStat {
            name,
            county_fips,
            value: cell(value_idx).and_then(|v| v.parse().ok()),
        });
    }
    Ok(stats)
}

/// County polygons keyed by county FIPS.
pub fn parse_county_boundaries(body: &str) -> Result<HashMap<String, MultiPolygon<f64>>> {
    let geojson: GeoJson = body.parse().context("Failed to parse county boundary GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("County boundaries must be a FeatureCollection")),
    };

    let mut boundaries = HashMap::new();

    for feature in collection.features {
        let id_val = feature.properties.as_ref().and_then(|props| props.get("COUNTY"));
        let county = match id_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => format!("{:0>3}", n.to_string()),
            _ => continue,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue,
                }
            }
            None => continue,
        };

        boundaries.insert(county, geometry);
    }

    Ok(boundaries)
}

pub fn merge_census(
    stats: Vec<CensusStat>,
    mut boundaries: HashMap<String, MultiPolygon<f64>>,
) -> Vec<BoroughGeometry> {
    stats
        .into_iter()
        .filter_map(|stat| {
            let Some(geometry) = boundaries.remove(&stat.county_fips) else {
                warn!("No boundary for county {} ({})", stat.county_fips, stat.name);
                return None;
            };
            Some(BoroughGeometry {
                name: stat.name,
                county_fips: stat.county_fips,
                population: stat.value,
                geometry,
                boroname: None,
            })
        })
        .collect()
}
