//! Plotly figure specifications for the map and the two health charts.
//!
//! Builders are pure: the same rows and selectors always serialise to the
//! same JSON, so responses can be compared byte for byte.

use crate::config::MapConfig;
use crate::types::{JoinedBorough, SpeciesHealthByStewardRow, SpeciesHealthRow};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::Serialize;
use tracing::warn;

/// Label and bar colour per health level, in display order.
pub const HEALTH_LEVELS: [(&str, &str); 3] =
    [("Good", "green"), ("Fair", "orange"), ("Poor", "red")];

/// Known steward categories, least to most stewardship.
pub const STEWARD_ORDER: [&str; 4] = ["None", "1or2", "3or4", "4orMore"];

const BAR_OPACITY: f64 = 0.75;

#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Choroplethmapbox(ChoroplethTrace),
    Bar(BarTrace),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethTrace {
    pub geojson: FeatureCollection,
    pub locations: Vec<String>,
    pub z: Vec<u64>,
    pub colorscale: String,
    pub zmin: u64,
    pub zmax: u64,
    pub marker: ChoroplethMarker,
    pub hovertemplate: String,
    pub customdata: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethMarker {
    pub opacity: f64,
    pub line: Line,
}

#[derive(Debug, Clone, Serialize)]
pub struct Line {
    pub width: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarTrace {
    pub x: Vec<String>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub marker: BarMarker,
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customdata: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hovertemplate: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarMarker {
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Color {
    Single(String),
    PerBar(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bargap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bargroupgap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapbox: Option<Mapbox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<Margin>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Title {
    pub text: String,
}

impl Title {
    fn new(text: impl Into<String>) -> Option<Self> {
        Some(Self { text: text.into() })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    pub visible: bool,
}

impl Axis {
    fn titled(text: &str) -> Option<Self> {
        Some(Self { title: Title::new(text), visible: true })
    }

    fn hidden() -> Option<Self> {
        Some(Self { title: None, visible: false })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Legend {
    pub x: f64,
    pub y: f64,
    pub orientation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mapbox {
    pub style: String,
    pub zoom: f64,
    pub center: Center,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accesstoken: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub t: u32,
    pub b: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub text: String,
    pub showarrow: bool,
    pub xref: String,
    pub yref: String,
    pub x: f64,
    pub y: f64,
}

/// Choropleth of tree counts, one polygon per borough. Built once at startup.
pub fn build_map(
    boroughs: &[JoinedBorough],
    config: &MapConfig,
    mapbox_token: Option<&str>,
) -> Figure {
    let features = boroughs
        .iter()
        .enumerate()
        .map(|(i, borough)| Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::from(&borough.geometry))),
            id: Some(geojson::feature::Id::String(i.to_string())),
            properties: None,
            foreign_members: None,
        })
        .collect();

    let z: Vec<u64> = boroughs.iter().map(|b| b.count_tree_id).collect();
    let zmax = z.iter().copied().max().unwrap_or(0);

    let trace = ChoroplethTrace {
        geojson: FeatureCollection { bbox: None, features, foreign_members: None },
        locations: (0..boroughs.len()).map(|i| i.to_string()).collect(),
        z,
        colorscale: "Greens".to_string(),
        zmin: 0,
        zmax,
        marker: ChoroplethMarker { opacity: 0.75, line: Line { width: 0.0 } },
        hovertemplate: "<b>%{customdata[0]}</b><br><br>Count of Trees: %{z:,}<br><extra></extra>"
            .to_string(),
        customdata: boroughs.iter().map(|b| (b.boroname.clone(), b.count_tree_id)).collect(),
    };

    // Tokenless styles render without mapbox credentials.
    let style = match mapbox_token {
        Some(_) => config.style.clone(),
        None => config.fallback_style.clone(),
    };

    Figure {
        data: vec![Trace::Choroplethmapbox(trace)],
        layout: Layout {
            mapbox: Some(Mapbox {
                style,
                zoom: config.zoom,
                center: Center { lat: config.center_lat, lon: config.center_lon },
                accesstoken: mapbox_token.map(str::to_string),
            }),
            margin: Some(Margin { l: 0, r: 0, t: 30, b: 0 }),
            ..Layout::default()
        },
    }
}

/// Good/Fair/Poor percentages of one species in one borough.
///
/// Expects exactly one row. With none the figure says so instead of plotting;
/// with several, the first wins.
pub fn build_health_bar(rows: &[&SpeciesHealthRow], species: &str, borough: &str) -> Figure {
    let title = format!("Health Status of {} in {}", species, borough);

    let row = match rows {
        [] => return no_data(title, species, borough),
        [row] => row,
        [row, ..] => {
            warn!("{} health rows for {} in {}, using the first", rows.len(), species, borough);
            row
        }
    };

    let trace = BarTrace {
        x: HEALTH_LEVELS.iter().map(|(label, _)| label.to_string()).collect(),
        y: vec![row.percent_good_health, row.percent_fair_health, row.percent_poor_health],
        name: None,
        marker: BarMarker {
            color: Color::PerBar(
                HEALTH_LEVELS.iter().map(|(_, color)| color.to_string()).collect(),
            ),
        },
        opacity: BAR_OPACITY,
        customdata: Some(vec![row.good_health, row.fair_health, row.poor_health]),
        hovertemplate: Some("%{x}: %{y:.2f}% (%{customdata:,} trees)<extra></extra>".to_string()),
    };

    Figure {
        data: vec![Trace::Bar(trace)],
        layout: Layout {
            title: Title::new(title),
            xaxis: Axis::titled("Health"),
            yaxis: Axis::titled("Percentage (%)"),
            bargap: Some(0.1),
            bargroupgap: Some(0.1),
            ..Layout::default()
        },
    }
}

/// Poor/Fair/Good percentages side by side for each steward category.
pub fn build_steward_bar(
    rows: &[&SpeciesHealthByStewardRow],
    species: &str,
    borough: &str,
) -> Figure {
    let title = format!("Health Status of {} by Steward Type in {}", species, borough);
    if rows.is_empty() {
        return no_data(title, species, borough);
    }

    let stewards = ordered_stewards(rows);
    let row_for = |steward: &str| rows.iter().find(|r| r.steward == steward);

    let series = |label: &str, color: &str, value: fn(&SpeciesHealthByStewardRow) -> f64| {
        Trace::Bar(BarTrace {
            x: stewards.clone(),
            y: stewards
                .iter()
                .map(|s| row_for(s.as_str()).map(|r| value(r)).unwrap_or(0.0))
                .collect(),
            name: Some(label.to_string()),
            marker: BarMarker { color: Color::Single(color.to_string()) },
            opacity: BAR_OPACITY,
            customdata: None,
            hovertemplate: None,
        })
    };

    Figure {
        data: vec![
            series("Poor", "red", |r| r.percent_poor_health),
            series("Fair", "orange", |r| r.percent_fair_health),
            series("Good", "green", |r| r.percent_good_health),
        ],
        layout: Layout {
            title: Title::new(title),
            xaxis: Axis::titled("Steward Type"),
            yaxis: Axis::titled("Percentage (%)"),
            barmode: Some("group".to_string()),
            bargap: Some(0.15),
            bargroupgap: Some(0.1),
            legend: Some(Legend { x: 0.0, y: 1.15, orientation: "h".to_string() }),
            ..Layout::default()
        },
    }
}

/// Distinct stewards: known categories first in their natural order, then
/// anything else alphabetically.
pub fn ordered_stewards(rows: &[&SpeciesHealthByStewardRow]) -> Vec<String> {
    let mut stewards: Vec<String> = Vec::new();
    for row in rows {
        if !stewards.contains(&row.steward) {
            stewards.push(row.steward.clone());
        }
    }
    stewards.sort_by(|a, b| {
        let rank =
            |s: &str| STEWARD_ORDER.iter().position(|k| *k == s).unwrap_or(STEWARD_ORDER.len());
        rank(a.as_str()).cmp(&rank(b.as_str())).then_with(|| a.cmp(b))
    });
    stewards
}

fn no_data(title: String, species: &str, borough: &str) -> Figure {
    Figure {
        data: Vec::new(),
        layout: Layout {
            title: Title::new(title),
            xaxis: Axis::hidden(),
            yaxis: Axis::hidden(),
            annotations: vec![Annotation {
                text: format!("No data for {} in {}", species, borough),
                showarrow: false,
                xref: "paper".to_string(),
                yref: "paper".to_string(),
                x: 0.5,
                y: 0.5,
            }],
            ..Layout::default()
        },
    }
}
