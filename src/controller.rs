//! Reactive wiring between the two page inputs and the two health charts.
//!
//! The dependency graph is plain data: each binding names the output it
//! renders, the inputs it listens to, and a pure render function. A change
//! to an input re-renders every binding that lists it, against the full
//! in-memory tables.

use crate::charts::{self, Figure};
use crate::types::DashboardData;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_BOROUGH: &str = "Manhattan";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputId {
    #[serde(rename = "species-dropdown")]
    SpeciesDropdown,
    #[serde(rename = "nyc-county-map")]
    MapHover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputId {
    #[serde(rename = "health-graph")]
    HealthGraph,
    #[serde(rename = "steward-graph")]
    StewardGraph,
}

impl InputId {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputId::SpeciesDropdown => "species-dropdown",
            InputId::MapHover => "nyc-county-map",
        }
    }
}

impl OutputId {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputId::HealthGraph => "health-graph",
            OutputId::StewardGraph => "steward-graph",
        }
    }
}

/// Plotly hover payload. Only `customdata` of the first point is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverData {
    pub points: Vec<HoverPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverPoint {
    #[serde(default)]
    pub customdata: Vec<Value>,
}

impl HoverData {
    pub fn for_borough(borough: &str, count: u64) -> Self {
        Self {
            points: vec![HoverPoint { customdata: vec![Value::from(borough), Value::from(count)] }],
        }
    }

    pub fn borough(&self) -> Result<&str> {
        self.points
            .first()
            .and_then(|p| p.customdata.first())
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("hover data carries no borough name"))
    }
}

impl Default for HoverData {
    fn default() -> Self {
        // No real count is known before the first hover.
        Self::for_borough(DEFAULT_BOROUGH, 0)
    }
}

/// Current value of every input, as the page holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub species: String,
    #[serde(default)]
    pub hover_data: HoverData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub species: String,
    pub borough: String,
}

impl InputState {
    pub fn selection(&self) -> Result<Selection> {
        Ok(Selection {
            species: self.species.clone(),
            borough: self.hover_data.borough()?.to_string(),
        })
    }
}

pub struct Binding {
    pub output: OutputId,
    pub inputs: &'static [InputId],
    pub render: fn(&DashboardData, &Selection) -> Figure,
}

pub static GRAPH: [Binding; 2] = [
    Binding {
        output: OutputId::HealthGraph,
        inputs: &[InputId::SpeciesDropdown, InputId::MapHover],
        render: render_health,
    },
    Binding {
        output: OutputId::StewardGraph,
        inputs: &[InputId::SpeciesDropdown, InputId::MapHover],
        render: render_steward,
    },
];

fn render_health(data: &DashboardData, selection: &Selection) -> Figure {
    let rows = data.health_rows_for(&selection.species, &selection.borough);
    charts::build_health_bar(&rows, &selection.species, &selection.borough)
}

fn render_steward(data: &DashboardData, selection: &Selection) -> Figure {
    let rows = data.steward_rows_for(&selection.species, &selection.borough);
    charts::build_steward_bar(&rows, &selection.species, &selection.borough)
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputUpdate {
    pub id: OutputId,
    pub figure: Figure,
}

#[derive(Clone)]
pub struct Controller {
    data: Arc<DashboardData>,
    graph: &'static [Binding],
}

impl Controller {
    pub fn new(data: Arc<DashboardData>) -> Self {
        Self { data, graph: &GRAPH }
    }

    pub fn data(&self) -> &DashboardData {
        &self.data
    }

    /// First species of the loaded list, hovering Manhattan.
    pub fn initial_state(&self) -> InputState {
        InputState {
            species: self.data.species.first().cloned().unwrap_or_default(),
            hover_data: HoverData::default(),
        }
    }

    pub fn render_all(&self, state: &InputState) -> Result<Vec<OutputUpdate>> {
        self.render(state, |_| true)
    }

    /// Re-renders every output that depends on `changed`.
    pub fn dispatch(&self, state: &InputState, changed: InputId) -> Result<Vec<OutputUpdate>> {
        self.render(state, |binding| binding.inputs.contains(&changed))
    }

    fn render(
        &self,
        state: &InputState,
        wanted: impl Fn(&Binding) -> bool,
    ) -> Result<Vec<OutputUpdate>> {
        let selection = state.selection()?;
        Ok(self
            .graph
            .iter()
            .filter(|binding| wanted(*binding))
            .map(|binding| OutputUpdate {
                id: binding.output,
                figure: (binding.render)(&self.data, &selection),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SpeciesHealthByStewardRow, SpeciesHealthRow};

    fn health(species: &str, borough: &str, good: f64) -> SpeciesHealthRow {
        SpeciesHealthRow {
            spc_common: species.to_string(),
            boroname: borough.to_string(),
            count_tree_id: 10,
            good_health: 0,
            fair_health: 0,
            poor_health: 0,
            percent_good_health: good,
            percent_fair_health: 100.0 - good,
            percent_poor_health: 0.0,
        }
    }

    fn steward(species: &str, borough: &str, steward: &str) -> SpeciesHealthByStewardRow {
        SpeciesHealthByStewardRow {
            spc_common: species.to_string(),
            boroname: borough.to_string(),
            steward: steward.to_string(),
            count_tree_id: 5,
            percent_good_health: 60.0,
            percent_fair_health: 30.0,
            percent_poor_health: 10.0,
        }
    }

    fn controller() -> Controller {
        let data = DashboardData::new(
            Vec::new(),
            vec![
                health("American linden", "Manhattan", 70.0),
                health("London planetree", "Queens", 80.0),
                health("London planetree", "Brooklyn", 75.0),
                health("ginkgo", "Queens", 90.0),
            ],
            vec![
                steward("London planetree", "Queens", "None"),
                steward("London planetree", "Queens", "1or2"),
                steward("London planetree", "Brooklyn", "None"),
                steward("ginkgo", "Queens", "3or4"),
            ],
        );
        Controller::new(Arc::new(data))
    }

    fn figure_json(update: &OutputUpdate) -> Value {
        serde_json::to_value(&update.figure).unwrap()
    }

    #[test]
    fn initial_state_uses_first_species_and_manhattan() {
        let controller = controller();
        let state = controller.initial_state();
        assert_eq!(state.species, "American linden");
        assert_eq!(state.hover_data.borough().unwrap(), "Manhattan");
        assert_eq!(state.hover_data.points[0].customdata[1], 0);

        let outputs = controller.render_all(&state).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(figure_json(&outputs[0])["data"][0]["y"][0], 70.0);
    }

    #[test]
    fn every_input_change_refreshes_both_outputs() {
        let controller = controller();
        let state = controller.initial_state();
        for changed in [InputId::SpeciesDropdown, InputId::MapHover] {
            let updates = controller.dispatch(&state, changed).unwrap();
            let ids: Vec<_> = updates.iter().map(|u| u.id).collect();
            assert_eq!(ids, [OutputId::HealthGraph, OutputId::StewardGraph]);
        }
    }

    #[test]
    fn selection_filters_both_tables_to_the_pair() {
        let controller = controller();
        let state = InputState {
            species: "London planetree".to_string(),
            hover_data: HoverData::for_borough("Queens", 250_551),
        };
        let selection = state.selection().unwrap();
        assert_eq!(selection.borough, "Queens");

        let data = controller.data();
        let health = data.health_rows_for(&selection.species, &selection.borough);
        let stewards = data.steward_rows_for(&selection.species, &selection.borough);
        assert_eq!(health.len(), 1);
        assert_eq!(stewards.len(), 2);
        let planetree_in_queens = |species: &str, borough: &str| {
            species == "London planetree" && borough == "Queens"
        };
        assert!(health.iter().all(|r| planetree_in_queens(&r.spc_common, &r.boroname)));
        assert!(stewards.iter().all(|r| planetree_in_queens(&r.spc_common, &r.boroname)));

        let outputs = controller.dispatch(&state, InputId::MapHover).unwrap();
        let health_fig = figure_json(&outputs[0]);
        let steward_fig = figure_json(&outputs[1]);
        assert_eq!(health_fig["data"][0]["y"][0], 80.0);
        assert_eq!(
            health_fig["layout"]["title"]["text"],
            "Health Status of London planetree in Queens"
        );
        assert_eq!(steward_fig["data"][0]["x"], serde_json::json!(["None", "1or2"]));
    }

    #[test]
    fn unknown_pair_renders_no_data_instead_of_failing() {
        let controller = controller();
        let state = InputState {
            species: "ginkgo".to_string(),
            hover_data: HoverData::for_borough("Staten Island", 0),
        };
        let outputs = controller.render_all(&state).unwrap();
        for update in &outputs {
            let figure = figure_json(update);
            assert!(figure["data"].as_array().unwrap().is_empty());
        }
    }

    #[test]
    fn hover_without_borough_is_rejected() {
        let controller = controller();
        let state = InputState {
            species: "ginkgo".to_string(),
            hover_data: HoverData { points: Vec::new() },
        };
        assert!(controller.render_all(&state).is_err());

        let numeric: HoverData =
            serde_json::from_str(r#"{"points":[{"customdata":[3, "Queens"]}]}"#).unwrap();
        assert!(numeric.borough().is_err());
    }

    #[test]
    fn decodes_plotly_hover_payload() {
        let state: InputState = serde_json::from_str(
            r#"{"species":"ginkgo",
                "hover_data":{"points":[{"curveNumber":0,"pointNumber":3,"location":"3",
                                         "customdata":["Queens",250551]}]}}"#,
        )
        .unwrap();
        assert_eq!(state.selection().unwrap().borough, "Queens");

        let defaulted: InputState = serde_json::from_str(r#"{"species":"ginkgo"}"#).unwrap();
        assert_eq!(defaulted.hover_data.borough().unwrap(), DEFAULT_BOROUGH);
    }

    #[test]
    fn ids_match_page_element_ids() {
        assert_eq!(serde_json::to_value(OutputId::HealthGraph).unwrap(), "health-graph");
        assert_eq!(serde_json::to_value(InputId::MapHover).unwrap(), InputId::MapHover.as_str());
        let changed: InputId = serde_json::from_str(r#""species-dropdown""#).unwrap();
        assert_eq!(changed, InputId::SpeciesDropdown);
    }
}
