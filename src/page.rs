//! The single dashboard page.

use crate::controller::{InputId, InputState, OutputId};

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";
const DATA_SOURCE: &str =
    "https://data.cityofnewyork.us/Environment/2015-Street-Tree-Census-Tree-Data/uvpi-gqnh";

pub fn render_index(species: &[String], initial: &InputState) -> String {
    let options = species
        .iter()
        .map(|s| {
            let selected = if *s == initial.species { " selected" } else { "" };
            format!(
                r#"<option value="{v}"{selected}>{v}</option>"#,
                v = escape_html(s),
                selected = selected
            )
        })
        .collect::<Vec<_>>()
        .join("\n                ");

    // Inline JSON must not be able to close its script element.
    let initial_json = serde_json::to_string(initial)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Tree Health in NYC</title>
    <link rel="stylesheet" href="/static/style.css">
    <script src="{plotly}"></script>
</head>
<body>
    <h1>Tree Health in NYC</h1>
    <div class="panel left">
        <h5>Instructions:</h5>
        <p>Select borough by hovering over map area, select tree species from drop-down.</p>
        <div id="{map_id}" class="graph"></div>
        <h5>Select Tree Species:</h5>
        <select id="{dropdown_id}">
                {options}
        </select>
        <p class="source"><strong>Data Source:</strong>
            <a href="{source}" target="_blank">NYC Open Data - 2015 Street Tree Census</a></p>
    </div>
    <div class="panel right">
        <div id="{health_id}" class="graph"></div>
        <div id="{steward_id}" class="graph"></div>
    </div>
    <script type="application/json" id="initial-state">{initial_json}</script>
    <script src="/static/app.js"></script>
</body>
</html>"#,
        plotly = PLOTLY_JS,
        map_id = InputId::MapHover.as_str(),
        dropdown_id = InputId::SpeciesDropdown.as_str(),
        options = options,
        source = DATA_SOURCE,
        health_id = OutputId::HealthGraph.as_str(),
        steward_id = OutputId::StewardGraph.as_str(),
        initial_json = initial_json,
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
