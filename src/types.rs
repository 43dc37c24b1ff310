use geo::MultiPolygon;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoroughTreeCount {
    pub boroname: String,
    #[serde(deserialize_with = "de::u64_lenient")]
    pub count_tree_id: u64,
}

#[derive(Debug, Clone)]
pub struct BoroughGeometry {
    // County identifier as the census reports it, e.g. "Kings County, New York"
    pub name: String,
    pub county_fips: String,
    pub population: Option<u64>,
    pub geometry: MultiPolygon<f64>,
    pub boroname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JoinedBorough {
    pub boroname: String,
    pub county_name: String,
    pub population: Option<u64>,
    pub count_tree_id: u64,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeciesHealthRow {
    pub spc_common: String,
    pub boroname: String,
    #[serde(deserialize_with = "de::u64_lenient")]
    pub count_tree_id: u64,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub good_health: u64,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub fair_health: u64,
    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub poor_health: u64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub percent_good_health: f64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub percent_fair_health: f64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub percent_poor_health: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeciesHealthByStewardRow {
    pub spc_common: String,
    pub boroname: String,
    // Socrata omits the key when the grouped value is null.
    #[serde(default = "unknown_steward")]
    pub steward: String,
    #[serde(deserialize_with = "de::u64_lenient")]
    pub count_tree_id: u64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub percent_good_health: f64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub percent_fair_health: f64,
    #[serde(deserialize_with = "de::f64_lenient")]
    pub percent_poor_health: f64,
}

fn unknown_steward() -> String {
    "Unknown".to_string()
}

/// Every table the dashboard renders from, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub boroughs: Vec<JoinedBorough>,
    pub health: Vec<SpeciesHealthRow>,
    pub steward_health: Vec<SpeciesHealthByStewardRow>,
    pub species: Vec<String>,
}

impl DashboardData {
    pub fn new(
        boroughs: Vec<JoinedBorough>,
        health: Vec<SpeciesHealthRow>,
        steward_health: Vec<SpeciesHealthByStewardRow>,
    ) -> Self {
        let species = distinct_species(&health);
        Self { boroughs, health, steward_health, species }
    }

    pub fn health_rows_for<'a>(
        &'a self,
        species: &str,
        borough: &str,
    ) -> Vec<&'a SpeciesHealthRow> {
        self.health
            .iter()
            .filter(|r| r.spc_common == species && r.boroname == borough)
            .collect()
    }

    pub fn steward_rows_for<'a>(
        &'a self,
        species: &str,
        borough: &str,
    ) -> Vec<&'a SpeciesHealthByStewardRow> {
        self.steward_health
            .iter()
            .filter(|r| r.spc_common == species && r.boroname == borough)
            .collect()
    }
}

/// Distinct species in first-seen order.
pub fn distinct_species(rows: &[SpeciesHealthRow]) -> Vec<String> {
    let mut species: Vec<String> = Vec::new();
    for row in rows {
        if !species.contains(&row.spc_common) {
            species.push(row.spc_common.clone());
        }
    }
    species
}

// Socrata serialises every aggregate as a JSON string; fixtures and other
// endpoints use plain numbers.
mod de {
    use super::*;
    use serde::de::Error;
    use serde_json::Value;

    pub fn u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                // Whole floats such as 3.0 are fine; 3.7 is not a count.
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                        .map(|f| f as u64)
                })
                .ok_or_else(|| D::Error::custom(format!("expected a count, got {}", n))),
            Value::String(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| D::Error::custom(format!("invalid count {:?}: {}", s, e))),
            other => Err(D::Error::custom(format!("expected a count, got {}", other))),
        }
    }

    pub fn f64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", n))),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| D::Error::custom(format!("invalid number {:?}: {}", s, e))),
            other => Err(D::Error::custom(format!("expected a number, got {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_socrata_string_encoded_numbers() {
        let rows: Vec<SpeciesHealthRow> = serde_json::from_str(
            r#"[{"spc_common":"London planetree","boroname":"Queens","count_tree_id":"31111",
                 "good_health":"24000","fair_health":"5000","poor_health":"2111",
                 "percent_poor_health":"6.79","percent_fair_health":"16.07",
                 "percent_good_health":"77.14"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].count_tree_id, 31111);
        assert_eq!(rows[0].poor_health, 2111);
        assert_eq!(rows[0].percent_good_health, 77.14);
    }

    #[test]
    fn missing_steward_becomes_unknown() {
        let rows: Vec<SpeciesHealthByStewardRow> = serde_json::from_str(
            r#"[{"spc_common":"ginkgo","boroname":"Bronx","count_tree_id":3,
                 "percent_poor_health":0,"percent_fair_health":0,"percent_good_health":100}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].steward, "Unknown");
        assert_eq!(rows[0].percent_good_health, 100.0);
    }

    #[test]
    fn rejects_non_numeric_counts() {
        let result: Result<Vec<BoroughTreeCount>, _> =
            serde_json::from_str(r#"[{"boroname":"Queens","count_tree_id":"many"}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn fractional_counts_are_rejected() {
        let fractional: Result<Vec<BoroughTreeCount>, _> =
            serde_json::from_str(r#"[{"boroname":"Queens","count_tree_id":3.7}]"#);
        assert!(fractional.is_err());

        let negative: Result<Vec<BoroughTreeCount>, _> =
            serde_json::from_str(r#"[{"boroname":"Queens","count_tree_id":-1}]"#);
        assert!(negative.is_err());

        let whole: Vec<BoroughTreeCount> =
            serde_json::from_str(r#"[{"boroname":"Queens","count_tree_id":3.0}]"#).unwrap();
        assert_eq!(whole[0].count_tree_id, 3);
    }

    #[test]
    fn species_list_keeps_first_seen_order() {
        let row = |species: &str, borough: &str| SpeciesHealthRow {
            spc_common: species.to_string(),
            boroname: borough.to_string(),
            count_tree_id: 1,
            good_health: 1,
            fair_health: 0,
            poor_health: 0,
            percent_good_health: 100.0,
            percent_fair_health: 0.0,
            percent_poor_health: 0.0,
        };
        let rows =
            vec![row("ginkgo", "Bronx"), row("American elm", "Bronx"), row("ginkgo", "Queens")];
        assert_eq!(distinct_species(&rows), vec!["ginkgo", "American elm"]);
    }
}
