use crate::types::{BoroughGeometry, BoroughTreeCount, JoinedBorough};
use std::collections::HashMap;
use tracing::warn;

/// Census county name → borough. `None` for anything outside the five counties.
pub fn borough_for_county(county: &str) -> Option<&'static str> {
    match county {
        "Bronx County, New York" => Some("Bronx"),
        "Kings County, New York" => Some("Brooklyn"),
        "New York County, New York" => Some("Manhattan"),
        "Richmond County, New York" => Some("Staten Island"),
        "Queens County, New York" => Some("Queens"),
        _ => None,
    }
}

pub fn assign_boroughs(areas: &mut [BoroughGeometry]) {
    for area in areas.iter_mut() {
        area.boroname = borough_for_county(&area.name).map(str::to_string);
        if area.boroname.is_none() {
            warn!("County {:?} does not map to a borough", area.name);
        }
    }
}

/// Inner join on borough name. Rows missing on either side are dropped.
pub fn join_tree_counts(
    areas: Vec<BoroughGeometry>,
    counts: &[BoroughTreeCount],
) -> Vec<JoinedBorough> {
    let counts_by_borough: HashMap<&str, u64> = counts
        .iter()
        .map(|c| (c.boroname.as_str(), c.count_tree_id))
        .collect();

    let mut joined = Vec::new();

    for area in areas {
        let Some(boroname) = area.boroname else {
            continue;
        };
        match counts_by_borough.get(boroname.as_str()) {
            Some(&count_tree_id) => joined.push(JoinedBorough {
                boroname,
                county_name: area.name,
                population: area.population,
                count_tree_id,
                geometry: area.geometry,
            }),
            None => warn!("No tree count for borough {:?}, dropping it from the map", boroname),
        }
    }

    for count in counts {
        if !joined.iter().any(|j| j.boroname == count.boroname) {
            warn!("Tree count for {:?} has no matching geometry", count.boroname);
        }
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    const BOROUGHS: [&str; 5] = ["Bronx", "Brooklyn", "Manhattan", "Staten Island", "Queens"];

    const COUNTIES: [&str; 5] = [
        "Bronx County, New York",
        "Kings County, New York",
        "New York County, New York",
        "Richmond County, New York",
        "Queens County, New York",
    ];

    fn square() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]])
    }

    fn geometry(name: &str) -> BoroughGeometry {
        BoroughGeometry {
            name: name.to_string(),
            county_fips: String::new(),
            population: None,
            geometry: square(),
            boroname: None,
        }
    }

    fn counts() -> Vec<BoroughTreeCount> {
        BOROUGHS
            .iter()
            .zip([85_203_u64, 177_293, 65_423, 105_318, 250_551])
            .map(|(b, n)| BoroughTreeCount { boroname: b.to_string(), count_tree_id: n })
            .collect()
    }

    #[test]
    fn maps_each_county_to_its_borough() {
        for (county, borough) in COUNTIES.iter().zip(BOROUGHS) {
            assert_eq!(borough_for_county(county), Some(borough));
        }
        assert_eq!(borough_for_county("Kings County, New York"), Some("Brooklyn"));
    }

    #[test]
    fn unknown_county_gets_no_borough() {
        assert_eq!(borough_for_county("Nassau County, New York"), None);
        assert_eq!(borough_for_county("kings county, new york"), None);
        assert_eq!(borough_for_county(" Kings County, New York"), None);
    }

    #[test]
    fn joins_all_five_boroughs() {
        let mut areas: Vec<_> = COUNTIES.iter().map(|c| geometry(c)).collect();
        assign_boroughs(&mut areas);
        let joined = join_tree_counts(areas, &counts());
        assert_eq!(joined.len(), 5);

        let queens = joined.iter().find(|j| j.boroname == "Queens").unwrap();
        assert_eq!(queens.count_tree_id, 250_551);
        assert_eq!(queens.county_name, "Queens County, New York");
    }

    #[test]
    fn unmapped_county_is_dropped_from_join() {
        let mut areas: Vec<_> = COUNTIES.iter().map(|c| geometry(c)).collect();
        areas[1].name = "Kings County (Brooklyn), New York".to_string();
        assign_boroughs(&mut areas);
        assert!(areas[1].boroname.is_none());

        let joined = join_tree_counts(areas, &counts());
        assert_eq!(joined.len(), 4);
        assert!(joined.iter().all(|j| j.boroname != "Brooklyn"));
    }

    #[test]
    fn missing_count_is_dropped_from_join() {
        let mut areas: Vec<_> = COUNTIES.iter().map(|c| geometry(c)).collect();
        assign_boroughs(&mut areas);
        let mut counts = counts();
        counts.retain(|c| c.boroname != "Manhattan");

        let joined = join_tree_counts(areas, &counts);
        assert_eq!(joined.len(), 4);
    }
}
