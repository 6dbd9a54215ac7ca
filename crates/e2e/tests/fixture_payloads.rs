//! Built-in contracts against recorded API payload shapes.

use serde_json::{json, Value};
use test_case::test_case;

use supplyhub_contract::Keyword;
use supplyhub_e2e::SchemaCatalog;

fn catalog() -> SchemaCatalog {
    SchemaCatalog::builtin().expect("built-in fixtures compile")
}

fn facility_feature() -> Value {
    json!({
        "id": "BD2020083TF7FC7",
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [90.4125, 23.8103]},
        "properties": {
            "name": "Dhaka Knitwear Ltd.",
            "address": "Plot 12, Tongi Industrial Area, Gazipur",
            "country_code": "BD",
            "country_name": "Bangladesh",
            "os_id": "BD2020083TF7FC7",
            "country_code_alpha3": "BGD",
            "other_names": ["Dhaka Knitwear"],
            "other_addresses": [],
            "contributors": [
                {"id": 44, "name": "Brand A (Supplier List 2023)", "is_verified": true, "list_name": null}
            ],
            "sector": ["Apparel"]
        }
    })
}

#[test_case("facilities-count", json!({"count": 120_394}) ; "facility count")]
#[test_case("workers-ranges", json!(["Less than 1000", "1001-5000", "5001-10000", "More than 10000"]) ; "worker ranges")]
#[test_case("parent-companies", json!([[12, "Brand A"], ["external", "Group B"]]) ; "parent companies")]
#[test_case("facility-processing-types", json!([
    {"facilityType": "Final Product Assembly", "processingTypes": ["Sewing", "Cutting"]},
    {"facilityType": "Raw Material Processing or Production", "processingTypes": []}
]) ; "processing types")]
#[test_case("moderation-events-merge", json!([{
    "current_id": "BD2020083TF7FC7",
    "original_id": "BD2021154ZR1PQ9",
    "created_at": "2024-03-18T09:21:44.512Z",
    "merge_date": "2024-03-19T10:00:00+00:00"
}]) ; "moderation merges")]
#[test_case("unauthorized", json!({"detail": "Invalid token."}) ; "unauthorized")]
fn recorded_payload_conforms(fixture: &str, body: Value) {
    let result = catalog().check(fixture, &body).unwrap();
    assert!(result.is_valid(), "{:?}", result.violations());
}

#[test]
fn facility_detail_conforms() {
    catalog().assert_valid("facilities-by-id", &facility_feature()).unwrap();
}

#[test]
fn facility_detail_reports_every_contributor_problem() {
    let mut feature = facility_feature();
    feature["properties"]["contributors"] = json!([
        {"id": "44", "name": "Brand A"},
        {"is_verified": true, "score": 3}
    ]);

    let result = catalog().check("facilities-by-id", &feature).unwrap();
    let mut found: Vec<(String, Keyword)> = result
        .violations()
        .iter()
        .map(|v| (v.path.clone(), v.keyword))
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        found,
        vec![
            ("/properties/contributors/0/id".to_string(), Keyword::Type),
            ("/properties/contributors/1/name".to_string(), Keyword::Required),
            ("/properties/contributors/1/score".to_string(), Keyword::AdditionalProperties),
        ]
    );
}

#[test]
fn facility_collection_flags_broken_geometry_and_links() {
    let body = json!({
        "type": "FeatureCollection",
        "count": 1,
        "next": "not a url",
        "previous": null,
        "features": [{
            "id": "CN2019303BQ3FZP",
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [120.596]},
            "properties": {
                "name": "Jiangsu Textile Co.",
                "address": "No. 8 Industrial Road, Nantong",
                "country_code": "CN",
                "os_id": "CN2019303BQ3FZP",
                "country_name": "China",
                "has_approved_claim": "no",
                "is_closed": false
            }
        }]
    });

    let result = catalog().check("facilities", &body).unwrap();
    let keywords: Vec<Keyword> = result.violations().iter().map(|v| v.keyword).collect();
    assert_eq!(keywords.len(), 3, "{:?}", result.violations());
    assert!(keywords.contains(&Keyword::Format));
    assert!(keywords.contains(&Keyword::MinItems));
    assert!(keywords.contains(&Keyword::Type));
}

#[test]
fn downloads_rows_accept_mixed_scalars_only() {
    let body = json!({
        "count": 2,
        "next": "https://opensupplyhub.org/api/facilities-downloads/?page=2",
        "previous": null,
        "results": {
            "headers": ["os_id", "number_of_workers", "is_closed", "sector"],
            "rows": [
                ["CN2019303BQ3FZP", 1200, false, "Apparel"],
                ["BD2020083TF7FC7", null, true, {"nested": "object"}]
            ]
        }
    });

    let result = catalog().check("facilities-downloads", &body).unwrap();
    let violations = result.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].path, "/results/rows/1/3");
    assert_eq!(violations[0].keyword, Keyword::Type);
}
