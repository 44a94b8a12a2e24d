use ipclayout::{
    ParserSession,
    report::{layout_report, schema_report},
};
use serde_json::json;

const LEGACY_SCHEMA: &[u8] =
    include_bytes!("../../ipclayout-core/tests/fixtures/legacy_schema.bin");
const LEGACY_BATCH: &[u8] =
    include_bytes!("../../ipclayout-core/tests/fixtures/legacy_batch.bin");
const MODERN_SCHEMA: &[u8] =
    include_bytes!("../../ipclayout-core/tests/fixtures/modern_schema.bin");
const MODERN_BATCH: &[u8] =
    include_bytes!("../../ipclayout-core/tests/fixtures/modern_batch.bin");

#[test]
fn schema_report_lists_fields_and_dictionaries() {
    let session = ParserSession::open(LEGACY_SCHEMA);
    let report = schema_report(session.schema().unwrap(), session.dictionaries().unwrap()).unwrap();

    let fields = report["schema"]["fields"].as_array().unwrap();
    let names: Vec<&str> = fields.iter().map(|f| f["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["idx", "name", "weight"]);
    assert_eq!(
        fields[0]["type"],
        json!({"name": "int", "bitWidth": 32, "isSigned": true})
    );
    assert_eq!(
        fields[2]["type"],
        json!({"name": "floatingpoint", "precision": "DOUBLE"})
    );
    assert_eq!(fields[1]["type"], json!({"name": "utf8"}));
    assert_eq!(fields[1]["dictionary"]["id"], json!(1));
    assert!(fields[0].get("dictionary").is_none());

    let dictionaries = report["dictionaries"].as_array().unwrap();
    assert_eq!(dictionaries.len(), 1);
    assert_eq!(dictionaries[0]["id"], fields[1]["dictionary"]["id"]);
    assert_eq!(dictionaries[0]["data"]["count"], json!(4));
    assert_eq!(
        dictionaries[0]["data"]["columns"][0]["DATA"],
        json!(["orange", "apple", "pear", "grape"])
    );
}

#[test]
fn schema_report_carries_custom_metadata() {
    let session = ParserSession::open(MODERN_SCHEMA);
    let report = schema_report(session.schema().unwrap(), session.dictionaries().unwrap()).unwrap();
    assert_eq!(
        report["schema"]["metadata"],
        json!([{"key": "origin", "value": "fixture"}])
    );
    assert_eq!(report["dictionaries"], json!([]));
}

#[test]
fn layout_report_matches_bound_layout() {
    let mut session = ParserSession::open(LEGACY_SCHEMA);
    session.bind_batch(LEGACY_BATCH).unwrap();
    let report = layout_report(session.layout().unwrap()).unwrap();

    assert_eq!(
        report[0],
        json!({
            "name": "idx",
            "dtype": {"name": "INT32"},
            "length": 30,
            "null_count": 0,
            "data_buffer": {"offset": 0, "length": 128},
        })
    );
    assert_eq!(report[1]["dtype"]["name"], "DICTIONARY");
    assert_eq!(report[1]["dictionary_id"], 1);
    assert_eq!(report[2]["dtype"]["name"], "DOUBLE");
    assert_eq!(report[2]["data_buffer"]["offset"], 256);
}

#[test]
fn layout_report_includes_optional_buffers() {
    let mut session = ParserSession::open(MODERN_SCHEMA);
    session.bind_batch(MODERN_BATCH).unwrap();
    let report = layout_report(session.layout().unwrap()).unwrap();

    let label = &report[3];
    assert_eq!(label["dtype"]["name"], "STRING");
    assert_eq!(label["null_count"], 2);
    assert_eq!(label["validity_buffer"], json!({"offset": 88, "length": 1}));
    assert_eq!(label["offsets_buffer"], json!({"offset": 96, "length": 24}));
    assert_eq!(label["data_buffer"], json!({"offset": 120, "length": 4}));
}
