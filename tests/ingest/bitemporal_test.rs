mod common;

use common::{datasets, options, staging, staging_named, TestDb};
use milestone::dataset::{Dataset, Datasets, Field, FieldValue};
use milestone::ingest_mode::{
    BitemporalDelta, BitemporalSnapshot, IngestMode, MergeStrategy, TransactionMilestoning,
    ValidityDerivation, ValidityMilestoning, INFINITE_BATCH_ID, INFINITE_BATCH_TIME,
};
use milestone::planner::StatisticName;
use milestone::sql::DataType;
use serde_json::{json, Value};

fn transaction() -> TransactionMilestoning {
    TransactionMilestoning::batch_id("batch_id_in", "batch_id_out").unwrap()
}

fn from_and_thru() -> ValidityMilestoning {
    ValidityMilestoning::new(
        "valid_from",
        "valid_through",
        ValidityDerivation::SourceSpecifiesFromAndThruDateTime {
            source_from: "start".into(),
            source_thru: "end".into(),
        },
    )
    .unwrap()
}

fn from_only() -> ValidityMilestoning {
    ValidityMilestoning::new(
        "valid_from",
        "valid_through",
        ValidityDerivation::SourceSpecifiesFromDateTime {
            source_from: "start".into(),
        },
    )
    .unwrap()
}

fn fields(with_end: bool) -> Vec<Field> {
    let mut fields = vec![
        Field::new("id", DataType::Int32).primary_key(),
        Field::new("name", DataType::Varchar(64)),
        Field::new("start", DataType::Timestamp),
    ];
    if with_end {
        fields.push(Field::new("end", DataType::Timestamp));
    }
    fields.push(Field::new("op", DataType::Varchar(1)));
    fields
}

const OPEN_ROWS: &str = "SELECT \"id\", \"name\", \"valid_from\", \"valid_through\" FROM \"main\" \
                         WHERE \"batch_id_out\" = 999999999 ORDER BY \"id\", \"valid_from\"";

#[test]
fn test_delta_splits_an_interval_in_three() {
    let db = TestDb::new("bitemporal_three_rows");
    let mode = IngestMode::BitemporalDelta(
        BitemporalDelta::new("digest", transaction(), from_and_thru()).unwrap(),
    );

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(
            &fields(true),
            json!([{"id": 1, "name": "a", "start": "2000-01-01 00:00:00", "end": INFINITE_BATCH_TIME}]),
        ),
    )
    .unwrap();
    let second = db
        .ingest(
            &mode,
            "2000-02-01 00:00:00",
            &datasets(
                &fields(true),
                json!([{"id": 1, "name": "b", "start": "2000-06-01 00:00:00", "end": "2000-09-01 00:00:00"}]),
            ),
        )
        .unwrap();

    assert_eq!(second.batch_id, Some(2));
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 2);
    assert_eq!(second.statistics[&StatisticName::RowsUpdated], 1);
    assert_eq!(second.statistics[&StatisticName::RowsTerminated], 0);

    assert_eq!(
        db.select(OPEN_ROWS),
        json!([
            {"id": 1, "name": "a", "valid_from": "2000-01-01 00:00:00", "valid_through": "2000-06-01 00:00:00"},
            {"id": 1, "name": "b", "valid_from": "2000-06-01 00:00:00", "valid_through": "2000-09-01 00:00:00"},
            {"id": 1, "name": "a", "valid_from": "2000-09-01 00:00:00", "valid_through": INFINITE_BATCH_TIME},
        ])
    );
    // The replaced version is kept, closed by the first batch
    assert_eq!(
        db.select(
            "SELECT \"valid_from\", \"valid_through\", \"batch_id_in\", \"batch_id_out\" \
             FROM \"main\" WHERE \"batch_id_out\" <> 999999999"
        ),
        json!([{
            "valid_from": "2000-01-01 00:00:00",
            "valid_through": INFINITE_BATCH_TIME,
            "batch_id_in": 1,
            "batch_id_out": 1,
        }])
    );
    // Working tables are emptied at the end of the batch
    assert_eq!(db.count("main_temp"), 0);
    assert_eq!(db.count("main_stage_work"), 0);
}

#[test]
fn test_delta_from_only_derives_validity_end() {
    let db = TestDb::new("bitemporal_from_only");
    let mode = IngestMode::BitemporalDelta(
        BitemporalDelta::new("digest", transaction(), from_only()).unwrap(),
    );
    let pass = |batch_start: &str, name: &str, start: &str| {
        db.ingest(
            &mode,
            batch_start,
            &datasets(&fields(false), json!([{"id": 1, "name": name, "start": start}])),
        )
        .unwrap()
    };

    pass("2000-01-01 00:00:00", "a", "2000-01-01 00:00:00");
    pass("2000-01-02 00:00:00", "b", "2000-06-01 00:00:00");
    // Back-dated correction ends where the next known version starts
    pass("2000-01-03 00:00:00", "c", "2000-03-01 00:00:00");

    assert_eq!(
        db.select(OPEN_ROWS),
        json!([
            {"id": 1, "name": "a", "valid_from": "2000-01-01 00:00:00", "valid_through": "2000-03-01 00:00:00"},
            {"id": 1, "name": "c", "valid_from": "2000-03-01 00:00:00", "valid_through": "2000-06-01 00:00:00"},
            {"id": 1, "name": "b", "valid_from": "2000-06-01 00:00:00", "valid_through": INFINITE_BATCH_TIME},
        ])
    );
}

#[test]
fn test_delta_delete_cuts_interval() {
    let db = TestDb::new("bitemporal_delete");
    let mode = IngestMode::BitemporalDelta(
        BitemporalDelta::new("digest", transaction(), from_and_thru())
            .unwrap()
            .with_merge_strategy(
                MergeStrategy::delete_indicator("op", vec![FieldValue::Text("D".into())]).unwrap(),
            ),
    );

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(
            &fields(true),
            json!([{"id": 1, "name": "a", "start": "2000-01-01 00:00:00", "end": INFINITE_BATCH_TIME}]),
        ),
    )
    .unwrap();
    let second = db
        .ingest(
            &mode,
            "2000-01-02 00:00:00",
            &datasets(
                &fields(true),
                json!([{"id": 1, "name": "a", "start": "2000-06-01 00:00:00", "end": INFINITE_BATCH_TIME, "op": "D"}]),
            ),
        )
        .unwrap();

    assert_eq!(second.statistics[&StatisticName::RowsInserted], 0);
    assert_eq!(second.statistics[&StatisticName::RowsUpdated], 1);
    assert_eq!(
        db.select(OPEN_ROWS),
        json!([
            {"id": 1, "name": "a", "valid_from": "2000-01-01 00:00:00", "valid_through": "2000-06-01 00:00:00"},
        ])
    );
}

#[test]
fn test_snapshot_closes_intervals_missing_from_batch() {
    let db = TestDb::new("bitemporal_snapshot");
    let mode = IngestMode::BitemporalSnapshot(
        BitemporalSnapshot::new("digest", transaction(), from_and_thru()).unwrap(),
    );
    let snapshot_fields: Vec<Field> = fields(true)
        .into_iter()
        .filter(|f| f.name != "op")
        .collect();
    let row = |id: i64| {
        json!({"id": id, "name": "x", "start": "2000-01-01 00:00:00", "end": INFINITE_BATCH_TIME})
    };

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(&snapshot_fields, json!([row(1), row(2)])),
    )
    .unwrap();
    let second = db
        .ingest(
            &mode,
            "2000-01-02 00:00:00",
            &datasets(&snapshot_fields, json!([row(1)])),
        )
        .unwrap();

    assert_eq!(second.statistics[&StatisticName::RowsTerminated], 1);
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 0);
    assert_eq!(
        db.select("SELECT \"id\", \"batch_id_in\", \"batch_id_out\" FROM \"main\" ORDER BY \"id\""),
        json!([
            {"id": 1, "batch_id_in": 1, "batch_id_out": INFINITE_BATCH_ID},
            {"id": 2, "batch_id_in": 1, "batch_id_out": 1},
        ])
    );
}

fn day(n: u32) -> String {
    format!("2000-01-{:02} 00:00:00", n)
}

/// An open version of id 1; `thru` of `None` is unbounded.
fn version(name: &str, from: u32, thru: Option<u32>) -> Value {
    let thru = thru.map(day).unwrap_or_else(|| INFINITE_BATCH_TIME.to_string());
    json!({"id": 1, "name": name, "valid_from": day(from), "valid_through": thru})
}

fn interval(name: &str, from: u32, thru: Option<u32>) -> Value {
    let end = thru.map(day).unwrap_or_else(|| INFINITE_BATCH_TIME.to_string());
    json!({"id": 1, "name": name, "start": day(from), "end": end})
}

#[test]
fn test_delta_history_over_six_batches() {
    let db = TestDb::new("bitemporal_six_batches");
    let mode = IngestMode::BitemporalDelta(
        BitemporalDelta::new("digest", transaction(), from_and_thru())
            .unwrap()
            .with_merge_strategy(
                MergeStrategy::delete_indicator("op", vec![FieldValue::Text("D".into())]).unwrap(),
            ),
    );
    let pass = |batch: u32, rows: Value| {
        db.ingest(&mode, &format!("2000-02-{:02} 00:00:00", batch), &datasets(&fields(true), rows))
            .unwrap()
    };

    pass(1, json!([interval("a", 1, None)]));
    assert_eq!(db.select(OPEN_ROWS), json!([version("a", 1, None)]));

    pass(2, json!([interval("b", 3, Some(6))]));
    assert_eq!(
        db.select(OPEN_ROWS),
        json!([version("a", 1, Some(3)), version("b", 3, Some(6)), version("a", 6, None)])
    );

    // Covers all of b and the edges of both a pieces
    pass(3, json!([interval("c", 2, Some(7))]));
    assert_eq!(
        db.select(OPEN_ROWS),
        json!([version("a", 1, Some(2)), version("c", 2, Some(7)), version("a", 7, None)])
    );

    let mut delete = interval("a", 1, Some(2));
    delete["op"] = json!("D");
    pass(4, json!([delete]));
    assert_eq!(
        db.select(OPEN_ROWS),
        json!([version("c", 2, Some(7)), version("a", 7, None)])
    );

    // Two disjoint rows of one key, each punching a hole in a different version
    let holes = json!([interval("e", 4, Some(5)), interval("f", 8, Some(9))]);
    let fifth = pass(5, holes.clone());
    assert_eq!(fifth.batch_id, Some(5));
    let expected = json!([
        version("c", 2, Some(4)),
        version("e", 4, Some(5)),
        version("c", 5, Some(7)),
        version("a", 7, Some(8)),
        version("f", 8, Some(9)),
        version("a", 9, None),
    ]);
    assert_eq!(db.select(OPEN_ROWS), expected);
    let total = db.count("main");
    assert_eq!(total, 13);

    // Replaying the same batch changes nothing
    let replay = pass(6, holes);
    assert_eq!(replay.batch_id, Some(6));
    assert_eq!(replay.statistics[&StatisticName::IncomingRecordCount], 2);
    assert_eq!(replay.statistics[&StatisticName::RowsInserted], 0);
    assert_eq!(replay.statistics[&StatisticName::RowsUpdated], 0);
    assert_eq!(replay.statistics[&StatisticName::RowsTerminated], 0);
    assert_eq!(db.select(OPEN_ROWS), expected);
    assert_eq!(db.count("main"), total);
}

#[test]
fn test_delta_with_new_staging_column() {
    let db = TestDb::new("bitemporal_evolution");
    let mode = IngestMode::BitemporalDelta(
        BitemporalDelta::new("digest", transaction(), from_and_thru()).unwrap(),
    );
    let main = Dataset::definition(
        "main",
        vec![
            Field::new("id", DataType::Int32).primary_key(),
            Field::new("name", DataType::Varchar(64)),
            Field::new("digest", DataType::Varchar(64)),
            Field::new("valid_from", DataType::Timestamp).primary_key(),
            Field::new("valid_through", DataType::Timestamp),
            Field::new("batch_id_in", DataType::Int32).primary_key(),
            Field::new("batch_id_out", DataType::Int32),
        ],
    );
    let narrow: Vec<Field> = fields(true).into_iter().filter(|f| f.name != "op").collect();

    db.ingest(
        &mode,
        "2000-02-01 00:00:00",
        &Datasets::new(main.clone(), staging(&narrow, json!([interval("a", 1, None)]))),
    )
    .unwrap();

    let mut wide = narrow;
    wide.push(Field::new("email", DataType::Varchar(128)));
    let mut row = interval("b", 3, Some(6));
    row["email"] = json!("b@example.com");
    let second = db
        .ingest_with_options(
            &mode,
            options("2000-02-02 00:00:00").enable_schema_evolution(true),
            &Datasets::new(main, staging_named("staging_wide", &wide, json!([row]))),
        )
        .unwrap();

    assert_eq!(
        second.schema_evolution_sql.expect("evolution statements").statements(),
        ["ALTER TABLE \"main\" ADD COLUMN \"email\" VARCHAR(128)"]
    );
    assert_eq!(second.batch_id, Some(2));
    assert_eq!(
        db.select(
            "SELECT \"name\", \"email\", \"valid_from\", \"valid_through\" FROM \"main\" \
             WHERE \"batch_id_out\" = 999999999 ORDER BY \"valid_from\""
        ),
        json!([
            {"name": "a", "email": null, "valid_from": day(1), "valid_through": day(3)},
            {"name": "b", "email": "b@example.com", "valid_from": day(3), "valid_through": day(6)},
            {"name": "a", "email": null, "valid_from": day(6), "valid_through": INFINITE_BATCH_TIME},
        ])
    );
    // Working tables were rebuilt with the new column
    assert_eq!(db.count("main_stage_work"), 0);
    assert!(db.select("SELECT \"email\" FROM \"main_temp\"").as_array().unwrap().is_empty());
}
