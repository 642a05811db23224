mod common;

use common::{datasets, TestDb};
use milestone::dataset::{Field, FieldValue};
use milestone::error::IngestError;
use milestone::generator::GeneratorError;
use milestone::ingest_mode::{IngestMode, MergeStrategy, NontemporalDelta};
use milestone::planner::{DataSplitRange, PlanError, StatisticName};
use milestone::sql::DataType;
use serde_json::json;

fn fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::Int32).primary_key(),
        Field::new("name", DataType::Varchar(64)),
        Field::new("op", DataType::Varchar(1)),
    ]
}

fn mode() -> IngestMode {
    IngestMode::NontemporalDelta(
        NontemporalDelta::new("digest")
            .unwrap()
            .with_merge_strategy(
                MergeStrategy::delete_indicator("op", vec![FieldValue::Text("D".into())]).unwrap(),
            ),
    )
}

#[test]
fn test_upsert_and_delete_indicator() {
    let db = TestDb::new("nontemporal_upsert");

    let first = db
        .ingest(
            &mode(),
            "2000-01-01 00:00:00",
            &datasets(
                &fields(),
                json!([
                    {"id": 1, "name": "a"},
                    {"id": 2, "name": "b"},
                    {"id": 3, "name": "c"},
                ]),
            ),
        )
        .unwrap();
    assert_eq!(first.statistics[&StatisticName::RowsInserted], 3);
    assert_eq!(first.statistics[&StatisticName::RowsUpdated], 0);
    assert_eq!(first.statistics[&StatisticName::RowsDeleted], 0);

    let second = db
        .ingest(
            &mode(),
            "2000-01-02 00:00:00",
            &datasets(
                &fields(),
                json!([
                    {"id": 1, "name": "a"},
                    {"id": 2, "name": "B"},
                    {"id": 3, "name": "c", "op": "D"},
                    {"id": 4, "name": "d", "op": null},
                ]),
            ),
        )
        .unwrap();
    assert_eq!(second.statistics[&StatisticName::IncomingRecordCount], 4);
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(second.statistics[&StatisticName::RowsUpdated], 1);
    assert_eq!(second.statistics[&StatisticName::RowsDeleted], 1);

    assert_eq!(
        db.select("SELECT \"id\", \"name\" FROM \"main\" ORDER BY \"id\""),
        json!([
            {"id": 1, "name": "a"},
            {"id": 2, "name": "B"},
            {"id": 4, "name": "d"},
        ])
    );
    // The delete indicator is not a main column
    let columns = db.select("SELECT \"name\" FROM pragma_table_info('main') ORDER BY \"cid\"");
    assert_eq!(
        columns,
        json!([{"name": "id"}, {"name": "name"}, {"name": "digest"}])
    );
}

#[test]
fn test_data_splits_apply_in_order() {
    let db = TestDb::new("nontemporal_splits");
    let mode = IngestMode::NontemporalDelta(
        NontemporalDelta::new("digest")
            .unwrap()
            .with_data_split("split")
            .unwrap(),
    );
    let mut split_fields = fields();
    split_fields.push(Field::new("split", DataType::Int64));

    let ranges = [
        DataSplitRange::new(1, 1).unwrap(),
        DataSplitRange::new(2, 3).unwrap(),
    ];
    let results = db
        .ingest_splits(
            &mode,
            "2000-01-01 00:00:00",
            &datasets(
                &split_fields,
                json!([
                    {"id": 1, "name": "first", "split": 1},
                    {"id": 1, "name": "second", "split": 2},
                    {"id": 2, "name": "only", "split": 3},
                ]),
            ),
            &ranges,
        )
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].data_split_range, Some(ranges[0]));
    assert_eq!(results[0].statistics[&StatisticName::IncomingRecordCount], 1);
    assert_eq!(results[1].data_split_range, Some(ranges[1]));
    assert_eq!(results[1].statistics[&StatisticName::RowsUpdated], 1);
    assert_eq!(results[1].statistics[&StatisticName::RowsInserted], 1);
    assert!(results.iter().all(|r| r.batch_start_timestamp == "2000-01-01 00:00:00"));

    assert_eq!(
        db.select("SELECT \"id\", \"name\" FROM \"main\" ORDER BY \"id\""),
        json!([{"id": 1, "name": "second"}, {"id": 2, "name": "only"}])
    );
    // One metadata row per split
    assert_eq!(db.count("batch_metadata"), 2);
}

#[test]
fn test_missing_primary_keys_fails_before_running() {
    let db = TestDb::new("nontemporal_no_keys");
    let err = db
        .ingest(
            &mode(),
            "2000-01-01 00:00:00",
            &datasets(
                &[
                    Field::new("id", DataType::Int32),
                    Field::new("op", DataType::Varchar(1)),
                ],
                json!([{"id": 1}]),
            ),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Generator(GeneratorError::Plan(PlanError::MissingPrimaryKeys { .. }))
    ));
}
