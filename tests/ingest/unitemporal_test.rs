mod common;

use common::{datasets, TestDb};
use milestone::dataset::{Field, FieldValue};
use milestone::ingest_mode::{
    IngestMode, MergeStrategy, ModeError, TransactionMilestoning, UnitemporalDelta,
    UnitemporalSnapshot, INFINITE_BATCH_ID,
};
use milestone::planner::{DataSplitRange, StatisticName};
use milestone::sql::DataType;
use serde_json::json;

fn fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::Int32).primary_key(),
        Field::new("name", DataType::Varchar(64)),
        Field::new("op", DataType::Varchar(1)),
    ]
}

fn delta_mode() -> IngestMode {
    IngestMode::UnitemporalDelta(
        UnitemporalDelta::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out").unwrap(),
        )
        .unwrap()
        .with_merge_strategy(
            MergeStrategy::delete_indicator("op", vec![FieldValue::Text("D".into())]).unwrap(),
        ),
    )
}

const MAIN_ROWS: &str = "SELECT \"id\", \"name\", \"batch_id_in\", \"batch_id_out\" FROM \"main\" \
                         ORDER BY \"id\", \"batch_id_in\"";

#[test]
fn test_delta_round_trip_with_empty_batch() {
    let db = TestDb::new("unitemporal_delta");

    let first = db
        .ingest(
            &delta_mode(),
            "2000-01-01 00:00:00",
            &datasets(&fields(), json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])),
        )
        .unwrap();
    assert_eq!(first.batch_id, Some(1));
    assert_eq!(first.statistics[&StatisticName::IncomingRecordCount], 2);
    assert_eq!(first.statistics[&StatisticName::RowsInserted], 2);
    assert_eq!(first.statistics[&StatisticName::RowsUpdated], 0);
    assert_eq!(first.statistics[&StatisticName::RowsTerminated], 0);

    let second = db
        .ingest(
            &delta_mode(),
            "2000-01-02 00:00:00",
            &datasets(
                &fields(),
                json!([
                    {"id": 1, "name": "A"},
                    {"id": 2, "name": "b", "op": "D"},
                    {"id": 3, "name": "c"},
                ]),
            ),
        )
        .unwrap();
    assert_eq!(second.batch_id, Some(2));
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(second.statistics[&StatisticName::RowsUpdated], 1);
    assert_eq!(second.statistics[&StatisticName::RowsTerminated], 1);

    let after_second = json!([
        {"id": 1, "name": "a", "batch_id_in": 1, "batch_id_out": 1},
        {"id": 1, "name": "A", "batch_id_in": 2, "batch_id_out": INFINITE_BATCH_ID},
        {"id": 2, "name": "b", "batch_id_in": 1, "batch_id_out": 1},
        {"id": 3, "name": "c", "batch_id_in": 2, "batch_id_out": INFINITE_BATCH_ID},
    ]);
    assert_eq!(db.select(MAIN_ROWS), after_second);

    // An empty batch only records its metadata row
    let third = db
        .ingest(&delta_mode(), "2000-01-03 00:00:00", &datasets(&fields(), json!([])))
        .unwrap();
    assert_eq!(third.batch_id, Some(3));
    assert!(third.statistics.is_empty());
    assert_eq!(db.select(MAIN_ROWS), after_second);
    assert_eq!(
        db.select("SELECT \"table_batch_id\" FROM \"batch_metadata\" ORDER BY \"table_batch_id\""),
        json!([{"table_batch_id": 1}, {"table_batch_id": 2}, {"table_batch_id": 3}])
    );
}

#[test]
fn test_delta_unchanged_rows_keep_their_version() {
    let db = TestDb::new("unitemporal_unchanged");
    let batch = || datasets(&fields(), json!([{"id": 1, "name": "a"}]));

    db.ingest(&delta_mode(), "2000-01-01 00:00:00", &batch()).unwrap();
    let second = db.ingest(&delta_mode(), "2000-01-02 00:00:00", &batch()).unwrap();

    assert_eq!(second.statistics[&StatisticName::RowsInserted], 0);
    assert_eq!(second.statistics[&StatisticName::RowsUpdated], 0);
    assert_eq!(
        db.select(MAIN_ROWS),
        json!([{"id": 1, "name": "a", "batch_id_in": 1, "batch_id_out": INFINITE_BATCH_ID}])
    );
}

#[test]
fn test_snapshot_closes_missing_rows_by_date_time() {
    let db = TestDb::new("unitemporal_snapshot");
    let mode = IngestMode::UnitemporalSnapshot(
        UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::date_time("batch_time_in", "batch_time_out").unwrap(),
        )
        .unwrap(),
    );
    let all_fields = fields();
    let snapshot_fields = &all_fields[..2];

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(snapshot_fields, json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])),
    )
    .unwrap();
    let second = db
        .ingest(
            &mode,
            "2000-01-02 00:00:00",
            &datasets(snapshot_fields, json!([{"id": 1, "name": "a"}, {"id": 3, "name": "c"}])),
        )
        .unwrap();

    assert_eq!(second.batch_id, None);
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(second.statistics[&StatisticName::RowsTerminated], 1);
    assert_eq!(second.statistics[&StatisticName::RowsUpdated], 0);
    assert_eq!(
        db.select(
            "SELECT \"id\", \"batch_time_in\", \"batch_time_out\" FROM \"main\" \
             ORDER BY \"id\", \"batch_time_in\""
        ),
        json!([
            {"id": 1, "batch_time_in": "2000-01-01 00:00:00", "batch_time_out": "9999-12-31 23:59:59"},
            {"id": 2, "batch_time_in": "2000-01-01 00:00:00", "batch_time_out": "2000-01-02 00:00:00"},
            {"id": 3, "batch_time_in": "2000-01-02 00:00:00", "batch_time_out": "9999-12-31 23:59:59"},
        ])
    );
}

#[test]
fn test_snapshot_partitions_limit_closing() {
    let db = TestDb::new("unitemporal_partitions");
    let mode = IngestMode::UnitemporalSnapshot(
        UnitemporalSnapshot::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out").unwrap(),
        )
        .unwrap()
        .with_partition_fields(&["region"])
        .unwrap(),
    );
    let partitioned = vec![
        Field::new("id", DataType::Int32).primary_key(),
        Field::new("region", DataType::Varchar(8)),
    ];

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(&partitioned, json!([{"id": 1, "region": "eu"}, {"id": 2, "region": "us"}])),
    )
    .unwrap();
    // Only the eu partition is delivered; us stays open
    db.ingest(
        &mode,
        "2000-01-02 00:00:00",
        &datasets(&partitioned, json!([{"id": 3, "region": "eu"}])),
    )
    .unwrap();

    assert_eq!(
        db.select("SELECT \"id\", \"batch_id_out\" FROM \"main\" ORDER BY \"id\""),
        json!([
            {"id": 1, "batch_id_out": 1},
            {"id": 2, "batch_id_out": INFINITE_BATCH_ID},
            {"id": 3, "batch_id_out": INFINITE_BATCH_ID},
        ])
    );
}

#[test]
fn test_delta_data_splits_get_their_own_batch() {
    let db = TestDb::new("unitemporal_splits");
    let mode = IngestMode::UnitemporalDelta(
        UnitemporalDelta::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out").unwrap(),
        )
        .unwrap()
        .with_data_split("split")
        .unwrap(),
    );
    let mut split_fields = fields();
    split_fields.push(Field::new("split", DataType::Int64));
    let ranges = [
        DataSplitRange::new(1, 1).unwrap(),
        DataSplitRange::new(2, 2).unwrap(),
    ];

    let results = db
        .ingest_splits(
            &mode,
            "2000-01-01 00:00:00",
            &datasets(
                &split_fields,
                json!([
                    {"id": 1, "name": "a", "split": 1},
                    {"id": 1, "name": "b", "split": 2},
                    {"id": 2, "name": "c", "split": 2},
                ]),
            ),
            &ranges,
        )
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].batch_id, Some(1));
    assert_eq!(results[0].statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(results[1].batch_id, Some(2));
    assert_eq!(results[1].statistics[&StatisticName::IncomingRecordCount], 2);
    assert_eq!(results[1].statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(results[1].statistics[&StatisticName::RowsUpdated], 1);
    assert_eq!(results[1].statistics[&StatisticName::RowsTerminated], 0);
    assert_eq!(
        db.select(MAIN_ROWS),
        json!([
            {"id": 1, "name": "a", "batch_id_in": 1, "batch_id_out": 1},
            {"id": 1, "name": "b", "batch_id_in": 2, "batch_id_out": INFINITE_BATCH_ID},
            {"id": 2, "name": "c", "batch_id_in": 2, "batch_id_out": INFINITE_BATCH_ID},
        ])
    );
    assert_eq!(db.count("batch_metadata"), 2);
}

#[test]
fn test_delta_data_splits_need_batch_ids() {
    let err = UnitemporalDelta::new(
        "digest",
        TransactionMilestoning::date_time("batch_time_in", "batch_time_out").unwrap(),
    )
    .unwrap()
    .with_data_split("split")
    .unwrap_err();

    assert!(matches!(err, ModeError::DataSplitWithoutBatchId { mode: "UnitemporalDelta" }));
}
