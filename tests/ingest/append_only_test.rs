mod common;

use common::{datasets, TestDb};
use milestone::dataset::Field;
use milestone::error::IngestError;
use milestone::executor::ExecutorError;
use milestone::ingest_mode::{AppendOnly, Deduplication, IngestMode};
use milestone::planner::StatisticName;
use milestone::sql::DataType;
use serde_json::json;

fn fields() -> Vec<Field> {
    vec![
        Field::new("id", DataType::Int32).primary_key(),
        Field::new("name", DataType::Varchar(64)),
    ]
}

#[test]
fn test_allow_duplicates_grows_main() {
    let db = TestDb::new("append_allow");
    let mode = IngestMode::AppendOnly(AppendOnly::new(Deduplication::AllowDuplicates));

    let first = db
        .ingest(
            &mode,
            "2000-01-01 00:00:00",
            &datasets(&fields(), json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])),
        )
        .unwrap();
    assert_eq!(first.batch_id, None);
    assert_eq!(first.statistics[&StatisticName::IncomingRecordCount], 2);
    assert_eq!(first.statistics[&StatisticName::RowsInserted], 2);

    let second = db
        .ingest(
            &mode,
            "2000-01-02 00:00:00",
            &datasets(&fields(), json!([{"id": 1, "name": "a"}, {"id": 3, "name": "c"}])),
        )
        .unwrap();
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 2);

    assert_eq!(
        db.select("SELECT \"id\", \"name\" FROM \"main\" ORDER BY \"id\", \"name\""),
        json!([
            {"id": 1, "name": "a"},
            {"id": 1, "name": "a"},
            {"id": 2, "name": "b"},
            {"id": 3, "name": "c"},
        ])
    );
    assert_eq!(db.count("staging"), 0);
    assert_eq!(
        db.select(
            "SELECT \"table_name\", \"batch_status\", \"table_batch_id\", \"batch_start_ts_utc\" \
             FROM \"batch_metadata\" ORDER BY \"table_batch_id\""
        ),
        json!([
            {"table_name": "main", "batch_status": "DONE", "table_batch_id": 1, "batch_start_ts_utc": "2000-01-01 00:00:00"},
            {"table_name": "main", "batch_status": "DONE", "table_batch_id": 2, "batch_start_ts_utc": "2000-01-02 00:00:00"},
        ])
    );
}

#[test]
fn test_filter_duplicates_with_digest_and_audit() {
    let db = TestDb::new("append_filter");
    let mode = IngestMode::AppendOnly(
        AppendOnly::new(Deduplication::FilterDuplicates)
            .with_digest("digest")
            .unwrap()
            .with_audit("batch_update_time")
            .unwrap(),
    );

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(&fields(), json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])),
    )
    .unwrap();
    let second = db
        .ingest(
            &mode,
            "2000-01-02 00:00:00",
            &datasets(&fields(), json!([{"id": 1, "name": "a"}, {"id": 3, "name": "c"}])),
        )
        .unwrap();

    assert_eq!(second.statistics[&StatisticName::IncomingRecordCount], 2);
    assert_eq!(second.statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(
        db.select("SELECT \"id\", \"name\", \"batch_update_time\" FROM \"main\" ORDER BY \"id\""),
        json!([
            {"id": 1, "name": "a", "batch_update_time": "2000-01-01 00:00:00"},
            {"id": 2, "name": "b", "batch_update_time": "2000-01-01 00:00:00"},
            {"id": 3, "name": "c", "batch_update_time": "2000-01-02 00:00:00"},
        ])
    );
    let digests = db.select("SELECT \"digest\" FROM \"main\"");
    assert!(digests
        .as_array()
        .unwrap()
        .iter()
        .all(|row| row["digest"].as_str().is_some_and(|d| d.len() == 64)));
}

#[test]
fn test_fail_on_duplicates_rolls_back() {
    let db = TestDb::new("append_fail");
    let mode = IngestMode::AppendOnly(AppendOnly::new(Deduplication::FailOnDuplicates));

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(&fields(), json!([{"id": 1, "name": "a"}])),
    )
    .unwrap();
    let err = db
        .ingest(
            &mode,
            "2000-01-02 00:00:00",
            &datasets(&fields(), json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])),
        )
        .unwrap_err();

    match err {
        IngestError::Execution(ExecutorError::Statement { message, .. }) => {
            assert!(message.contains("UNIQUE constraint failed"), "{message}")
        }
        other => panic!("unexpected error {other}"),
    }
    // Neither the insert nor the batch row survived
    assert_eq!(db.count("main"), 1);
    assert_eq!(db.count("batch_metadata"), 1);
}

#[test]
fn test_corrected_batch_succeeds_after_failed_one() {
    let db = TestDb::new("append_retry");
    let mode = IngestMode::AppendOnly(AppendOnly::new(Deduplication::FailOnDuplicates));

    db.ingest(
        &mode,
        "2000-01-01 00:00:00",
        &datasets(&fields(), json!([{"id": 1, "name": "a"}])),
    )
    .unwrap();
    db.ingest(
        &mode,
        "2000-01-02 00:00:00",
        &datasets(&fields(), json!([{"id": 1, "name": "a"}])),
    )
    .unwrap_err();

    // Rows imported by the failed batch must not leak into the retry
    let retry = db
        .ingest(
            &mode,
            "2000-01-03 00:00:00",
            &datasets(&fields(), json!([{"id": 2, "name": "b"}])),
        )
        .unwrap();

    assert_eq!(retry.statistics[&StatisticName::IncomingRecordCount], 1);
    assert_eq!(retry.statistics[&StatisticName::RowsInserted], 1);
    assert_eq!(
        db.select("SELECT \"id\", \"name\" FROM \"main\" ORDER BY \"id\""),
        json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])
    );
    assert_eq!(db.count("staging"), 0);
    assert_eq!(db.count("batch_metadata"), 2);
}
