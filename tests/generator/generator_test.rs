use std::sync::Arc;

use milestone::dataset::{Dataset, Datasets, Field};
use milestone::generator::{GeneratorError, GeneratorOptions, RelationalGenerator};
use milestone::ingest_mode::{
    IngestMode, NontemporalDelta, TransactionMilestoning, UnitemporalDelta, UnitemporalSnapshot,
};
use milestone::planner::{PlanError, StatisticName};
use milestone::schema_evolution::{EvolutionError, WideningPolicy};
use milestone::sql::{DataType, Dialect};
use milestone::transformer::{CaseConversion, Sink, SinkRegistry};

const TS: &str = "2000-01-01 00:00:00";

fn datasets() -> Datasets {
    Datasets::new(
        Dataset::definition("main", vec![]),
        Dataset::definition(
            "staging",
            vec![
                Field::new("id", DataType::Int32).primary_key(),
                Field::new("name", DataType::Varchar(64)),
                Field::new("digest", DataType::Varchar(64)),
            ],
        ),
    )
}

fn nontemporal() -> IngestMode {
    IngestMode::NontemporalDelta(NontemporalDelta::new("digest").unwrap())
}

fn unitemporal() -> IngestMode {
    IngestMode::UnitemporalDelta(
        UnitemporalDelta::new(
            "digest",
            TransactionMilestoning::batch_id("batch_id_in", "batch_id_out").unwrap(),
        )
        .unwrap(),
    )
}

fn generator(mode: IngestMode, sink: Sink, options: GeneratorOptions) -> RelationalGenerator {
    RelationalGenerator::new(mode, sink, options.batch_start_timestamp(TS))
}

#[test]
fn test_native_merge_on_snowflake() {
    let sink = SinkRegistry::with_defaults().get("Snowflake").cloned().unwrap();
    let result = generator(nontemporal(), sink, GeneratorOptions::default())
        .generate_operations(&datasets())
        .unwrap();

    let ingest = result.ingest_sql_plan().statements();
    assert_eq!(ingest.len(), 1);
    insta::assert_snapshot!(
        ingest[0],
        @r#"MERGE INTO "main" AS "sink" USING "staging" AS "stage" ON "sink"."id" = "stage"."id" WHEN MATCHED AND "sink"."digest" <> "stage"."digest" THEN UPDATE SET "id" = "stage"."id", "name" = "stage"."name", "digest" = "stage"."digest" WHEN NOT MATCHED THEN INSERT ("id", "name", "digest") VALUES ("stage"."id", "stage"."name", "stage"."digest")"#
    );
}

#[test]
fn test_merge_is_lowered_without_native_support() {
    let result = generator(
        nontemporal(),
        Sink::new("sqlite", Dialect::Sqlite),
        GeneratorOptions::default(),
    )
    .generate_operations(&datasets())
    .unwrap();

    let ingest = result.ingest_sql_plan().statements();
    assert_eq!(ingest.len(), 2);
    assert!(ingest[0].starts_with("UPDATE \"main\" AS \"sink\" SET \"id\" = (SELECT"));
    assert!(ingest[1].starts_with("INSERT INTO \"main\" (\"id\", \"name\", \"digest\") SELECT"));
    assert!(ingest.iter().all(|s| !s.contains("MERGE")));
}

#[test]
fn test_batch_id_and_metadata_statements() {
    let result = generator(
        unitemporal(),
        Sink::new("ansi", Dialect::Ansi),
        GeneratorOptions::default(),
    )
    .generate_operations(&datasets())
    .unwrap();

    insta::assert_snapshot!(
        result.next_batch_id_sql_plan().unwrap().statements()[0],
        @r#"SELECT COALESCE(MAX("meta"."table_batch_id"), 0) + 1 FROM "batch_metadata" AS "meta" WHERE UPPER("meta"."table_name") = UPPER('main')"#
    );
    insta::assert_snapshot!(
        result.metadata_ingest_sql_plan().statements()[0],
        @r#"INSERT INTO "batch_metadata" ("table_name", "batch_start_ts_utc", "batch_end_ts_utc", "batch_status", "table_batch_id") SELECT 'main', '2000-01-01 00:00:00', CURRENT_TIMESTAMP, 'DONE', {NEXT_BATCH_ID_PATTERN}"#
    );
    assert!(result.schema_evolution_sql_plan().is_none());
}

#[test]
fn test_statistics_plans_follow_mode() {
    let options = GeneratorOptions::default().collect_statistics(true);

    let unitemporal = generator(unitemporal(), Sink::new("ansi", Dialect::Ansi), options.clone())
        .generate_operations(&datasets())
        .unwrap();
    assert_eq!(
        unitemporal
            .pre_ingest_statistics_sql_plan()
            .keys()
            .copied()
            .collect::<Vec<_>>(),
        vec![StatisticName::IncomingRecordCount]
    );
    assert_eq!(
        unitemporal
            .post_ingest_statistics_sql_plan()
            .keys()
            .copied()
            .collect::<Vec<_>>(),
        vec![
            StatisticName::RowsInserted,
            StatisticName::RowsUpdated,
            StatisticName::RowsTerminated,
        ]
    );

    let nontemporal = generator(nontemporal(), Sink::new("ansi", Dialect::Ansi), options)
        .generate_operations(&datasets())
        .unwrap();
    assert_eq!(
        nontemporal
            .pre_ingest_statistics_sql_plan()
            .keys()
            .copied()
            .collect::<Vec<_>>(),
        vec![
            StatisticName::IncomingRecordCount,
            StatisticName::RowsInserted,
            StatisticName::RowsUpdated,
        ]
    );
    assert!(nontemporal.post_ingest_statistics_sql_plan().is_empty());
    assert!(nontemporal.pre_ingest_statistics_sql_plan()[&StatisticName::IncomingRecordCount]
        .statements()[0]
        .starts_with("SELECT COUNT(*) AS \"incomingRecordCount\" FROM \"staging\" AS \"stage\""));
}

#[test]
fn test_staging_cleanup_can_be_disabled() {
    let keep = generator(
        nontemporal(),
        Sink::new("ansi", Dialect::Ansi),
        GeneratorOptions::default().cleanup_staging_data(false),
    )
    .generate_operations(&datasets())
    .unwrap();
    assert!(keep.post_actions_sql_plan().is_empty());

    let clean = generator(
        nontemporal(),
        Sink::new("ansi", Dialect::Ansi),
        GeneratorOptions::default(),
    )
    .generate_operations(&datasets())
    .unwrap();
    assert_eq!(clean.post_actions_sql_plan().to_string(), "DELETE FROM \"staging\";\n");
}

#[test]
fn test_lower_case_conversion() {
    let mixed = Datasets::new(
        Dataset::definition("Main", vec![]),
        Dataset::definition(
            "Staging",
            vec![
                Field::new("ID", DataType::Int32).primary_key(),
                Field::new("Digest", DataType::Varchar(64)),
            ],
        ),
    );
    let mode = IngestMode::UnitemporalSnapshot(
        UnitemporalSnapshot::new(
            "Digest",
            TransactionMilestoning::batch_id("IN_Z", "OUT_Z").unwrap(),
        )
        .unwrap(),
    );
    let result = generator(
        mode,
        Sink::new("ansi", Dialect::Ansi),
        GeneratorOptions::default().case_conversion(CaseConversion::ToLower),
    )
    .generate_operations(&mixed)
    .unwrap();

    insta::assert_snapshot!(
        result.pre_actions_sql_plan().statements()[0],
        @r#"CREATE TABLE IF NOT EXISTS "main" ("id" INTEGER NOT NULL, "digest" VARCHAR(64), "in_z" INTEGER NOT NULL, "out_z" INTEGER, PRIMARY KEY ("id", "in_z"))"#
    );
    assert!(result
        .ingest_sql_plan()
        .statements()
        .iter()
        .all(|s| !s.contains("\"Staging\"") && s.contains("\"staging\"")));
}

/// Accepts no type change at all.
#[derive(Debug)]
struct NoWidening;

impl WideningPolicy for NoWidening {
    fn can_widen(&self, _from: &DataType, _to: &DataType) -> bool {
        false
    }
}

#[test]
fn test_sink_widening_policy_drives_evolution() {
    let registry = SinkRegistry::new()
        .register(Sink::new("strict", Dialect::Snowflake).with_widening(Arc::new(NoWidening)));
    assert!(registry.get("snowflake").is_none());
    let sink = registry.get("STRICT").cloned().unwrap();

    let main = Dataset::definition(
        "main",
        vec![
            Field::new("id", DataType::Int32).primary_key(),
            Field::new("name", DataType::Varchar(64)),
            Field::new("digest", DataType::Varchar(64)),
        ],
    );
    let staging = Dataset::definition(
        "staging",
        vec![
            Field::new("id", DataType::Int64).primary_key(),
            Field::new("name", DataType::Varchar(64)),
            Field::new("digest", DataType::Varchar(64)),
        ],
    );
    let err = generator(
        nontemporal(),
        sink,
        GeneratorOptions::default().enable_schema_evolution(true),
    )
    .generate_operations(&Datasets::new(main, staging))
    .unwrap_err();

    assert!(matches!(
        err,
        GeneratorError::Plan(PlanError::SchemaEvolution(EvolutionError::BreakingTypeChange {
            ref field,
            ..
        })) if field == "id"
    ));
}
