//! Every mode renders for every dialect; the ANSI and SQLite renderings
//! parse once placeholders are filled in.

use milestone::dataset::{Dataset, Datasets, Field, FieldValue};
use milestone::executor::{substitute_placeholders, Placeholders};
use milestone::generator::{GeneratorOptions, GeneratorResult, RelationalGenerator};
use milestone::ingest_mode::{
    AppendOnly, BitemporalDelta, BitemporalSnapshot, Deduplication, IngestMode, MergeStrategy,
    NontemporalDelta, TransactionMilestoning, UnitemporalDelta, UnitemporalSnapshot,
    ValidityDerivation, ValidityMilestoning,
};
use milestone::planner::{DataSplitRange, NEXT_BATCH_ID_PLACEHOLDER};
use milestone::sql::{DataType, Dialect, SqlDialect};
use milestone::transformer::Sink;
use sqlparser::dialect::{AnsiDialect, SQLiteDialect};
use sqlparser::parser::Parser;

fn staging(bitemporal: bool) -> Dataset {
    let mut fields = vec![
        Field::new("id", DataType::Int32).primary_key(),
        Field::new("name", DataType::Varchar(64)),
        Field::new("split_id", DataType::Int64),
        Field::new("op", DataType::Varchar(1)),
    ];
    if bitemporal {
        fields.push(Field::new("start", DataType::Timestamp));
        fields.push(Field::new("end", DataType::Timestamp));
    }
    fields.push(Field::new("digest", DataType::Varchar(64)));
    Dataset::definition("staging", fields)
}

fn datasets(mode: &IngestMode) -> Datasets {
    let bitemporal = matches!(
        mode,
        IngestMode::BitemporalDelta(_) | IngestMode::BitemporalSnapshot(_)
    );
    Datasets::new(Dataset::definition("main", vec![]), staging(bitemporal))
}

fn deletes() -> MergeStrategy {
    MergeStrategy::delete_indicator("op", vec![FieldValue::Text("D".into())]).unwrap()
}

fn batch_id() -> TransactionMilestoning {
    TransactionMilestoning::batch_id("batch_id_in", "batch_id_out").unwrap()
}

fn validity() -> ValidityMilestoning {
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

fn modes() -> Vec<IngestMode> {
    vec![
        IngestMode::AppendOnly(AppendOnly::new(Deduplication::AllowDuplicates)),
        IngestMode::AppendOnly(
            AppendOnly::new(Deduplication::FilterDuplicates)
                .with_digest("digest")
                .unwrap()
                .with_audit("audit_ts")
                .unwrap(),
        ),
        IngestMode::NontemporalDelta(
            NontemporalDelta::new("digest")
                .unwrap()
                .with_merge_strategy(deletes()),
        ),
        IngestMode::UnitemporalSnapshot(UnitemporalSnapshot::new("digest", batch_id()).unwrap()),
        IngestMode::UnitemporalDelta(
            UnitemporalDelta::new(
                "digest",
                TransactionMilestoning::date_time("batch_time_in", "batch_time_out").unwrap(),
            )
            .unwrap()
            .with_merge_strategy(deletes()),
        ),
        IngestMode::BitemporalSnapshot(
            BitemporalSnapshot::new("digest", batch_id(), validity()).unwrap(),
        ),
        IngestMode::BitemporalDelta(
            BitemporalDelta::new("digest", batch_id(), validity())
                .unwrap()
                .with_merge_strategy(deletes()),
        ),
    ]
}

fn generate(mode: &IngestMode, dialect: Dialect) -> GeneratorResult {
    let options = GeneratorOptions::default()
        .collect_statistics(true)
        .batch_start_timestamp("2000-01-01 00:00:00");
    RelationalGenerator::new(mode.clone(), Sink::new(dialect.name(), dialect), options)
        .generate_operations(&datasets(mode))
        .unwrap()
}

/// Every statement of every phase, in execution order.
fn all_statements(result: &GeneratorResult) -> Vec<String> {
    let mut plans = vec![result.pre_actions_sql_plan()];
    plans.extend(result.next_batch_id_sql_plan());
    plans.extend(result.pre_ingest_statistics_sql_plan().values());
    plans.push(result.ingest_sql_plan());
    plans.extend(result.post_ingest_statistics_sql_plan().values());
    plans.push(result.metadata_ingest_sql_plan());
    plans.push(result.post_actions_sql_plan());
    plans
        .into_iter()
        .flat_map(|plan| plan.statements().iter().cloned())
        .collect()
}

fn placeholders(range: Option<DataSplitRange>) -> Placeholders {
    let mut placeholders = range.map(|r| r.placeholders()).unwrap_or_default();
    placeholders.insert(NEXT_BATCH_ID_PLACEHOLDER.to_string(), "1".to_string());
    placeholders
}

fn assert_parses(statements: &[String], dialect: Dialect, placeholders: &Placeholders) {
    let parser: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Sqlite => Box::new(SQLiteDialect {}),
        _ => Box::new(AnsiDialect {}),
    };
    for statement in statements {
        let sql = substitute_placeholders(statement, placeholders);
        assert!(!sql.contains('{'), "unsubstituted placeholder in {sql}");
        if let Err(e) = Parser::parse_sql(&*parser, &sql) {
            panic!("{} rejected: {}\n{}", dialect.name(), e, sql);
        }
    }
}

#[test]
fn test_every_mode_parses_for_ansi_and_sqlite() {
    for dialect in [Dialect::Ansi, Dialect::Sqlite] {
        for mode in modes() {
            let result = generate(&mode, dialect);
            assert!(
                !result.ingest_sql_plan().is_empty(),
                "{} produced no ingest statements",
                mode.name()
            );
            assert_parses(&all_statements(&result), dialect, &placeholders(None));
        }
    }
}

#[test]
fn test_data_split_bounds_are_substituted() {
    let mode = IngestMode::UnitemporalDelta(
        UnitemporalDelta::new("digest", batch_id())
            .unwrap()
            .with_data_split("split_id")
            .unwrap(),
    );
    let ranges = [
        DataSplitRange::new(1, 1).unwrap(),
        DataSplitRange::new(2, 5).unwrap(),
    ];
    let results = RelationalGenerator::new(
        mode.clone(),
        Sink::new("sqlite", Dialect::Sqlite),
        GeneratorOptions::default().batch_start_timestamp("2000-01-01 00:00:00"),
    )
    .generate_operations_with_data_splits(&datasets(&mode), &ranges)
    .unwrap();

    assert_eq!(results.len(), 2);
    for (result, range) in results.iter().zip(ranges) {
        assert_eq!(result.ingest_data_split_range(), Some(range));
        let ingest = result.ingest_sql_plan().statements();
        assert!(ingest.iter().any(|s| s.contains("'{DATA_SPLIT_LOWER_BOUND_PLACEHOLDER}'")));
        assert_parses(ingest, Dialect::Sqlite, &placeholders(Some(range)));
    }
}

#[test]
fn test_every_dialect_renders_and_merges_only_when_supported() {
    let mode = IngestMode::NontemporalDelta(NontemporalDelta::new("digest").unwrap());
    for dialect in Dialect::ALL {
        let result = generate(&mode, dialect);
        let merges = result
            .ingest_sql_plan()
            .statements()
            .iter()
            .any(|s| s.starts_with("MERGE"));
        assert_eq!(merges, dialect.supports_merge(), "{}", dialect.name());
        assert!(!result.pre_actions_sql_plan().is_empty());
    }
}

#[test]
fn test_empty_batch_keeps_metadata_only() {
    let mode = IngestMode::UnitemporalSnapshot(UnitemporalSnapshot::new("digest", batch_id()).unwrap());
    let result = RelationalGenerator::new(
        mode.clone(),
        Sink::new("ansi", Dialect::Ansi),
        GeneratorOptions::default()
            .collect_statistics(true)
            .batch_start_timestamp("2000-01-01 00:00:00"),
    )
    .generate_operations_for_empty_batch(&datasets(&mode))
    .unwrap();

    assert!(result.ingest_sql_plan().is_empty());
    assert!(result.pre_ingest_statistics_sql_plan().is_empty());
    assert!(result.post_ingest_statistics_sql_plan().is_empty());
    assert_eq!(result.metadata_ingest_sql_plan().statements().len(), 1);
    assert!(result.next_batch_id_sql_plan().is_some());
}
