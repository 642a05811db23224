mod common;

use common::{options, staging, staging_named, TestDb};
use milestone::dataset::{Dataset, Datasets, Field};
use milestone::error::IngestError;
use milestone::generator::GeneratorError;
use milestone::ingest_mode::{AppendOnly, Deduplication, IngestMode};
use milestone::planner::PlanError;
use milestone::schema_evolution::EvolutionError;
use milestone::sql::DataType;
use serde_json::json;

fn mode() -> IngestMode {
    IngestMode::AppendOnly(AppendOnly::new(Deduplication::AllowDuplicates))
}

fn main_dataset() -> Dataset {
    Dataset::definition(
        "main",
        vec![
            Field::new("id", DataType::Int32),
            Field::new("name", DataType::Varchar(64)),
        ],
    )
}

/// One row into a main table that only knows `id` and `name`.
fn seed(db: &TestDb) {
    db.ingest(
        &mode(),
        "2000-01-01 00:00:00",
        &Datasets::new(
            main_dataset(),
            staging(&main_dataset().schema.fields, json!([{"id": 1, "name": "a"}])),
        ),
    )
    .unwrap();
}

fn wider_staging(rows: serde_json::Value) -> Datasets {
    let mut fields = main_dataset().schema.fields;
    fields.push(Field::new("email", DataType::Varchar(128)));
    Datasets::new(main_dataset(), staging_named("staging_wide", &fields, rows))
}

#[test]
fn test_new_staging_column_is_added_to_main() {
    let db = TestDb::new("evolution_add_column");
    seed(&db);

    let result = db
        .ingest_with_options(
            &mode(),
            options("2000-01-02 00:00:00").enable_schema_evolution(true),
            &wider_staging(json!([{"id": 2, "name": "b", "email": "b@example.com"}])),
        )
        .unwrap();

    let evolution = result.schema_evolution_sql.expect("evolution statements");
    assert_eq!(
        evolution.statements(),
        ["ALTER TABLE \"main\" ADD COLUMN \"email\" VARCHAR(128)"]
    );
    assert!(result.updated_datasets.main.schema.contains("email"));
    assert_eq!(
        db.select("SELECT \"id\", \"name\", \"email\" FROM \"main\" ORDER BY \"id\""),
        json!([
            {"id": 1, "name": "a", "email": null},
            {"id": 2, "name": "b", "email": "b@example.com"},
        ])
    );
}

#[test]
fn test_new_staging_column_without_evolution_fails() {
    let db = TestDb::new("evolution_disabled");
    seed(&db);

    let err = db
        .ingest(
            &mode(),
            "2000-01-02 00:00:00",
            &wider_staging(json!([{"id": 2, "name": "b", "email": "b@example.com"}])),
        )
        .unwrap_err();
    match err {
        IngestError::Generator(GeneratorError::Plan(PlanError::MissingField { dataset, field })) => {
            assert_eq!(dataset, "main");
            assert_eq!(field, "email");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(db.count("main"), 1);
}

#[test]
fn test_type_change_sqlite_cannot_apply() {
    let db = TestDb::new("evolution_type_change");
    seed(&db);

    let fields = vec![
        Field::new("id", DataType::Int64),
        Field::new("name", DataType::Varchar(64)),
    ];
    let err = db
        .ingest_with_options(
            &mode(),
            options("2000-01-02 00:00:00").enable_schema_evolution(true),
            &Datasets::new(
                main_dataset(),
                staging_named("staging_long_ids", &fields, json!([{"id": 2, "name": "b"}])),
            ),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Generator(GeneratorError::Plan(PlanError::SchemaEvolution(
            EvolutionError::UnsupportedAlteration { .. }
        )))
    ));
}
