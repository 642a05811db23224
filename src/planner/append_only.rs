//! Append-only ingest: copy staging rows into main.

use crate::ingest_mode::{AppendOnly, Deduplication};
use crate::logical_plan::LogicalPlan;
use crate::sql::dml::Insert;
use crate::sql::expr::{and_all, lit_int, not_exists, table_col, Expr, ExprExt};
use crate::sql::query::Query;

use super::{Planner, MAIN_ALIAS, STAGE_ALIAS};

pub(super) fn build_ingest(planner: &Planner, mode: &AppendOnly) -> LogicalPlan {
    let main = &planner.datasets().main;
    let data_fields = planner.data_field_names();

    let mut columns = data_fields.clone();
    let mut values: Vec<Expr> = data_fields
        .iter()
        .map(|f| table_col(STAGE_ALIAS, f))
        .collect();
    if let Some(audit) = mode.audit_field() {
        columns.push(audit.to_string());
        values.push(planner.batch_start());
    }

    let select = Query::new()
        .select(values)
        .from(planner.staging_ref(STAGE_ALIAS))
        .filter_opt(insert_condition(planner, mode));

    LogicalPlan::of(
        Insert::into(main.name())
            .schema(main.group())
            .columns(columns)
            .from_select(select),
    )
}

/// Which staging rows get appended; shared with the inserted-rows count.
pub(super) fn insert_condition(planner: &Planner, mode: &AppendOnly) -> Option<Expr> {
    let mut conditions: Vec<Expr> = planner.staging_condition(STAGE_ALIAS).into_iter().collect();
    if mode.deduplication() == Deduplication::FilterDuplicates {
        conditions.push(not_exists(
            Query::new()
                .select(vec![lit_int(1)])
                .from(planner.main_ref(MAIN_ALIAS))
                .filter_opt(duplicate_match(planner, mode)),
        ));
    }
    and_all(conditions)
}

/// A main row identical to the staging row: same keys and digest, or every
/// data column equal when no digest is declared.
fn duplicate_match(planner: &Planner, mode: &AppendOnly) -> Option<Expr> {
    let same = |f: &str| table_col(MAIN_ALIAS, f).eq(table_col(STAGE_ALIAS, f));
    match mode.digest_field() {
        Some(digest) => and_all(
            planner
                .pk_match(MAIN_ALIAS, STAGE_ALIAS)
                .into_iter()
                .chain(std::iter::once(same(digest))),
        ),
        None => and_all(planner.data_field_names().iter().map(|f| same(f.as_str()))),
    }
}
