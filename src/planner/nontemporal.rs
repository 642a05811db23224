//! Non-temporal delta: upsert staging into main by primary key.

use crate::logical_plan::LogicalPlan;
use crate::sql::dml::{Merge, MergeAction, WhenClause};
use crate::sql::expr::{and_all, lit_bool, table_col, Expr, ExprExt};
use crate::sql::query::Query;

use super::{Planner, MAIN_ALIAS, STAGE_ALIAS};

pub(super) fn build_ingest(planner: &Planner) -> LogicalPlan {
    let main = &planner.datasets().main;
    let staging = &planner.datasets().staging;
    let data_fields = planner.data_field_names();

    let merge = Merge::into(main.name())
        .target_schema(main.group())
        .target_alias(MAIN_ALIAS)
        .source_alias(STAGE_ALIAS)
        .on(planner
            .pk_match(MAIN_ALIAS, STAGE_ALIAS)
            .unwrap_or_else(|| lit_bool(true)));

    // Filtered staging is read through a derived table under the same alias
    let merge = match planner.staging_condition(STAGE_ALIAS) {
        Some(condition) => merge.using_query(
            Query::new()
                .select_star()
                .from(planner.staging_ref(STAGE_ALIAS))
                .filter(condition),
        ),
        None => merge.using_table(staging.group(), staging.name()),
    };

    let merge = match planner.deleted(STAGE_ALIAS) {
        Some(deleted) => merge.when_matched_and_delete(deleted),
        None => merge,
    };

    let assignments: Vec<(String, Expr)> = data_fields
        .iter()
        .map(|f| (f.clone(), table_col(STAGE_ALIAS, f)))
        .collect();
    let merge = merge
        .when(WhenClause {
            matched: true,
            condition: and_all(
                [digest_changed(planner)]
                    .into_iter()
                    .chain(planner.not_deleted(STAGE_ALIAS)),
            ),
            action: MergeAction::Update { assignments },
        })
        .when(WhenClause {
            matched: false,
            condition: planner.not_deleted(STAGE_ALIAS),
            action: MergeAction::Insert {
                columns: data_fields.clone(),
                values: data_fields
                    .iter()
                    .map(|f| table_col(STAGE_ALIAS, f))
                    .collect(),
            },
        });

    LogicalPlan::of(merge)
}

/// `sink.digest <> stage.digest`
pub(super) fn digest_changed(planner: &Planner) -> Expr {
    let digest = planner.digest_field().unwrap_or_default();
    table_col(MAIN_ALIAS, digest).ne(table_col(STAGE_ALIAS, digest))
}
