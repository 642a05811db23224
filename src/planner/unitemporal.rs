//! Unitemporal ingest: version rows on the transaction axis only.
//!
//! A changed row closes the open version of its key (`out` set to the
//! batch close value) and opens a new one (`in` set to the batch value,
//! `out` to infinity). An unchanged row leaves main untouched.

use crate::ingest_mode::UnitemporalSnapshot;
use crate::logical_plan::LogicalPlan;
use crate::sql::dml::{Insert, Update};
use crate::sql::expr::{and_all, exists, not_exists, table_col, Expr, ExprExt};
use crate::sql::query::Query;

use super::nontemporal::digest_changed;
use super::{Planner, MAIN_ALIAS, STAGE_ALIAS};

pub(super) fn build_delta_ingest(planner: &Planner) -> LogicalPlan {
    let changed = match planner.deleted(STAGE_ALIAS) {
        Some(deleted) => digest_changed(planner).or(deleted),
        None => digest_changed(planner),
    };
    let matching_staging = Query::new()
        .select_star()
        .from(planner.staging_ref(STAGE_ALIAS))
        .filter_opt(and_all(
            planner
                .pk_match(MAIN_ALIAS, STAGE_ALIAS)
                .into_iter()
                .chain([changed])
                .chain(planner.staging_condition(STAGE_ALIAS)),
        ));

    LogicalPlan::of(close_open_rows(
        planner,
        planner.is_open(MAIN_ALIAS).and(exists(matching_staging)),
    ))
    .then(insert_new_versions(
        planner,
        and_all(
            planner
                .staging_condition(STAGE_ALIAS)
                .into_iter()
                .chain(planner.not_deleted(STAGE_ALIAS)),
        ),
    ))
}

/// Rows absent from the snapshot are closed; with partition fields only
/// partitions present in the snapshot are touched.
pub(super) fn build_snapshot_ingest(planner: &Planner, mode: &UnitemporalSnapshot) -> LogicalPlan {
    let digest = planner.digest_field().unwrap_or_default();
    let still_present = Query::new()
        .select_star()
        .from(planner.staging_ref(STAGE_ALIAS))
        .filter_opt(and_all(
            planner
                .pk_match(MAIN_ALIAS, STAGE_ALIAS)
                .into_iter()
                .chain([table_col(MAIN_ALIAS, digest).eq(table_col(STAGE_ALIAS, digest))])
                .chain(planner.staging_condition(STAGE_ALIAS)),
        ));

    let mut close_condition = planner.is_open(MAIN_ALIAS).and(not_exists(still_present));
    let partition_match = and_all(
        mode.partition_fields()
            .iter()
            .map(|p| table_col(MAIN_ALIAS, p).eq(table_col(STAGE_ALIAS, p))),
    );
    if let Some(partition_match) = partition_match {
        close_condition = close_condition.and(exists(
            Query::new()
                .select_star()
                .from(planner.staging_ref(STAGE_ALIAS))
                .filter(partition_match),
        ));
    }

    LogicalPlan::of(close_open_rows(planner, close_condition))
        .then(insert_new_versions(planner, planner.staging_condition(STAGE_ALIAS)))
}

/// `UPDATE main AS sink SET out = <close> WHERE condition`
fn close_open_rows(planner: &Planner, condition: Expr) -> Update {
    let main = &planner.datasets().main;
    let (_, tx_out) = planner.transaction_fields();
    Update::table(main.name())
        .schema(main.group())
        .alias(MAIN_ALIAS)
        .set(tx_out, planner.batch_close_value())
        .filter(condition)
}

/// Insert staging rows with no identical open version in main.
fn insert_new_versions(planner: &Planner, staging_condition: Option<Expr>) -> Insert {
    let main = &planner.datasets().main;
    let digest = planner.digest_field().unwrap_or_default();
    let (tx_in, tx_out) = planner.transaction_fields();
    let data_fields = planner.data_field_names();

    let identical_open_version = Query::new()
        .select_star()
        .from(planner.main_ref(MAIN_ALIAS))
        .filter_opt(and_all(
            [
                planner.is_open(MAIN_ALIAS),
                table_col(MAIN_ALIAS, digest).eq(table_col(STAGE_ALIAS, digest)),
            ]
            .into_iter()
            .chain(planner.pk_match(MAIN_ALIAS, STAGE_ALIAS)),
        ));

    let mut values: Vec<Expr> = data_fields
        .iter()
        .map(|f| table_col(STAGE_ALIAS, f))
        .collect();
    values.push(planner.batch_in_value());
    values.push(planner.open_value());

    let mut columns = data_fields;
    columns.push(tx_in);
    columns.push(tx_out);

    let select = Query::new()
        .select(values)
        .from(planner.staging_ref(STAGE_ALIAS))
        .filter_opt(and_all(
            staging_condition
                .into_iter()
                .chain([not_exists(identical_open_version)]),
        ));

    Insert::into(main.name())
        .schema(main.group())
        .columns(columns)
        .from_select(select)
}
