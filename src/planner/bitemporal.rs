//! Bitemporal ingest: version rows on both the validity and transaction axes.
//!
//! The snapshot variant treats staging as the complete set of intervals and
//! closes every open version it no longer contains.
//!
//! The delta variant rewrites only the intervals staging touches. Staging
//! rows are first copied into a work table where their validity end is
//! resolved; then a temp table collects every replacement interval of the
//! batch:
//!
//! ```text
//! main:     |------------- A -------------|
//! staging:          |--- B ---|
//! result:   |-- A --|--- B ---|---- A ----|
//!           (left)   (new)     (right)
//! ```
//!
//! Open main rows overlapping a work row are closed on the transaction axis
//! and the temp rows become the new open versions. Delete-flagged staging
//! rows cut their interval out without adding a replacement.

use crate::dataset::{Dataset, DatasetKind, DatasetReference, Field, SchemaDefinition};
use crate::ingest_mode::{ValidityDerivation, ValidityMilestoning, INFINITE_BATCH_TIME};
use crate::logical_plan::LogicalPlan;
use crate::sql::dml::{Delete, Insert, Update};
use crate::sql::expr::{
    and_all, case_when, coalesce, exists, lit_timestamp, min, not_exists, table_col, Expr, ExprExt,
};
use crate::sql::query::Query;
use crate::sql::types::DataType;

use super::{table_ref, Planner, MAIN_ALIAS, STAGE_ALIAS};

const WORK_ALIAS: &str = "stage_work";
const OTHER_WORK_ALIAS: &str = "stage_work_next";
const TEMP_ALIAS: &str = "temp";

// =============================================================================
// Working tables
// =============================================================================

/// Staging rows with their resolved validity interval.
pub(super) fn stage_work_dataset(planner: &Planner) -> Dataset {
    let datasets = planner.datasets();
    let reference = datasets
        .stage_work
        .as_ref()
        .map(|d| d.reference.clone())
        .unwrap_or_else(|| sibling(&datasets.main, "stage_work"));

    let mut fields: Vec<Field> = planner.data_fields().into_iter().map(unkeyed).collect();
    if let Some(validity) = planner.mode().validity_milestoning() {
        fields.push(validity_field(planner, validity.from_field()));
        fields.push(validity_field(planner, validity.thru_field()));
    }
    if let Some(delete) = planner.mode().merge_strategy().delete_field() {
        if let Some(field) = datasets.staging.schema.field(delete) {
            fields.push(unkeyed(field));
        }
    }

    Dataset {
        reference,
        schema: SchemaDefinition::new(fields),
        kind: DatasetKind::Definition,
    }
}

/// Replacement intervals of one batch, shaped like main.
pub(super) fn temp_dataset(planner: &Planner) -> Dataset {
    let datasets = planner.datasets();
    let reference = datasets
        .temp
        .as_ref()
        .map(|d| d.reference.clone())
        .unwrap_or_else(|| sibling(&datasets.main, "temp"));

    Dataset {
        reference,
        schema: SchemaDefinition::new(datasets.main.schema.fields.iter().map(unkeyed).collect()),
        kind: DatasetKind::Definition,
    }
}

fn sibling(main: &Dataset, suffix: &str) -> DatasetReference {
    DatasetReference {
        group: main.reference.group.clone(),
        name: format!("{}_{}", main.name(), suffix),
        alias: None,
    }
}

/// Working tables hold several intervals per key.
fn unkeyed(field: &Field) -> Field {
    Field {
        primary_key: false,
        ..field.clone()
    }
}

fn validity_field(planner: &Planner, name: &str) -> Field {
    let data_type = planner
        .datasets()
        .main
        .schema
        .field(name)
        .map(|f| f.data_type.clone())
        .unwrap_or(DataType::Timestamp);
    Field::new(name, data_type)
}

/// Everything the statements of one bitemporal ingest share.
struct Bitemporal<'a> {
    planner: &'a Planner,
    from: &'a str,
    thru: &'a str,
    derivation: &'a ValidityDerivation,
    digest: &'a str,
}

impl<'a> Bitemporal<'a> {
    fn new(planner: &'a Planner, validity: &'a ValidityMilestoning) -> Self {
        Self {
            planner,
            from: validity.from_field(),
            thru: validity.thru_field(),
            derivation: validity.derivation(),
            digest: planner.digest_field().unwrap_or_default(),
        }
    }

    /// Data columns, validity from and thru, transaction in and out.
    fn main_columns(&self) -> Vec<String> {
        let (tx_in, tx_out) = self.planner.transaction_fields();
        let mut columns = self.planner.data_field_names();
        columns.push(self.from.to_string());
        columns.push(self.thru.to_string());
        columns.push(tx_in);
        columns.push(tx_out);
        columns
    }

    fn data_values(&self, alias: &str) -> Vec<Expr> {
        self.planner
            .data_field_names()
            .iter()
            .map(|f| table_col(alias, f))
            .collect()
    }

    /// Data values followed by an interval and the opening batch stamps.
    fn open_version(&self, alias: &str, from: Expr, thru: Expr) -> Vec<Expr> {
        let mut values = self.data_values(alias);
        values.push(from);
        values.push(thru);
        values.push(self.planner.batch_in_value());
        values.push(self.planner.open_value());
        values
    }

    /// Same key as the main row and an intersecting validity interval.
    fn overlaps(&self, work_alias: &str) -> Expr {
        let starts_before_end = table_col(work_alias, self.from).lt(table_col(MAIN_ALIAS, self.thru));
        let ends_after_start = table_col(work_alias, self.thru).gt(table_col(MAIN_ALIAS, self.from));
        match self.planner.pk_match(work_alias, MAIN_ALIAS) {
            Some(keys) => keys.and(starts_before_end).and(ends_after_start),
            None => starts_before_end.and(ends_after_start),
        }
    }

    fn close_main(&self, condition: Expr) -> Update {
        let main = &self.planner.datasets().main;
        Update::table(main.name())
            .schema(main.group())
            .alias(MAIN_ALIAS)
            .set(
                self.planner.transaction_fields().1,
                self.planner.batch_close_value(),
            )
            .filter(self.planner.is_open(MAIN_ALIAS).and(condition))
    }

    fn insert_into(&self, target: &Dataset, select: Query) -> Insert {
        Insert::into(target.name())
            .schema(target.group())
            .columns(self.main_columns())
            .from_select(select)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

pub(super) fn build_snapshot_ingest(planner: &Planner) -> LogicalPlan {
    let Some(validity) = planner.mode().validity_milestoning() else {
        return LogicalPlan::new();
    };
    let ctx = Bitemporal::new(planner, validity);
    let source_from = ctx.derivation.source_from();
    let source_thru = ctx.derivation.source_thru().unwrap_or_default();

    let same_version = and_all(
        planner.pk_match(MAIN_ALIAS, STAGE_ALIAS).into_iter().chain([
            table_col(MAIN_ALIAS, ctx.digest).eq(table_col(STAGE_ALIAS, ctx.digest)),
            table_col(MAIN_ALIAS, ctx.from).eq(table_col(STAGE_ALIAS, source_from)),
            table_col(MAIN_ALIAS, ctx.thru).eq(table_col(STAGE_ALIAS, source_thru)),
        ]),
    );

    let still_present = Query::new()
        .select_star()
        .from(planner.staging_ref(STAGE_ALIAS))
        .filter_opt(and_all(
            same_version
                .clone()
                .into_iter()
                .chain(planner.staging_condition(STAGE_ALIAS)),
        ));

    let already_open = Query::new()
        .select_star()
        .from(planner.main_ref(MAIN_ALIAS))
        .filter_opt(and_all(
            [planner.is_open(MAIN_ALIAS)].into_iter().chain(same_version),
        ));
    let select = Query::new()
        .select(ctx.open_version(
            STAGE_ALIAS,
            table_col(STAGE_ALIAS, source_from),
            table_col(STAGE_ALIAS, source_thru),
        ))
        .from(planner.staging_ref(STAGE_ALIAS))
        .filter_opt(and_all(
            planner
                .staging_condition(STAGE_ALIAS)
                .into_iter()
                .chain([not_exists(already_open)]),
        ));

    LogicalPlan::of(ctx.close_main(not_exists(still_present)))
        .then(ctx.insert_into(&planner.datasets().main, select))
}

// =============================================================================
// Delta
// =============================================================================

pub(super) fn build_delta_ingest(planner: &Planner) -> LogicalPlan {
    let Some(validity) = planner.mode().validity_milestoning() else {
        return LogicalPlan::new();
    };
    let ctx = Bitemporal::new(planner, validity);
    let work = stage_work_dataset(planner);
    let temp = temp_dataset(planner);

    let mut plan = LogicalPlan::of(load_stage_work(&ctx, &work));
    if ctx.derivation.source_thru().is_none() {
        plan = plan.then(trim_overlapping_work(&ctx, &work));
    }
    plan.then(drop_unchanged_work(&ctx, &work))
        .then(insert_new_intervals(&ctx, &work, &temp))
        .then(insert_left_remnants(&ctx, &work, &temp))
        .then(insert_right_remnants(&ctx, &work, &temp))
        .then(close_overlapped(&ctx, &work))
        .then(publish_temp(&ctx, &temp))
        .then(Delete::from(temp.name()).schema(temp.group()))
        .then(Delete::from(work.name()).schema(work.group()))
}

/// Copy staging into the work table, resolving each row's validity end.
fn load_stage_work(ctx: &Bitemporal<'_>, work: &Dataset) -> Insert {
    let planner = ctx.planner;
    let source_from = ctx.derivation.source_from();

    let thru_value = match ctx.derivation.source_thru() {
        Some(source_thru) => table_col(STAGE_ALIAS, source_thru),
        // Valid until the next version main already knows about
        None => coalesce(vec![
            Query::new()
                .select(vec![min(table_col(MAIN_ALIAS, ctx.from))])
                .from(planner.main_ref(MAIN_ALIAS))
                .filter_opt(and_all(
                    planner.pk_match(MAIN_ALIAS, STAGE_ALIAS).into_iter().chain([
                        table_col(MAIN_ALIAS, ctx.from).gt(table_col(STAGE_ALIAS, source_from)),
                        planner.is_open(MAIN_ALIAS),
                    ]),
                ))
                .into(),
            lit_timestamp(INFINITE_BATCH_TIME),
        ]),
    };

    let mut columns = planner.data_field_names();
    let mut values = ctx.data_values(STAGE_ALIAS);
    columns.push(ctx.from.to_string());
    values.push(table_col(STAGE_ALIAS, source_from));
    columns.push(ctx.thru.to_string());
    values.push(thru_value);
    if let Some(delete) = planner.mode().merge_strategy().delete_field() {
        columns.push(delete.to_string());
        values.push(table_col(STAGE_ALIAS, delete));
    }

    Insert::into(work.name())
        .schema(work.group())
        .columns(columns)
        .from_select(
            Query::new()
                .select(values)
                .from(planner.staging_ref(STAGE_ALIAS))
                .filter_opt(planner.staging_condition(STAGE_ALIAS)),
        )
}

/// Several staging rows of one key: each ends where the next one starts.
fn trim_overlapping_work(ctx: &Bitemporal<'_>, work: &Dataset) -> Update {
    let later = |extra: Option<Expr>| {
        and_all(
            ctx.planner
                .pk_match(OTHER_WORK_ALIAS, WORK_ALIAS)
                .into_iter()
                .chain([table_col(OTHER_WORK_ALIAS, ctx.from).gt(table_col(WORK_ALIAS, ctx.from))])
                .chain(extra),
        )
    };

    let next_start = Query::new()
        .select(vec![min(table_col(OTHER_WORK_ALIAS, ctx.from))])
        .from(table_ref(work, OTHER_WORK_ALIAS))
        .filter_opt(later(None));
    let starts_inside = Query::new()
        .select_star()
        .from(table_ref(work, OTHER_WORK_ALIAS))
        .filter_opt(later(Some(
            table_col(OTHER_WORK_ALIAS, ctx.from).lt(table_col(WORK_ALIAS, ctx.thru)),
        )));

    Update::table(work.name())
        .schema(work.group())
        .alias(WORK_ALIAS)
        .set(ctx.thru, next_start)
        .filter(exists(starts_inside))
}

/// Work rows identical to an open main version change nothing.
fn drop_unchanged_work(ctx: &Bitemporal<'_>, work: &Dataset) -> Delete {
    let planner = ctx.planner;
    let identical = Query::new()
        .select_star()
        .from(planner.main_ref(MAIN_ALIAS))
        .filter_opt(and_all(
            [planner.is_open(MAIN_ALIAS)]
                .into_iter()
                .chain(planner.pk_match(MAIN_ALIAS, WORK_ALIAS))
                .chain([
                    table_col(MAIN_ALIAS, ctx.from).eq(table_col(WORK_ALIAS, ctx.from)),
                    table_col(MAIN_ALIAS, ctx.thru).eq(table_col(WORK_ALIAS, ctx.thru)),
                    table_col(MAIN_ALIAS, ctx.digest).eq(table_col(WORK_ALIAS, ctx.digest)),
                ]),
        ));

    let condition = match planner.not_deleted(WORK_ALIAS) {
        Some(not_deleted) => exists(identical).and(not_deleted),
        None => exists(identical),
    };
    Delete::from(work.name())
        .schema(work.group())
        .alias(WORK_ALIAS)
        .filter(condition)
}

/// Every non-delete work row becomes a new open version.
fn insert_new_intervals(ctx: &Bitemporal<'_>, work: &Dataset, temp: &Dataset) -> Insert {
    ctx.insert_into(
        temp,
        Query::new()
            .select(ctx.open_version(
                WORK_ALIAS,
                table_col(WORK_ALIAS, ctx.from),
                table_col(WORK_ALIAS, ctx.thru),
            ))
            .from(table_ref(work, WORK_ALIAS))
            .filter_opt(ctx.planner.not_deleted(WORK_ALIAS)),
    )
}

/// The part of an overlapped main row before the first work row.
fn insert_left_remnants(ctx: &Bitemporal<'_>, work: &Dataset, temp: &Dataset) -> Insert {
    let first_overlap = Query::new()
        .select(vec![min(table_col(WORK_ALIAS, ctx.from))])
        .from(table_ref(work, WORK_ALIAS))
        .filter(ctx.overlaps(WORK_ALIAS));

    ctx.insert_into(
        temp,
        Query::new()
            .select(ctx.open_version(
                MAIN_ALIAS,
                table_col(MAIN_ALIAS, ctx.from),
                first_overlap.clone().into(),
            ))
            .from(ctx.planner.main_ref(MAIN_ALIAS))
            .filter(
                ctx.planner
                    .is_open(MAIN_ALIAS)
                    .and(table_col(MAIN_ALIAS, ctx.from).lt(first_overlap)),
            ),
    )
}

/// The parts of an overlapped main row after each work row that no other
/// work row covers; each runs to the next work row or the main row's end.
fn insert_right_remnants(ctx: &Bitemporal<'_>, work: &Dataset, temp: &Dataset) -> Insert {
    let same_key = ctx.planner.pk_match(OTHER_WORK_ALIAS, MAIN_ALIAS);

    let next_start: Expr = Query::new()
        .select(vec![min(table_col(OTHER_WORK_ALIAS, ctx.from))])
        .from(table_ref(work, OTHER_WORK_ALIAS))
        .filter_opt(and_all(same_key.clone().into_iter().chain([
            table_col(OTHER_WORK_ALIAS, ctx.from).gt(table_col(WORK_ALIAS, ctx.thru)),
        ])))
        .into();
    let remnant_end = case_when(
        vec![(
            next_start
                .clone()
                .is_not_null()
                .and(next_start.clone().lt(table_col(MAIN_ALIAS, ctx.thru))),
            next_start,
        )],
        table_col(MAIN_ALIAS, ctx.thru),
    );
    let covered = Query::new()
        .select_star()
        .from(table_ref(work, OTHER_WORK_ALIAS))
        .filter_opt(and_all(same_key.into_iter().chain([
            table_col(OTHER_WORK_ALIAS, ctx.from).lte(table_col(WORK_ALIAS, ctx.thru)),
            table_col(OTHER_WORK_ALIAS, ctx.thru).gt(table_col(WORK_ALIAS, ctx.thru)),
        ])));

    ctx.insert_into(
        temp,
        Query::new()
            .select(ctx.open_version(MAIN_ALIAS, table_col(WORK_ALIAS, ctx.thru), remnant_end))
            .from(ctx.planner.main_ref(MAIN_ALIAS))
            .inner_join(table_ref(work, WORK_ALIAS), ctx.overlaps(WORK_ALIAS))
            .filter(
                ctx.planner
                    .is_open(MAIN_ALIAS)
                    .and(table_col(WORK_ALIAS, ctx.thru).lt(table_col(MAIN_ALIAS, ctx.thru)))
                    .and(not_exists(covered)),
            ),
    )
}

/// Close every open main row a work row overlaps.
fn close_overlapped(ctx: &Bitemporal<'_>, work: &Dataset) -> Update {
    ctx.close_main(exists(
        Query::new()
            .select_star()
            .from(table_ref(work, WORK_ALIAS))
            .filter(ctx.overlaps(WORK_ALIAS)),
    ))
}

fn publish_temp(ctx: &Bitemporal<'_>, temp: &Dataset) -> Insert {
    let values: Vec<Expr> = ctx
        .main_columns()
        .iter()
        .map(|c| table_col(TEMP_ALIAS, c))
        .collect();
    ctx.insert_into(
        &ctx.planner.datasets().main,
        Query::new().select(values).from(table_ref(temp, TEMP_ALIAS)),
    )
}
