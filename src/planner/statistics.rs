//! Row-count statistics read around the ingest statements.
//!
//! Deltas without transaction milestoning are counted from staging before
//! the ingest runs. Milestoned modes are counted from main afterwards,
//! through the batch stamps the ingest just wrote.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ingest_mode::IngestMode;
use crate::logical_plan::LogicalPlan;
use crate::sql::expr::{and_all, count_star, exists, not_exists, table_col, Expr, ExprExt};
use crate::sql::query::Query;

use super::append_only;
use super::nontemporal::digest_changed;
use super::{Planner, MAIN_ALIAS, STAGE_ALIAS};

const OTHER_MAIN_ALIAS: &str = "sink_next";

/// A reported ingest statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatisticName {
    IncomingRecordCount,
    RowsInserted,
    RowsUpdated,
    RowsDeleted,
    RowsTerminated,
}

impl StatisticName {
    pub const ALL: [StatisticName; 5] = [
        StatisticName::IncomingRecordCount,
        StatisticName::RowsInserted,
        StatisticName::RowsUpdated,
        StatisticName::RowsDeleted,
        StatisticName::RowsTerminated,
    ];

    /// Column alias of the count and key in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticName::IncomingRecordCount => "incomingRecordCount",
            StatisticName::RowsInserted => "rowsInserted",
            StatisticName::RowsUpdated => "rowsUpdated",
            StatisticName::RowsDeleted => "rowsDeleted",
            StatisticName::RowsTerminated => "rowsTerminated",
        }
    }
}

impl fmt::Display for StatisticName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(super) fn pre_ingest(planner: &Planner) -> BTreeMap<StatisticName, LogicalPlan> {
    let mut stats = BTreeMap::new();
    stats.insert(
        StatisticName::IncomingRecordCount,
        count_staging(planner, StatisticName::IncomingRecordCount, None),
    );

    match planner.mode() {
        IngestMode::AppendOnly(mode) => {
            stats.insert(
                StatisticName::RowsInserted,
                count_staging(
                    planner,
                    StatisticName::RowsInserted,
                    append_only::insert_condition(planner, mode),
                ),
            );
        }
        IngestMode::NontemporalDelta(_) => {
            let matched = |extra: Option<Expr>| {
                Query::new()
                    .select_star()
                    .from(planner.main_ref(MAIN_ALIAS))
                    .filter_opt(and_all(
                        planner.pk_match(MAIN_ALIAS, STAGE_ALIAS).into_iter().chain(extra),
                    ))
            };
            let not_deleted = planner.not_deleted(STAGE_ALIAS);

            stats.insert(
                StatisticName::RowsUpdated,
                count_staging(
                    planner,
                    StatisticName::RowsUpdated,
                    and_all(
                        [exists(matched(Some(digest_changed(planner))))]
                            .into_iter()
                            .chain(not_deleted.clone()),
                    ),
                ),
            );
            stats.insert(
                StatisticName::RowsInserted,
                count_staging(
                    planner,
                    StatisticName::RowsInserted,
                    and_all(
                        not_deleted
                            .into_iter()
                            .chain([not_exists(matched(None))]),
                    ),
                ),
            );
            if let Some(deleted) = planner.deleted(STAGE_ALIAS) {
                stats.insert(
                    StatisticName::RowsDeleted,
                    count_staging(
                        planner,
                        StatisticName::RowsDeleted,
                        Some(deleted.and(exists(matched(None)))),
                    ),
                );
            }
        }
        IngestMode::UnitemporalSnapshot(_)
        | IngestMode::UnitemporalDelta(_)
        | IngestMode::BitemporalSnapshot(_)
        | IngestMode::BitemporalDelta(_) => {}
    }
    stats
}

pub(super) fn post_ingest(planner: &Planner) -> BTreeMap<StatisticName, LogicalPlan> {
    match planner.mode() {
        IngestMode::AppendOnly(_) | IngestMode::NontemporalDelta(_) => BTreeMap::new(),
        IngestMode::UnitemporalSnapshot(_)
        | IngestMode::UnitemporalDelta(_)
        | IngestMode::BitemporalSnapshot(_)
        | IngestMode::BitemporalDelta(_) => milestoned_counts(planner),
    }
}

/// Counts derived from the in/out stamps of this batch:
/// updated rows were closed and reopened, terminated rows only closed.
fn milestoned_counts(planner: &Planner) -> BTreeMap<StatisticName, LogicalPlan> {
    let (tx_in, tx_out) = planner.transaction_fields();
    let opened = table_col(MAIN_ALIAS, &tx_in).eq(planner.batch_in_value());
    let closed = table_col(MAIN_ALIAS, &tx_out).eq(planner.batch_close_value());
    let reopened = Query::new()
        .select_star()
        .from(planner.main_ref(OTHER_MAIN_ALIAS))
        .filter_opt(and_all(
            planner
                .pk_match(OTHER_MAIN_ALIAS, MAIN_ALIAS)
                .into_iter()
                .chain([table_col(OTHER_MAIN_ALIAS, &tx_in).eq(planner.batch_in_value())]),
        ));

    let count_main = |condition: Expr| -> Query {
        Query::new()
            .select(vec![count_star()])
            .from(planner.main_ref(MAIN_ALIAS))
            .filter(condition)
    };
    let added = count_main(opened);
    let invalidated = count_main(closed.clone());
    let updated = count_main(closed.and(exists(reopened)));

    let difference = |minuend: &Query, name: StatisticName| {
        LogicalPlan::of(Query::new().select(vec![Expr::from(minuend.clone())
            .sub(Expr::from(updated.clone()))
            .alias(name.as_str())]))
    };

    BTreeMap::from([
        (
            StatisticName::RowsInserted,
            difference(&added, StatisticName::RowsInserted),
        ),
        (
            StatisticName::RowsTerminated,
            difference(&invalidated, StatisticName::RowsTerminated),
        ),
        (
            StatisticName::RowsUpdated,
            LogicalPlan::of(Query {
                select: vec![count_star().alias(StatisticName::RowsUpdated.as_str())],
                ..updated.clone()
            }),
        ),
    ])
}

/// `SELECT COUNT(*) AS "<name>" FROM staging AS stage WHERE ...`
fn count_staging(planner: &Planner, name: StatisticName, condition: Option<Expr>) -> LogicalPlan {
    LogicalPlan::of(
        Query::new()
            .select(vec![count_star().alias(name.as_str())])
            .from(planner.staging_ref(STAGE_ALIAS))
            .filter_opt(and_all(
                planner.staging_condition(STAGE_ALIAS).into_iter().chain(condition),
            )),
    )
}
