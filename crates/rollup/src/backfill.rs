//! Backfill: re-run one domain's daily rebuild over a date range.
//!
//! Days are independent; a failed day is recorded and the backfill moves on,
//! so a partial failure can be retried for just the dates it names.

use chrono::NaiveDate;
use tracing::{error, info};

use engine_core::window::date_range;
use engine_core::{BackfillSummary, Result};

use crate::engine::{DomainEngine, RollupRunner};

pub async fn run_backfill(
    runner: &RollupRunner,
    engine: &dyn DomainEngine,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<BackfillSummary> {
    let mut summary = BackfillSummary::default();

    for date in date_range(from, to) {
        match runner.run_for_date(engine, date).await {
            Ok(day) => {
                summary.days_ok += 1;
                summary.totals.absorb(&day);
            }
            Err(e) => {
                error!(
                    domain = engine.domain(),
                    date = %date,
                    error = %e,
                    "backfill day failed"
                );
                summary.days_failed += 1;
                summary.failed_dates.push(date);
            }
        }
    }

    info!(
        domain = engine.domain(),
        from = %from,
        to = %to,
        days_ok = summary.days_ok,
        days_failed = summary.days_failed,
        rollup_rows = summary.totals.rollup_rows,
        "backfill complete"
    );
    Ok(summary)
}
