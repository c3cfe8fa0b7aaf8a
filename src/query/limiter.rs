//! Row limiting and counting.

use crate::db::{Counts, Row, RowCursor};
use crate::error::Result;

/// What happens once the row limit has been reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Stop reading. The total is the cursor's known total, if it has one,
    /// otherwise the rows read so far.
    StopOnLimit,
    /// Keep reading to the end so the total is exact; extra rows are dropped.
    #[default]
    CountThrough,
}

/// Wraps a cursor, passing on at most `limit` rows (0 = unlimited) and
/// counting rows seen versus rows emitted.
pub struct RowLimiter<'a, C: RowCursor + ?Sized> {
    cursor: &'a mut C,
    limit: u64,
    policy: LimitPolicy,
    counts: Counts,
    exhausted: bool,
}

impl<'a, C: RowCursor + ?Sized> RowLimiter<'a, C> {
    pub fn new(cursor: &'a mut C, limit: u64, policy: LimitPolicy) -> Self {
        Self {
            cursor,
            limit,
            policy,
            counts: Counts::default(),
            exhausted: false,
        }
    }

    /// Returns the next row to emit, or `None` when iteration is over.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            if self.limit_reached() && self.policy == LimitPolicy::StopOnLimit {
                self.exhausted = true;
                if let Some(total) = self.cursor.known_total() {
                    self.counts.total_seen = self.counts.total_seen.max(total);
                }
                return Ok(None);
            }

            let Some(row) = self.cursor.next_row().await? else {
                self.exhausted = true;
                return Ok(None);
            };

            self.counts.total_seen += 1;
            if self.limit_reached() {
                continue;
            }
            self.counts.emitted += 1;
            return Ok(Some(row));
        }
    }

    /// Current counts; final once `next` has returned `None`.
    pub fn counts(&self) -> Counts {
        self.counts
    }

    fn limit_reached(&self) -> bool {
        self.limit > 0 && self.counts.emitted >= self.limit
    }
}
