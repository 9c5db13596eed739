//! Route handlers, grouped by the part of the realm they touch.

use chrono::{DateTime, Duration, Utc};

use crate::api::error::{ApiError, ApiResult};

pub mod military;
pub mod players;
pub mod quests;
pub mod social;
pub mod world;

/// `start` plus `hours`, or `InvalidInput` when the end lies past the last
/// representable instant.
fn ends_after(start: DateTime<Utc>, hours: u32) -> ApiResult<DateTime<Utc>> {
    start
        .checked_add_signed(Duration::hours(i64::from(hours)))
        .ok_or_else(|| ApiError::invalid("durationHours is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_time_overflow_is_rejected() {
        let now = Utc::now();
        assert_eq!(ends_after(now, 2).unwrap(), now + Duration::hours(2));
        assert!(ends_after(now, u32::MAX).is_err());
    }
}
