use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::SchedulingError;
use std::fmt;

/// Half-open time range `[start, end)` with `start < end` enforced at
/// construction.
///
/// Every overlap and containment decision in the scheduling core goes through
/// this type; no other component compares timestamps directly. Wall-clock
/// times are anchored to a concrete calendar date via [`Interval::on_date`]
/// before any comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Wire shape for [`Interval`]; deserialization routes through
/// [`Interval::new`] so the ordering invariant holds for decoded values too.
#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for Interval {
    type Error = SchedulingError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SchedulingError> {
        if start >= end {
            return Err(SchedulingError::validation(format!(
                "interval start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Anchor wall-clock start/end times to a calendar date, interpreted as UTC.
    pub fn on_date(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self, SchedulingError> {
        Self::new(date.and_time(start).and_utc(), date.and_time(end).and_utc())
    }

    /// Interval starting at `start` and lasting `minutes`.
    pub fn from_start(start: DateTime<Utc>, minutes: i64) -> Result<Self, SchedulingError> {
        Self::new(start, start + Duration::minutes(minutes))
    }

    /// The whole calendar date `[00:00, 00:00 next day)`.
    pub fn whole_day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Two half-open intervals overlap iff `a.start < b.end && b.start < a.end`.
    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, inner: &Interval) -> bool {
        self.start <= inner.start && self.end >= inner.end
    }

    /// Union of two intervals when they overlap or touch; `None` when disjoint.
    pub fn merge(&self, other: &Interval) -> Option<Interval> {
        if self.start > other.end || other.start > self.end {
            return None;
        }
        Some(Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }

    /// Same span with the end pushed out by `minutes`. Used to test a
    /// candidate slot together with its trailing buffer.
    pub fn with_trailing(&self, minutes: i64) -> Interval {
        Interval {
            start: self.start,
            end: self.end + Duration::minutes(minutes.max(0)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn iv(start: (u32, u32), end: (u32, u32)) -> Interval {
        Interval::on_date(date(), hm(start.0, start.1), hm(end.0, end.1)).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_intervals() {
        let at = date().and_time(hm(9, 0)).and_utc();
        assert_matches!(Interval::new(at, at), Err(SchedulingError::Validation(_)));
        assert_matches!(
            Interval::on_date(date(), hm(10, 0), hm(9, 0)),
            Err(SchedulingError::Validation(_))
        );
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        let morning = iv((9, 0), (9, 30));
        let next = iv((9, 30), (10, 0));
        assert!(!morning.overlaps(&next));
        assert!(!next.overlaps(&morning));
    }

    #[test]
    fn partial_overlap_is_symmetric() {
        let a = iv((9, 0), (10, 0));
        let b = iv((9, 30), (10, 30));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn containment_allows_equal_bounds() {
        let window = iv((9, 0), (17, 0));
        assert!(window.contains(&iv((9, 0), (17, 0))));
        assert!(window.contains(&iv((10, 0), (10, 30))));
        assert!(!window.contains(&iv((8, 45), (9, 15))));
    }

    #[test]
    fn merge_joins_touching_intervals() {
        let merged = iv((9, 0), (9, 30)).merge(&iv((9, 30), (10, 0))).unwrap();
        assert_eq!(merged, iv((9, 0), (10, 0)));
        assert!(iv((9, 0), (9, 30)).merge(&iv((11, 0), (12, 0))).is_none());
    }

    #[test]
    fn deserialization_enforces_the_ordering_invariant() {
        let decoded: Interval = serde_json::from_str(
            r#"{"start":"2025-03-10T09:00:00Z","end":"2025-03-10T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(decoded, iv((9, 0), (10, 0)));

        let inverted = serde_json::from_str::<Interval>(
            r#"{"start":"2025-03-10T10:00:00Z","end":"2025-03-10T09:00:00Z"}"#,
        );
        assert!(inverted.is_err());
    }

    #[test]
    fn trailing_buffer_extends_only_the_end() {
        let slot = iv((9, 0), (9, 30));
        let buffered = slot.with_trailing(10);
        assert_eq!(buffered.start(), slot.start());
        assert_eq!(buffered.duration_minutes(), 40);
        assert!(buffered.overlaps(&iv((9, 35), (10, 0))));
    }
}
