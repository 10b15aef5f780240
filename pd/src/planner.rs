//! Distribution planner
//!
//! Spreads the remaining daily quota across a day's posting windows in
//! proportion to window length, then randomizes each instant so the cadence
//! does not look machine-generated. Randomness comes from a caller-supplied
//! [`Rng`] so tests can seed it.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use chrono_tz::Tz;
use rand::Rng;
use tracing::debug;

use crate::calendar::{DailySchedule, PostingWindow};

/// Maximum jitter applied to evenly spaced instants, as a fraction of the
/// spacing between them. Below 0.5 the jitter can never reorder instants.
const JITTER_FRACTION: f64 = 0.3;

/// Planned posting instants for one window
#[derive(Debug, Clone)]
pub struct SlotDistribution {
    pub window: PostingWindow,
    pub count: u32,
    pub times: Vec<DateTime<Tz>>,
}

/// Distribute `remaining_quota` across the windows of `schedule` on `date`.
///
/// The per-window count is `round(quota / total_hours * duration)`: rounded
/// counts need not sum back to the quota, and zero-count windows are
/// omitted. A day with no windows yields an empty plan. A window whose start
/// does not exist in `tz` on `date` (DST gap) is dropped.
pub fn plan_day<R: Rng + ?Sized>(
    remaining_quota: u32,
    schedule: &DailySchedule,
    date: NaiveDate,
    tz: Tz,
    rng: &mut R,
) -> Vec<SlotDistribution> {
    let total_hours = schedule.total_hours();
    if total_hours == 0 {
        debug!(%date, "plan_day: no posting windows today");
        return Vec::new();
    }

    let rate = f64::from(remaining_quota) / f64::from(total_hours);
    let mut distributions = Vec::new();

    for window in &schedule.windows {
        let count = (rate * f64::from(window.duration_hours())).round() as u32;
        if count == 0 {
            continue;
        }
        let Some(span) = WindowSpan::resolve(window, date, tz) else {
            debug!(?window, %date, "plan_day: window start unresolvable, dropping");
            continue;
        };
        let times = span.scatter(count, rng);
        distributions.push(SlotDistribution {
            window: *window,
            count,
            times,
        });
    }

    debug!(
        remaining_quota,
        total_hours,
        windows = distributions.len(),
        planned = distributions.iter().map(|d| d.count).sum::<u32>(),
        "plan_day: distribution computed"
    );
    distributions
}

/// A window projected onto a concrete calendar day
struct WindowSpan {
    start: DateTime<Tz>,
    seconds: f64,
}

impl WindowSpan {
    fn resolve(window: &PostingWindow, date: NaiveDate, tz: Tz) -> Option<Self> {
        let start = tz
            .with_ymd_and_hms(date.year(), date.month(), date.day(), window.start_hour, 0, 0)
            .earliest()?;
        Some(Self {
            start,
            seconds: f64::from(window.duration_hours()) * 3600.0,
        })
    }

    fn at(&self, offset_secs: f64) -> DateTime<Tz> {
        let clamped = offset_secs.clamp(0.0, self.seconds);
        self.start + chrono::Duration::milliseconds((clamped * 1000.0) as i64)
    }

    /// Pick `count` instants inside the span. A single instant is uniform
    /// over the whole span; multiple instants sit on `count - 1` even
    /// boundaries (both ends included) and are each jittered by up to
    /// ±30% of the spacing, clamped back into the span.
    fn scatter<R: Rng + ?Sized>(&self, count: u32, rng: &mut R) -> Vec<DateTime<Tz>> {
        if count == 1 {
            return vec![self.at(rng.random_range(0.0..=self.seconds))];
        }
        let spacing = self.seconds / f64::from(count - 1);
        let max_jitter = spacing * JITTER_FRACTION;
        (0..count)
            .map(|i| {
                let jitter = rng.random_range(-max_jitter..=max_jitter);
                self.at(f64::from(i) * spacing + jitter)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TZ: Tz = chrono_tz::America::New_York;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
    }

    fn two_window_day() -> DailySchedule {
        DailySchedule::new(vec![PostingWindow::new(9, 9), PostingWindow::new(13, 15)])
    }

    #[test]
    fn test_counts_follow_window_proportions() {
        // quota 17 over 4 hours: 4.25/h, so 1h -> 4 and 3h -> 13.
        let mut rng = StdRng::seed_from_u64(7);
        let plan = plan_day(17, &two_window_day(), date(), TZ, &mut rng);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].count, 4);
        assert_eq!(plan[1].count, 13);
        assert_eq!(plan[0].times.len(), 4);
        assert_eq!(plan[1].times.len(), 13);
    }

    #[test]
    fn test_times_stay_inside_their_windows() {
        let mut rng = StdRng::seed_from_u64(42);
        let plan = plan_day(17, &two_window_day(), date(), TZ, &mut rng);

        for dist in &plan {
            let start = TZ
                .with_ymd_and_hms(2024, 1, 9, dist.window.start_hour, 0, 0)
                .unwrap();
            let end = start + chrono::Duration::hours(i64::from(dist.window.duration_hours()));
            for time in &dist.times {
                assert!(*time >= start && *time <= end, "{time} outside {:?}", dist.window);
            }
        }
    }

    #[test]
    fn test_no_windows_yields_empty_plan() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_day(17, &DailySchedule::default(), date(), TZ, &mut rng);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_zero_quota_yields_empty_plan() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_day(0, &two_window_day(), date(), TZ, &mut rng);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_low_rate_drops_short_windows() {
        // 1 item over 4 hours: 0.25/h rounds to 0 for the 1h window and
        // to 1 for the 3h window.
        let mut rng = StdRng::seed_from_u64(3);
        let plan = plan_day(1, &two_window_day(), date(), TZ, &mut rng);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].window, PostingWindow::new(13, 15));
        assert_eq!(plan[0].count, 1);
    }

    #[test]
    fn test_same_seed_gives_same_plan() {
        let plan_a = plan_day(17, &two_window_day(), date(), TZ, &mut StdRng::seed_from_u64(99));
        let plan_b = plan_day(17, &two_window_day(), date(), TZ, &mut StdRng::seed_from_u64(99));

        let times_a: Vec<_> = plan_a.iter().flat_map(|d| d.times.clone()).collect();
        let times_b: Vec<_> = plan_b.iter().flat_map(|d| d.times.clone()).collect();
        assert_eq!(times_a, times_b);
    }

    #[test]
    fn test_multi_count_instants_keep_window_order() {
        // Jitter is capped below half the spacing, so instants never swap.
        let mut rng = StdRng::seed_from_u64(5);
        let day = DailySchedule::new(vec![PostingWindow::new(13, 15)]);
        let plan = plan_day(13, &day, date(), TZ, &mut rng);

        let times = &plan[0].times;
        for pair in times.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_single_hour_window_scatters_within_the_hour() {
        let mut rng = StdRng::seed_from_u64(11);
        let day = DailySchedule::new(vec![PostingWindow::new(9, 9)]);
        let plan = plan_day(4, &day, date(), TZ, &mut rng);

        assert_eq!(plan[0].count, 4);
        for time in &plan[0].times {
            assert!(time.hour() == 9 || (time.hour() == 10 && time.minute() == 0));
        }
    }

    proptest! {
        #[test]
        fn prop_counts_and_bounds_hold(
            quota in 0u32..60,
            start in 0u32..20,
            len in 0u32..4,
            seed in 0u64..1000,
        ) {
            let window = PostingWindow::new(start, start + len);
            let day = DailySchedule::new(vec![window]);
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = plan_day(quota, &day, date(), TZ, &mut rng);

            let expected =
                (f64::from(quota) / f64::from(day.total_hours()) * f64::from(window.duration_hours()))
                    .round() as u32;
            if expected == 0 {
                prop_assert!(plan.is_empty());
            } else {
                prop_assert_eq!(plan.len(), 1);
                prop_assert_eq!(plan[0].count, expected);
                let span_start = TZ.with_ymd_and_hms(2024, 1, 9, start, 0, 0).unwrap();
                let span_end =
                    span_start + chrono::Duration::hours(i64::from(window.duration_hours()));
                for time in &plan[0].times {
                    prop_assert!(*time >= span_start && *time <= span_end);
                }
            }
        }
    }
}
