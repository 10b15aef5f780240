//! Weekly posting calendar
//!
//! Static mapping from weekday to the hour windows in which publishing is
//! permitted. The calendar is injected as configuration so deployments and
//! tests can substitute their own tables; [`WeeklyCalendar::standard`] holds
//! the production posting hours.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// An inclusive hour range during which publishing is permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl PostingWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Window length in whole hours, inclusive of both ends
    pub fn duration_hours(&self) -> u32 {
        self.end_hour - self.start_hour + 1
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour <= self.end_hour
    }
}

/// Ordered posting windows for one weekday
///
/// Windows may abut or overlap at a shared boundary hour; both are active at
/// that hour and no normalization is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub windows: Vec<PostingWindow>,
}

impl DailySchedule {
    pub fn new(windows: Vec<PostingWindow>) -> Self {
        Self { windows }
    }

    /// Sum of window durations across the day
    pub fn total_hours(&self) -> u32 {
        self.windows.iter().map(PostingWindow::duration_hours).sum()
    }

    /// True if any window contains the given hour
    pub fn is_active(&self, hour: u32) -> bool {
        self.windows.iter().any(|w| w.contains_hour(hour))
    }
}

/// One [`DailySchedule`] per weekday, immutable after startup
///
/// A day left out of the config deserializes to an empty schedule and never
/// posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCalendar {
    #[serde(default)]
    pub monday: DailySchedule,
    #[serde(default)]
    pub tuesday: DailySchedule,
    #[serde(default)]
    pub wednesday: DailySchedule,
    #[serde(default)]
    pub thursday: DailySchedule,
    #[serde(default)]
    pub friday: DailySchedule,
    #[serde(default)]
    pub saturday: DailySchedule,
    #[serde(default)]
    pub sunday: DailySchedule,
}

impl WeeklyCalendar {
    pub fn for_weekday(&self, weekday: Weekday) -> &DailySchedule {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    /// A calendar with no posting windows at all
    pub fn empty() -> Self {
        Self {
            monday: DailySchedule::default(),
            tuesday: DailySchedule::default(),
            wednesday: DailySchedule::default(),
            thursday: DailySchedule::default(),
            friday: DailySchedule::default(),
            saturday: DailySchedule::default(),
            sunday: DailySchedule::default(),
        }
    }

    /// Production posting hours
    pub fn standard() -> Self {
        Self {
            monday: DailySchedule::new(vec![PostingWindow::new(10, 10), PostingWindow::new(14, 16)]),
            tuesday: DailySchedule::new(vec![
                PostingWindow::new(9, 9),
                PostingWindow::new(13, 15),
                PostingWindow::new(22, 22),
            ]),
            wednesday: DailySchedule::new(vec![
                PostingWindow::new(9, 9),
                PostingWindow::new(13, 15),
                PostingWindow::new(17, 19),
            ]),
            thursday: DailySchedule::new(vec![
                PostingWindow::new(9, 9),
                PostingWindow::new(14, 16),
                PostingWindow::new(20, 22),
            ]),
            friday: DailySchedule::new(vec![PostingWindow::new(9, 9), PostingWindow::new(14, 16)]),
            saturday: DailySchedule::new(vec![
                PostingWindow::new(13, 15),
                PostingWindow::new(19, 21),
            ]),
            sunday: DailySchedule::new(vec![PostingWindow::new(11, 16)]),
        }
    }
}

impl Default for WeeklyCalendar {
    fn default() -> Self {
        Self::standard()
    }
}
