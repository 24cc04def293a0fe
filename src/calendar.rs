use crate::attendance::date_key;
use crate::model::Attendance;
use chrono::{Datelike, Local, Months, NaiveDate};
use serde::Serialize;

const MONTH_NAMES: [&str; 12] = [
    "Janvier",
    "Février",
    "Mars",
    "Avril",
    "Mai",
    "Juin",
    "Juillet",
    "Août",
    "Septembre",
    "Octobre",
    "Novembre",
    "Décembre",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("month step must be +1 or -1, got {0}")]
    BadStep(i64),
    #[error("day {day} is outside {year}-{month:02} (1..={days})")]
    DayOutOfRange {
        year: i32,
        month: u32,
        day: u32,
        days: u32,
    },
    #[error("month out of supported range")]
    OutOfRange,
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub day: u32,
    pub date: String,
    pub selected: bool,
    pub today: bool,
    pub has_activity: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub label: String,
    /// Empty cells before the 1st in a Monday-first week.
    pub leading_blanks: u32,
    pub days_in_month: u32,
    pub selected_date: String,
    pub days: Vec<CalendarDay>,
}

/// `(visible_month, selected_date)` navigation state. Moving the month never
/// touches the selection and selecting a day never moves the month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarNav {
    visible_month: NaiveDate,
    selected: NaiveDate,
    today: NaiveDate,
}

impl CalendarNav {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            visible_month: first_of_month(today),
            selected: today,
            today,
        }
    }

    pub fn starting_today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn visible_month(&self) -> (i32, u32) {
        (self.visible_month.year(), self.visible_month.month())
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected
    }

    pub fn change_month(&mut self, step: i64) -> Result<(), CalendarError> {
        let next = match step {
            1 => self.visible_month.checked_add_months(Months::new(1)),
            -1 => self.visible_month.checked_sub_months(Months::new(1)),
            other => return Err(CalendarError::BadStep(other)),
        };
        self.visible_month = next.ok_or(CalendarError::OutOfRange)?;
        Ok(())
    }

    pub fn select_day(&mut self, day: u32) -> Result<NaiveDate, CalendarError> {
        let (year, month) = self.visible_month();
        let days = days_in_month(year, month);
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .filter(|_| day >= 1 && day <= days)
            .ok_or(CalendarError::DayOutOfRange {
                year,
                month,
                day,
                days,
            })?;
        self.selected = date;
        Ok(date)
    }

    pub fn month_view(&self, attendance: &Attendance) -> MonthView {
        let (year, month) = self.visible_month();
        let days = days_in_month(year, month);
        let cells = (1..=days)
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .map(|date| CalendarDay {
                day: date.day(),
                date: date_key(date),
                selected: date == self.selected,
                today: date == self.today,
                has_activity: attendance.has_activity(date),
            })
            .collect();
        MonthView {
            year,
            month,
            label: format!("{} {}", MONTH_NAMES[(month - 1) as usize], year),
            leading_blanks: self.visible_month.weekday().num_days_from_monday(),
            days_in_month: days,
            selected_date: date_key(self.selected),
            days: cells,
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
