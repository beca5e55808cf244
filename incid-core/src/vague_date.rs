//! Vague dates.
//!
//! A vague date records when something was observed when the exact day is not
//! known: a start/end range plus a type code saying how precise the range is.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Precision of a vague date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VagueDateType {
    /// A single day (`D`)
    Day,
    /// A range of days (`DD`)
    DayRange,
    /// A single month (`O`)
    Month,
    /// A range of months (`OO`)
    MonthRange,
    /// A single year (`Y`)
    Year,
    /// A range of years (`YY`)
    YearRange,
    /// Up to and including a year (`-Y`)
    ToYear,
    /// From a year onwards (`Y-`)
    FromYear,
    /// Date unknown (`U`)
    Unknown,
}

impl VagueDateType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Day => "D",
            Self::DayRange => "DD",
            Self::Month => "O",
            Self::MonthRange => "OO",
            Self::Year => "Y",
            Self::YearRange => "YY",
            Self::ToYear => "-Y",
            Self::FromYear => "Y-",
            Self::Unknown => "U",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "D" => Some(Self::Day),
            "DD" => Some(Self::DayRange),
            "O" => Some(Self::Month),
            "OO" => Some(Self::MonthRange),
            "Y" => Some(Self::Year),
            "YY" => Some(Self::YearRange),
            "-Y" => Some(Self::ToYear),
            "Y-" => Some(Self::FromYear),
            "U" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Error types for vague date validation and parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VagueDateError {
    #[error("date type is missing")]
    MissingType,

    #[error("unknown date type: {0}")]
    UnknownType(String),

    #[error("start date is missing")]
    MissingStart,

    #[error("end date is missing")]
    MissingEnd,

    #[error("start date is not allowed for this date type")]
    UnexpectedStart,

    #[error("end date is not allowed for this date type")]
    UnexpectedEnd,

    #[error("start date is after end date")]
    StartAfterEnd,

    #[error("dates do not match the date type: {0}")]
    Inconsistent(&'static str),

    #[error("cannot parse date: {0}")]
    Unparseable(String),
}

/// A start/end/type triple; every part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VagueDate {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub date_type: Option<String>,
}

fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

fn year_end(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 12, 31)
}

fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.pred_opt())
}

fn is_month_start(date: NaiveDate) -> bool {
    date.day() == 1
}

fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == Some(date)
}

fn is_year_start(date: NaiveDate) -> bool {
    date.month() == 1 && date.day() == 1
}

fn is_year_end(date: NaiveDate) -> bool {
    date.month() == 12 && date.day() == 31
}

/// Granularity of one side of a parsed date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Day,
    Month,
    Year,
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

/// Parse `dd/mm/yyyy`, `mm/yyyy` or `yyyy` into its granularity and bounds.
fn parse_part(text: &str) -> Option<(Part, NaiveDate, NaiveDate)> {
    let fields: Vec<&str> = text.trim().split('/').collect();
    match fields.as_slice() {
        [year] => {
            let year = parse_year(year)?;
            Some((Part::Year, year_start(year)?, year_end(year)?))
        }
        [month, year] => {
            let year = parse_year(year)?;
            let month: u32 = month.parse().ok()?;
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some((Part::Month, start, month_end(start)?))
        }
        [day, month, year] => {
            let year = parse_year(year)?;
            let date = NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)?;
            Some((Part::Day, date, date))
        }
        _ => None,
    }
}

impl VagueDate {
    /// Build a vague date from a type and bounds.
    pub fn new(date_type: VagueDateType, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start,
            end,
            date_type: Some(date_type.code().to_string()),
        }
    }

    /// A single-year date.
    pub fn year(year: i32) -> Self {
        Self::new(VagueDateType::Year, year_start(year), year_end(year))
    }

    /// A single-day date.
    pub fn day(date: NaiveDate) -> Self {
        Self::new(VagueDateType::Day, Some(date), Some(date))
    }

    /// True if no part of the date is set.
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.date_type.as_deref().map_or(true, |t| t.trim().is_empty())
    }

    /// Check that the bounds are consistent with the type code.
    pub fn validate(&self) -> Result<VagueDateType, VagueDateError> {
        let code = self
            .date_type
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(VagueDateError::MissingType)?;
        let date_type = VagueDateType::from_code(&code.to_ascii_uppercase())
            .ok_or_else(|| VagueDateError::UnknownType(code.to_string()))?;

        match date_type {
            VagueDateType::Unknown => {
                if self.start.is_some() {
                    return Err(VagueDateError::UnexpectedStart);
                }
                if self.end.is_some() {
                    return Err(VagueDateError::UnexpectedEnd);
                }
            }
            VagueDateType::ToYear => {
                if self.start.is_some() {
                    return Err(VagueDateError::UnexpectedStart);
                }
                let end = self.end.ok_or(VagueDateError::MissingEnd)?;
                if !is_year_end(end) {
                    return Err(VagueDateError::Inconsistent("end must be the last day of a year"));
                }
            }
            VagueDateType::FromYear => {
                if self.end.is_some() {
                    return Err(VagueDateError::UnexpectedEnd);
                }
                let start = self.start.ok_or(VagueDateError::MissingStart)?;
                if !is_year_start(start) {
                    return Err(VagueDateError::Inconsistent(
                        "start must be the first day of a year",
                    ));
                }
            }
            _ => {
                let start = self.start.ok_or(VagueDateError::MissingStart)?;
                let end = self.end.ok_or(VagueDateError::MissingEnd)?;
                if start > end {
                    return Err(VagueDateError::StartAfterEnd);
                }
                Self::check_bounds(date_type, start, end)?;
            }
        }

        Ok(date_type)
    }

    fn check_bounds(
        date_type: VagueDateType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(), VagueDateError> {
        let consistent = match date_type {
            VagueDateType::Day => start == end,
            VagueDateType::DayRange => true,
            VagueDateType::Month => {
                is_month_start(start)
                    && is_month_end(end)
                    && (start.year(), start.month()) == (end.year(), end.month())
            }
            VagueDateType::MonthRange => is_month_start(start) && is_month_end(end),
            VagueDateType::Year => {
                is_year_start(start) && is_year_end(end) && start.year() == end.year()
            }
            VagueDateType::YearRange => is_year_start(start) && is_year_end(end),
            VagueDateType::ToYear | VagueDateType::FromYear | VagueDateType::Unknown => true,
        };

        if consistent {
            Ok(())
        } else {
            Err(VagueDateError::Inconsistent(date_type.code()))
        }
    }

    /// True if the date is set and consistent.
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && self.validate().is_ok()
    }

    /// Parse a display string such as `12/03/2004`, `03/2004-05/2004`,
    /// `2004`, `-2004`, `2004-` or `Unknown`. An empty string parses to an
    /// empty date.
    pub fn parse(text: &str) -> Result<Self, VagueDateError> {
        let text = text.trim();
        let fail = || VagueDateError::Unparseable(text.to_string());

        if text.is_empty() {
            return Ok(Self::default());
        }
        if text.eq_ignore_ascii_case("unknown") {
            return Ok(Self::new(VagueDateType::Unknown, None, None));
        }
        if let Some(rest) = text.strip_prefix('-') {
            let year = parse_year(rest.trim()).ok_or_else(fail)?;
            return Ok(Self::new(VagueDateType::ToYear, None, year_end(year)));
        }
        if let Some(rest) = text.strip_suffix('-') {
            let year = parse_year(rest.trim()).ok_or_else(fail)?;
            return Ok(Self::new(VagueDateType::FromYear, year_start(year), None));
        }

        match text.split_once('-') {
            Some((from, to)) => {
                let (from_part, start, _) = parse_part(from).ok_or_else(fail)?;
                let (to_part, _, end) = parse_part(to).ok_or_else(fail)?;
                if from_part != to_part {
                    return Err(fail());
                }
                let date_type = match from_part {
                    Part::Day => VagueDateType::DayRange,
                    Part::Month => VagueDateType::MonthRange,
                    Part::Year => VagueDateType::YearRange,
                };
                let date = Self::new(date_type, Some(start), Some(end));
                date.validate()?;
                Ok(date)
            }
            None => {
                let (part, start, end) = parse_part(text).ok_or_else(fail)?;
                let date_type = match part {
                    Part::Day => VagueDateType::Day,
                    Part::Month => VagueDateType::Month,
                    Part::Year => VagueDateType::Year,
                };
                Ok(Self::new(date_type, Some(start), Some(end)))
            }
        }
    }
}

impl fmt::Display for VagueDate {
    /// Formats valid dates in the same forms [`VagueDate::parse`] accepts;
    /// empty or inconsistent dates format as an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(date_type) = self.validate() else {
            return Ok(());
        };
        let day = |d: Option<NaiveDate>| d.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default();
        let month = |d: Option<NaiveDate>| d.map(|d| d.format("%m/%Y").to_string()).unwrap_or_default();
        let year = |d: Option<NaiveDate>| d.map(|d| d.year().to_string()).unwrap_or_default();

        match date_type {
            VagueDateType::Day => write!(f, "{}", day(self.start)),
            VagueDateType::DayRange => write!(f, "{}-{}", day(self.start), day(self.end)),
            VagueDateType::Month => write!(f, "{}", month(self.start)),
            VagueDateType::MonthRange => write!(f, "{}-{}", month(self.start), month(self.end)),
            VagueDateType::Year => write!(f, "{}", year(self.start)),
            VagueDateType::YearRange => write!(f, "{}-{}", year(self.start), year(self.end)),
            VagueDateType::ToYear => write!(f, "-{}", year(self.end)),
            VagueDateType::FromYear => write!(f, "{}-", year(self.start)),
            VagueDateType::Unknown => write!(f, "Unknown"),
        }
    }
}
