//! `schedule.yaml` expansion into calendar event descriptors.
//!
//! ```yaml
//! events:
//!   - title: Exam
//!     date: 2025-03-14
//!     time: "09:00-12:00"
//!     location: Hall B
//!   - title: Lecture
//!     days: [Mon, Wed]
//!     start_date: 2025-01-13
//!     end_date: 2025-03-21
//!     time: "10:15-12:00"
//! ```
//!
//! Every occurrence becomes its own descriptor keyed
//! `schedule.yaml#<title>@<date>`, so a series keeps stable identities when
//! its range is extended.

use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Deserialize;

use coursesync_core::{
    discovery, Body, CanvasMeta, ContentDescriptor, ContentKind, EventSpec,
};

use crate::{io_err, DetectError};

pub const SCHEDULE_FILE: &str = "schedule.yaml";

const DEFAULT_TIME: &str = "12:00-13:00";
const DEFAULT_TITLE: &str = "Untitled Event";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Schedule {
    events: Vec<EventDef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventDef {
    title: Option<String>,
    date: Option<String>,
    days: Option<Vec<String>>,
    start_date: Option<String>,
    end_date: Option<String>,
    time: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

/// Expand `<root>/schedule.yaml` into one descriptor per occurrence.
///
/// A missing schedule yields an empty list.
pub fn expand_schedule(root: &Path) -> Result<Vec<ContentDescriptor>, DetectError> {
    let path = root.join(SCHEDULE_FILE);
    if !path.is_file() {
        tracing::info!("no {SCHEDULE_FILE} in content root, skipping calendar");
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let schedule: Schedule = serde_yaml::from_str(&text).map_err(|e| DetectError::ParseError {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let mut out = Vec::new();
    for def in &schedule.events {
        let dates = match &def.days {
            Some(days) => series_dates(def, days, &path)?,
            None => match def.date.as_deref() {
                Some(date) => vec![parse_date(date, &path)?],
                None => {
                    tracing::warn!(title = ?def.title, "event has neither `date` nor `days`, skipping");
                    continue;
                }
            },
        };
        for date in dates {
            out.push(occurrence(root, &path, def, date)?);
        }
    }
    tracing::debug!(count = out.len(), "expanded calendar events");
    Ok(out)
}

fn series_dates(def: &EventDef, days: &[String], path: &Path) -> Result<Vec<NaiveDate>, DetectError> {
    let weekdays: Vec<Weekday> = days.iter().filter_map(|d| d.parse().ok()).collect();
    let (Some(start), Some(end)) = (def.start_date.as_deref(), def.end_date.as_deref()) else {
        return Err(DetectError::ParseError {
            path: path.to_path_buf(),
            message: format!(
                "series `{}` needs start_date and end_date",
                def.title.as_deref().unwrap_or(DEFAULT_TITLE)
            ),
        });
    };
    let start = parse_date(start, path)?;
    let end = parse_date(end, path)?;

    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        if weekdays.contains(&current.weekday()) {
            dates.push(current);
        }
        current += Duration::days(1);
    }
    Ok(dates)
}

fn occurrence(
    root: &Path,
    path: &Path,
    def: &EventDef,
    date: NaiveDate,
) -> Result<ContentDescriptor, DetectError> {
    let title = def.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let time = def.time.as_deref().unwrap_or(DEFAULT_TIME);
    let (start, end) = time.split_once('-').ok_or_else(|| DetectError::ParseError {
        path: path.to_path_buf(),
        message: format!("time `{time}` is not HH:MM-HH:MM"),
    })?;
    let day = date.format("%Y-%m-%d");

    Ok(ContentDescriptor {
        kind: ContentKind::CalendarEvent,
        rel_path: format!("{}#{title}@{day}", discovery::rel_key(root, path)),
        path: path.to_path_buf(),
        order: None,
        title,
        settings: CanvasMeta::default(),
        body: Body::Event(EventSpec {
            start_at: format!("{day}T{}:00", start.trim()),
            end_at: format!("{day}T{}:00", end.trim()),
            location: def.location.clone().unwrap_or_default(),
            description: def.description.clone().unwrap_or_default(),
        }),
    })
}

fn parse_date(s: &str, path: &Path) -> Result<NaiveDate, DetectError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| DetectError::ParseError {
        path: path.to_path_buf(),
        message: format!("bad date `{s}`: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schedule(body: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SCHEDULE_FILE), body).unwrap();
        tmp
    }

    #[test]
    fn single_event_uses_default_time() {
        let tmp = schedule("events:\n  - title: Exam\n    date: 2025-03-14\n");
        let events = expand_schedule(tmp.path()).expect("expand");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rel_path, "schedule.yaml#Exam@2025-03-14");
        match &events[0].body {
            Body::Event(spec) => {
                assert_eq!(spec.start_at, "2025-03-14T12:00:00");
                assert_eq!(spec.end_at, "2025-03-14T13:00:00");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn series_expands_matching_weekdays() {
        // 2025-01-13 is a Monday.
        let tmp = schedule(
            "events:\n  - title: Lecture\n    days: [Mon, Wed]\n    start_date: 2025-01-13\n    end_date: 2025-01-22\n    time: \"10:15-12:00\"\n",
        );
        let events = expand_schedule(tmp.path()).expect("expand");
        let keys: Vec<&str> = events.iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "schedule.yaml#Lecture@2025-01-13",
                "schedule.yaml#Lecture@2025-01-15",
                "schedule.yaml#Lecture@2025-01-20",
                "schedule.yaml#Lecture@2025-01-22",
            ]
        );
    }

    #[test]
    fn missing_schedule_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(expand_schedule(tmp.path()).expect("expand").is_empty());
    }

    #[test]
    fn bad_date_reports_path() {
        let tmp = schedule("events:\n  - title: X\n    date: 14/03/2025\n");
        let err = expand_schedule(tmp.path()).unwrap_err();
        assert!(err.to_string().contains(SCHEDULE_FILE));
    }
}
