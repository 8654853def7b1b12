//! Client-side filtering and paging over data already held in memory.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{Agenda, Call};

pub const PAGE_SIZES: [usize; 3] = [25, 50, 100];
pub const AGENDA_PAGE_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("unknown duration bucket: {0} (expected lt-60, 60-180, 180-300 or gt-300)")]
    UnknownBucket(String),
    #[error("page size must be one of 25, 50 or 100, got {0}")]
    PageSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationBucket {
    /// Under a minute.
    UnderOneMinute,
    /// 60..=180 seconds.
    OneToThreeMinutes,
    /// 181..=300 seconds.
    ThreeToFiveMinutes,
    OverFiveMinutes,
}

impl DurationBucket {
    pub fn matches(self, secs: u64) -> bool {
        match self {
            DurationBucket::UnderOneMinute => secs < 60,
            DurationBucket::OneToThreeMinutes => (60..=180).contains(&secs),
            DurationBucket::ThreeToFiveMinutes => (181..=300).contains(&secs),
            DurationBucket::OverFiveMinutes => secs > 300,
        }
    }
}

impl FromStr for DurationBucket {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lt-60" => Ok(DurationBucket::UnderOneMinute),
            "60-180" => Ok(DurationBucket::OneToThreeMinutes),
            "180-300" => Ok(DurationBucket::ThreeToFiveMinutes),
            "gt-300" => Ok(DurationBucket::OverFiveMinutes),
            other => Err(ViewError::UnknownBucket(other.to_string())),
        }
    }
}

/// Inclusive on both ends; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// An undated record only matches an open range.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        if self.is_open() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallQuery {
    /// Case-insensitive match on call id or transcript.
    pub search: Option<String>,
    pub disconnection_reason: Option<String>,
    pub duration: Option<DurationBucket>,
    pub dates: DateRange,
}

impl CallQuery {
    pub fn matches(&self, call: &Call) -> bool {
        if let Some(needle) = self.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty()) {
            let hit = call.call_id.to_lowercase().contains(&needle)
                || call
                    .transcript
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(reason) = self.disconnection_reason.as_deref() {
            if call.disconnection_reason.as_deref() != Some(reason) {
                return false;
            }
        }
        if let Some(bucket) = self.duration {
            if !bucket.matches(call.duration_seconds().unwrap_or(0)) {
                return false;
            }
        }
        self.dates.contains(call.started_at().map(|t| t.date_naive()))
    }

    pub fn apply<'a>(&self, calls: &'a [Call]) -> Vec<&'a Call> {
        calls.iter().filter(|c| self.matches(c)).collect()
    }
}

/// A window over a filtered list.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based, clamped into range.
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> Page<'_, T> {
    let pages = total_pages(items.len(), page_size);
    let number = page.clamp(1, pages.max(1));
    let start = ((number - 1) * page_size).min(items.len());
    let end = (start + page_size).min(items.len());
    Page {
        items: &items[start..end],
        number,
        total_pages: pages,
        total_items: items.len(),
    }
}

pub fn check_page_size(size: usize) -> Result<usize, ViewError> {
    if PAGE_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(ViewError::PageSize(size))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaQuery {
    pub search: Option<String>,
    pub kind: Option<String>,
    pub dates: DateRange,
}

fn contains_ci(field: &Option<String>, needle: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|v| v.to_lowercase().contains(needle))
}

/// Leading `YYYY-MM-DD` of a timestamp string.
fn leading_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

impl AgendaQuery {
    pub fn matches(&self, agenda: &Agenda) -> bool {
        if let Some(term) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = term.to_lowercase();
            let hit = contains_ci(&agenda.name, &needle)
                || agenda
                    .phone_number
                    .as_deref()
                    .is_some_and(|p| p.contains(term))
                || contains_ci(&agenda.address, &needle)
                || contains_ci(&agenda.city, &needle)
                || contains_ci(&agenda.region, &needle);
            if !hit {
                return false;
            }
        }
        if let Some(kind) = self.kind.as_deref() {
            if agenda.kind.as_deref() != Some(kind) {
                return false;
            }
        }
        self.dates
            .contains(agenda.scheduled_for.as_deref().and_then(leading_date))
    }

    pub fn apply<'a>(&self, agendas: &'a [Agenda]) -> Vec<&'a Agenda> {
        agendas.iter().filter(|a| self.matches(a)).collect()
    }
}

/// Sorted distinct non-empty agenda types.
pub fn agenda_kinds(agendas: &[Agenda]) -> Vec<String> {
    agendas
        .iter()
        .filter_map(|a| a.kind.clone())
        .filter(|k| !k.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn call(id: &str, secs: u64, day: Option<&str>) -> Call {
        Call {
            call_id: id.into(),
            duration: Some(secs as f64 * 1000.0),
            start_timestamp: day.map(|s| {
                d(s).and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp_millis()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn bucket_edges() {
        let b: DurationBucket = "60-180".parse().unwrap();
        assert!(b.matches(60) && b.matches(180) && !b.matches(181));
        let b: DurationBucket = "180-300".parse().unwrap();
        assert!(!b.matches(180) && b.matches(300));
        assert!("gt-300".parse::<DurationBucket>().unwrap().matches(301));
        assert!("lt-60".parse::<DurationBucket>().unwrap().matches(0));
        assert_eq!(
            "soon".parse::<DurationBucket>(),
            Err(ViewError::UnknownBucket("soon".into()))
        );
    }

    #[test]
    fn search_covers_id_and_transcript() {
        let mut c = call("call_ABC", 10, None);
        c.transcript = Some("Hola, quiero una CITA".into());
        let q = CallQuery {
            search: Some("cita".into()),
            ..Default::default()
        };
        assert!(q.matches(&c));
        let q = CallQuery {
            search: Some("abc".into()),
            ..Default::default()
        };
        assert!(q.matches(&c));
        let q = CallQuery {
            search: Some("zzz".into()),
            ..Default::default()
        };
        assert!(!q.matches(&c));
    }

    #[test]
    fn date_range_is_inclusive_and_skips_undated() {
        let calls = vec![
            call("a", 10, Some("2024-05-01")),
            call("b", 10, Some("2024-05-03")),
            call("c", 10, Some("2024-05-04")),
            call("d", 10, None),
        ];
        let q = CallQuery {
            dates: DateRange {
                from: Some(d("2024-05-01")),
                to: Some(d("2024-05-03")),
            },
            ..Default::default()
        };
        let ids: Vec<_> = q.apply(&calls).iter().map(|c| c.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(CallQuery::default().apply(&calls).len(), 4);
    }

    #[test]
    fn pages_clamp() {
        let items: Vec<u32> = (0..60).collect();
        let page = paginate(&items, 3, 25);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(paginate(&items, 9, 25).number, 3);
        assert_eq!(paginate::<u32>(&[], 1, 25).items.len(), 0);
        assert_eq!(check_page_size(40), Err(ViewError::PageSize(40)));
    }

    #[test]
    fn agenda_filters() {
        let agendas = vec![
            Agenda {
                name: Some("Ana Perez".into()),
                phone_number: Some("+34600111222".into()),
                kind: Some("visita".into()),
                scheduled_for: Some("2024-05-02T10:00:00Z".into()),
                ..Default::default()
            },
            Agenda {
                city: Some("Madrid".into()),
                kind: Some("llamada".into()),
                ..Default::default()
            },
        ];
        let q = AgendaQuery {
            search: Some("600111".into()),
            ..Default::default()
        };
        assert_eq!(q.apply(&agendas).len(), 1);
        let q = AgendaQuery {
            search: Some("madrid".into()),
            kind: Some("llamada".into()),
            ..Default::default()
        };
        assert_eq!(q.apply(&agendas).len(), 1);
        let q = AgendaQuery {
            dates: DateRange {
                from: Some(d("2024-05-01")),
                to: None,
            },
            ..Default::default()
        };
        assert_eq!(q.apply(&agendas).len(), 1);
        assert_eq!(agenda_kinds(&agendas), vec!["llamada", "visita"]);
    }
}
