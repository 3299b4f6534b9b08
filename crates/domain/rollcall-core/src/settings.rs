use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::EntryExitStatus;

pub const LAST_MINUTE_OF_DAY: u16 = 24 * 60 - 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("'{0}' is not a HH:MM clock time")]
    InvalidClock(String),
    #[error("window {start}..{end} is not within one day")]
    InvalidWindow { start: u16, end: u16 },
    #[error("unknown direction '{0}' (expected entry or exit)")]
    UnknownDirection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn status(self) -> EntryExitStatus {
        match self {
            Direction::Entry => EntryExitStatus::In,
            Direction::Exit => EntryExitStatus::Out,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Entry => f.write_str("entry"),
            Direction::Exit => f.write_str("exit"),
        }
    }
}

impl FromStr for Direction {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "in" => Ok(Direction::Entry),
            "exit" | "out" => Ok(Direction::Exit),
            other => Err(SettingsError::UnknownDirection(other.to_string())),
        }
    }
}

/// Parse `HH:MM` into minutes after midnight.
pub fn parse_clock(s: &str) -> Result<u16, SettingsError> {
    let invalid = || SettingsError::InvalidClock(s.to_string());
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    let h: u16 = h.parse().map_err(|_| invalid())?;
    let m: u16 = m.parse().map_err(|_| invalid())?;
    if h > 23 || m > 59 {
        return Err(invalid());
    }
    Ok(h * 60 + m)
}

pub fn format_clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Daily clock interval, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupWindow {
    start_minutes: u16,
    end_minutes: u16,
}

impl DedupWindow {
    pub fn new(start_minutes: u16, end_minutes: u16) -> Result<Self, SettingsError> {
        if start_minutes > end_minutes || end_minutes > LAST_MINUTE_OF_DAY {
            return Err(SettingsError::InvalidWindow {
                start: start_minutes,
                end: end_minutes,
            });
        }
        Ok(Self {
            start_minutes,
            end_minutes,
        })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, SettingsError> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start_minutes(&self) -> u16 {
        self.start_minutes
    }

    pub fn end_minutes(&self) -> u16 {
        self.end_minutes
    }

    pub fn contains(&self, minute_of_day: u16) -> bool {
        (self.start_minutes..=self.end_minutes).contains(&minute_of_day)
    }
}

impl fmt::Display for DedupWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_clock(self.start_minutes),
            format_clock(self.end_minutes)
        )
    }
}

/// School-time configuration the dedup windows are derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolSettings {
    pub entry_start: Option<String>,
    pub entry_end: Option<String>,
    pub exit_start: Option<String>,
    pub exit_end: Option<String>,
    /// Offset of the school clock from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SchoolSettings {
    /// `None` when the direction has no complete, valid window configured.
    pub fn window_for(&self, direction: Direction) -> Option<DedupWindow> {
        let (start, end) = match direction {
            Direction::Entry => (self.entry_start.as_deref()?, self.entry_end.as_deref()?),
            Direction::Exit => (self.exit_start.as_deref()?, self.exit_end.as_deref()?),
        };
        DedupWindow::parse(start, end).ok()
    }

    pub fn set_window(
        &mut self,
        direction: Direction,
        start: &str,
        end: &str,
    ) -> Result<DedupWindow, SettingsError> {
        let window = DedupWindow::parse(start, end)?;
        let (s, e) = (
            Some(format_clock(window.start_minutes)),
            Some(format_clock(window.end_minutes)),
        );
        match direction {
            Direction::Entry => {
                self.entry_start = s;
                self.entry_end = e;
            }
            Direction::Exit => {
                self.exit_start = s;
                self.exit_end = e;
            }
        }
        Ok(window)
    }

    pub fn clock_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

pub fn minute_of_day<T: Timelike>(t: &T) -> u16 {
    (t.hour() * 60 + t.minute()) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_parsing() {
        assert_eq!(parse_clock("08:05"), Ok(485));
        assert_eq!(parse_clock("23:59"), Ok(LAST_MINUTE_OF_DAY));
        assert!(parse_clock("24:00").is_err());
        assert!(parse_clock("8h30").is_err());
        assert_eq!(format_clock(485), "08:05");
    }

    #[test]
    fn window_invariant() {
        assert!(DedupWindow::new(600, 500).is_err());
        assert!(DedupWindow::new(0, 1440).is_err());
        let w = DedupWindow::parse("08:00", "08:30").unwrap();
        assert!(w.contains(480) && w.contains(510));
        assert!(!w.contains(511));
    }

    #[test]
    fn incomplete_or_inverted_window_is_unresolved() {
        let mut s = SchoolSettings {
            entry_start: Some("08:00".into()),
            ..Default::default()
        };
        assert_eq!(s.window_for(Direction::Entry), None);
        s.entry_end = Some("07:00".into());
        assert_eq!(s.window_for(Direction::Entry), None);
        s.set_window(Direction::Exit, "15:00", "15:45").unwrap();
        assert_eq!(
            s.window_for(Direction::Exit).unwrap().to_string(),
            "15:00-15:45"
        );
    }

    #[test]
    fn direction_from_str() {
        assert_eq!("IN".parse::<Direction>(), Ok(Direction::Entry));
        assert_eq!("exit".parse::<Direction>(), Ok(Direction::Exit));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
