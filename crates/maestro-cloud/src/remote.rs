//! Remote task model and normalization
//!
//! Asgard reports long-running operations as tasks with a status, a list of
//! plain-text log lines and an update time. The formats are fixed:
//! log lines are `"YYYY-MM-DD_HH:MM:SS message text"` and `updateTime` is
//! `"YYYY-MM-DD HH:MM:SS UTC"`. Both are normalized to UTC timestamps on
//! every observation.

use chrono::{DateTime, NaiveDateTime, Utc};
use maestro_types::LogEntry;
use serde::{Deserialize, Serialize};

const LOG_LINE_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Remote task status as reported by Asgard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTaskStatus {
    Running,
    Completed,
    Failed,
    Terminated,
}

impl RemoteTaskStatus {
    /// A remote task is finished iff its status is one of the terminal
    /// three.
    pub fn is_finished(&self) -> bool {
        !matches!(self, RemoteTaskStatus::Running)
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, RemoteTaskStatus::Completed)
    }
}

/// The JSON document polled from a remote task url.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    pub status: RemoteTaskStatus,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(rename = "updateTime", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(rename = "durationString", skip_serializing_if = "Option::is_none")]
    pub duration_string: Option<String>,
}

impl RemoteTask {
    /// All log lines normalized into timestamped entries. Lines that do
    /// not carry a parseable date are kept with the observation time.
    pub fn normalized_log(&self) -> Vec<LogEntry> {
        self.log.iter().map(|line| parse_log_line(line)).collect()
    }
}

/// Split a remote log line once on whitespace and parse the leading date.
pub fn parse_log_line(line: &str) -> LogEntry {
    if let Some((date_part, message)) = line.split_once(char::is_whitespace) {
        if let Ok(naive) = NaiveDateTime::parse_from_str(date_part, LOG_LINE_FORMAT) {
            return LogEntry {
                date: DateTime::from_naive_utc_and_offset(naive, Utc),
                message: message.to_string(),
            };
        }
    }
    LogEntry::now(line)
}

/// Parse Asgard's `"YYYY-MM-DD HH:MM:SS UTC"` update time into ISO-8601 UTC.
pub fn parse_update_time(value: &str) -> Option<DateTime<Utc>> {
    // chrono's %Z does not parse arbitrary zone names; the wire format is
    // always UTC so strip the suffix and parse the naive part
    let trimmed = value.strip_suffix(" UTC").unwrap_or(value);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// The last path segment of a redirect location.
pub fn last_path_segment(location: &str) -> Option<&str> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// Whether a redirect location points at a task show page rather than the
/// created ASG itself.
pub fn is_task_location(location: &str) -> bool {
    location.contains("/task/")
}

/// Scan a remote task's log for the name of the ASG it created.
pub fn asg_name_from_task_log(task: &RemoteTask) -> Option<String> {
    const MARKER: &str = "Creating auto scaling group '";
    task.log.iter().find_map(|line| {
        let start = line.find(MARKER)? + MARKER.len();
        let rest = &line[start..];
        let end = rest.find('\'')?;
        Some(rest[..end].to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_log_line() {
        let entry = parse_log_line("2014-05-02_16:20:42 Creating launch configuration");
        assert_eq!(entry.message, "Creating launch configuration");
        assert_eq!(entry.date.hour(), 16);
        assert_eq!(entry.date.to_rfc3339(), "2014-05-02T16:20:42+00:00");
    }

    #[test]
    fn test_unparseable_log_line_keeps_message() {
        let entry = parse_log_line("no date here");
        assert_eq!(entry.message, "no date here");
    }

    #[test]
    fn test_parse_update_time() {
        let parsed = parse_update_time("2014-05-02 16:21:05 UTC").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2014-05-02T16:21:05+00:00");
    }

    #[test]
    fn test_finished_predicate() {
        assert!(!RemoteTaskStatus::Running.is_finished());
        assert!(RemoteTaskStatus::Completed.is_finished());
        assert!(RemoteTaskStatus::Failed.is_finished());
        assert!(RemoteTaskStatus::Terminated.is_finished());
    }

    #[test]
    fn test_asg_name_from_task_log() {
        let task = RemoteTask {
            status: RemoteTaskStatus::Completed,
            log: vec![
                "2014-05-02_16:20:42 Started".to_string(),
                "2014-05-02_16:20:43 Creating auto scaling group 'search-poke-v024'".to_string(),
            ],
            update_time: None,
            operation: None,
            duration_string: None,
        };
        assert_eq!(
            asg_name_from_task_log(&task).as_deref(),
            Some("search-poke-v024")
        );
    }

    #[test]
    fn test_location_helpers() {
        assert_eq!(
            last_path_segment("http://asgard/eu-west-1/autoScaling/show/search-poke-v001"),
            Some("search-poke-v001")
        );
        assert!(is_task_location("http://asgard/eu-west-1/task/show/1234"));
        assert!(!is_task_location(
            "http://asgard/eu-west-1/autoScaling/show/search-poke-v001"
        ));
    }
}
