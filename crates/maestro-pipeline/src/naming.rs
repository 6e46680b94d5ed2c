//! Deterministic successor naming for ASGs and launch configurations
//!
//! ASG names follow `<application>-<environment>[-vNNN]` with a
//! zero-padded three-digit iteration. The successor of a bare
//! `<application>-<environment>` is `v001`; the successor of `vNNN` is
//! `vNNN+1`. Names that match none of the accepted grammars are treated as
//! "no predecessor" by callers.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Parsed components of an ASG name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsgName {
    pub application: String,
    pub environment: String,
    pub iteration: Option<u32>,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // bare, -vNNN, or -vNNN-<timestamp>
        Regex::new(r"^([a-z]+)-([a-z]+)(?:-v(\d{3})(?:-(\d+))?)?$").unwrap()
    })
}

/// Parse an ASG name against the three accepted grammars. Returns `None`
/// for anything else.
pub fn parse_asg_name(name: &str) -> Option<AsgName> {
    let captures = name_pattern().captures(name)?;
    Some(AsgName {
        application: captures[1].to_string(),
        environment: captures[2].to_string(),
        iteration: captures.get(3).map(|m| m.as_str().parse().unwrap_or(0)),
    })
}

/// The name of the ASG that succeeds the given predecessor; with no
/// predecessor the iteration starts at `v001`.
pub fn next_asg_name(application: &str, environment: &str, previous: Option<&str>) -> String {
    let iteration = previous
        .and_then(parse_asg_name)
        .and_then(|parsed| parsed.iteration)
        .map(|n| n + 1)
        .unwrap_or(1);
    format!("{application}-{environment}-v{iteration:03}")
}

/// Launch configuration name: the ASG name with a UTC timestamp suffix.
pub fn launch_configuration_name(asg_name: &str, at: DateTime<Utc>) -> String {
    format!("{asg_name}-{}", at.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_bare_name() {
        let parsed = parse_asg_name("search-poke").unwrap();
        assert_eq!(parsed.application, "search");
        assert_eq!(parsed.environment, "poke");
        assert_eq!(parsed.iteration, None);
    }

    #[test]
    fn test_parse_versioned_name() {
        let parsed = parse_asg_name("search-poke-v023").unwrap();
        assert_eq!(parsed.iteration, Some(23));
    }

    #[test]
    fn test_parse_versioned_name_with_timestamp() {
        let parsed = parse_asg_name("search-poke-v023-20140502162042").unwrap();
        assert_eq!(parsed.iteration, Some(23));
    }

    #[test]
    fn test_parse_rejects_other_grammars() {
        assert!(parse_asg_name("search").is_none());
        assert!(parse_asg_name("search-poke-v23").is_none());
        assert!(parse_asg_name("search-poke-extra").is_none());
        assert!(parse_asg_name("Search-poke").is_none());
        assert!(parse_asg_name("search-poke-v001-").is_none());
    }

    #[test]
    fn test_successor_of_bare_name() {
        assert_eq!(
            next_asg_name("search", "poke", Some("search-poke")),
            "search-poke-v001"
        );
    }

    #[test]
    fn test_successor_increments() {
        assert_eq!(
            next_asg_name("search", "poke", Some("search-poke-v023")),
            "search-poke-v024"
        );
    }

    #[test]
    fn test_first_deployment_starts_at_v001() {
        assert_eq!(next_asg_name("search", "poke", None), "search-poke-v001");
    }

    #[test]
    fn test_launch_configuration_name() {
        let at = Utc.with_ymd_and_hms(2014, 5, 2, 16, 20, 42).unwrap();
        assert_eq!(
            launch_configuration_name("search-poke-v024", at),
            "search-poke-v024-20140502162042"
        );
    }
}
