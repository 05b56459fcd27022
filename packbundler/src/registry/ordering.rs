//! Version ordering and dist-tag handling.

use chrono::{DateTime, Utc};
use semver::Version;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::VersionInfo;

/// Sorts newest first.
///
/// Descending semver precedence; equal precedence falls back to descending
/// publish time with unknown times last. Strings that are not valid semver
/// sort after every valid version.
pub fn sort_versions(versions: &mut Vec<VersionInfo>) {
    let mut keyed: Vec<(Option<Version>, VersionInfo)> = versions
        .drain(..)
        .map(|v| (Version::parse(v.version.trim_start_matches('v')).ok(), v))
        .collect();

    keyed.sort_by(|(pa, a), (pb, b)| {
        let by_version = match (pa, pb) {
            (Some(pa), Some(pb)) => pb.cmp_precedence(pa),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.version.cmp(&a.version),
        };
        by_version.then_with(|| newest_first(a.created_at, b.created_at))
    });

    versions.extend(keyed.into_iter().map(|(_, v)| v));
}

fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Returns the version that `tag` points at.
#[must_use]
pub fn resolve_tag<'a>(versions: &'a [VersionInfo], tag: &str) -> Option<&'a VersionInfo> {
    versions.iter().find(|v| v.is_tagged(tag))
}

/// Builds a sorted version list from a registry document's parts.
///
/// `time` maps versions to RFC 3339 publish times; `dist_tags` maps tags to
/// versions and is inverted onto the matching entries. Tags naming a version
/// that is not listed are dropped.
pub fn build_version_list<I>(
    versions: I,
    time: &BTreeMap<String, String>,
    dist_tags: &BTreeMap<String, String>,
) -> Vec<VersionInfo>
where
    I: IntoIterator<Item = String>,
{
    let mut list: Vec<VersionInfo> = versions
        .into_iter()
        .map(|version| {
            let created_at = time
                .get(&version)
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc));
            let tags = dist_tags
                .iter()
                .filter(|(_, v)| **v == version)
                .map(|(tag, _)| tag.clone())
                .collect();
            VersionInfo {
                version,
                created_at,
                tags,
            }
        })
        .collect();

    sort_versions(&mut list);
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(versions: &[VersionInfo]) -> Vec<&str> {
        versions.iter().map(|v| v.version.as_str()).collect()
    }

    #[test]
    fn test_descending_precedence() {
        let mut versions = vec![
            VersionInfo::new("1.0.0"),
            VersionInfo::new("2.0.0"),
            VersionInfo::new("1.5.0"),
        ];
        sort_versions(&mut versions);
        assert_eq!(names(&versions), vec!["2.0.0", "1.5.0", "1.0.0"]);
    }

    #[test]
    fn test_prerelease_below_release() {
        let mut versions = vec![
            VersionInfo::new("2.0.0-rc.1"),
            VersionInfo::new("2.0.0"),
            VersionInfo::new("10.0.0"),
        ];
        sort_versions(&mut versions);
        assert_eq!(names(&versions), vec!["10.0.0", "2.0.0", "2.0.0-rc.1"]);
    }

    #[test]
    fn test_ties_broken_by_time_unknown_last() {
        let early: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
        let late: DateTime<Utc> = "2021-01-01T00:00:00Z".parse().unwrap();

        let mut a = VersionInfo::new("1.0.0+build.a");
        a.created_at = Some(early);
        let mut b = VersionInfo::new("1.0.0+build.b");
        b.created_at = Some(late);
        let c = VersionInfo::new("1.0.0+build.c");

        let mut versions = vec![c, a, b];
        sort_versions(&mut versions);
        assert_eq!(
            names(&versions),
            vec!["1.0.0+build.b", "1.0.0+build.a", "1.0.0+build.c"]
        );
    }

    #[test]
    fn test_invalid_semver_sorts_last() {
        let mut versions = vec![
            VersionInfo::new("not-a-version"),
            VersionInfo::new("0.0.1"),
            VersionInfo::new("also-bad"),
        ];
        sort_versions(&mut versions);
        assert_eq!(names(&versions), vec!["0.0.1", "not-a-version", "also-bad"]);
    }

    #[test]
    fn test_build_version_list_inverts_tags() {
        let time = BTreeMap::from([
            ("1.0.0".to_string(), "2020-01-01T00:00:00.000Z".to_string()),
            ("created".to_string(), "2019-12-31T00:00:00.000Z".to_string()),
        ]);
        let tags = BTreeMap::from([
            ("latest".to_string(), "1.1.0".to_string()),
            ("stable".to_string(), "1.1.0".to_string()),
            ("next".to_string(), "9.9.9".to_string()),
        ]);

        let list = build_version_list(
            ["1.0.0".to_string(), "1.1.0".to_string()],
            &time,
            &tags,
        );

        assert_eq!(names(&list), vec!["1.1.0", "1.0.0"]);
        assert!(list[0].is_tagged("latest"));
        assert!(list[0].is_tagged("stable"));
        assert!(list[1].tags.is_empty());
        assert!(list[1].created_at.is_some());
        assert!(list[0].created_at.is_none());
        assert_eq!(resolve_tag(&list, "latest").map(|v| v.version.as_str()), Some("1.1.0"));
        assert!(resolve_tag(&list, "next").is_none());
    }
}
