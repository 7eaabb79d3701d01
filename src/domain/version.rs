//! Module versions and release ordering

use std::fmt;
use std::path::{Component, Path};

/// Version of a module, as read from its install path or metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Known(String),
    /// No version could be extracted; never compared against other versions
    Unknown,
}

impl Version {
    pub fn is_known(&self) -> bool {
        matches!(self, Version::Known(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Version::Known(v) => v,
            Version::Unknown => "unknown",
        }
    }

    pub fn release_key(&self) -> Option<ReleaseKey> {
        match self {
            Version::Known(v) => Some(ReleaseKey::new(v)),
            Version::Unknown => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits an install path into `(module name, version)`.
///
/// Two layouts are recognised, tried in this order:
/// - `<name>/<version>`: last segment starts with a digit, e.g. `asyn/4-21`
/// - `<name>-<version>`: last segment is `foo-1.2`
///
/// Anything else yields the last segment as name and [`Version::Unknown`].
pub fn classify_path(path: &Path) -> (Option<String>, Version) {
    let mut segments = path.components().rev().filter_map(|c| match c {
        Component::Normal(s) => s.to_str(),
        _ => None,
    });

    let Some(last) = segments.next() else {
        return (None, Version::Unknown);
    };

    if looks_like_version(last) {
        if let Some(name) = segments.next() {
            return (Some(name.to_string()), Version::Known(last.to_string()));
        }
    }

    if let Some((name, version)) = split_name_version(last) {
        return (Some(name.to_string()), Version::Known(version.to_string()));
    }

    (Some(last.to_string()), Version::Unknown)
}

fn looks_like_version(segment: &str) -> bool {
    segment.starts_with(|c: char| c.is_ascii_digit())
}

fn split_name_version(segment: &str) -> Option<(&str, &str)> {
    segment
        .match_indices('-')
        .map(|(i, _)| i)
        .find(|&i| i > 0 && looks_like_version(&segment[i + 1..]))
        .map(|i| (&segment[..i], &segment[i + 1..]))
}

/// Sortable form of a release tag.
///
/// `4-5beta2dls1-3` splits at the first `dls` into a release part and a local
/// build part. Each part yields up to four `(number, suffix)` pairs; a plain
/// number gets the suffix `z` so that `2-0beta1` sorts before `2-0`. Parts are
/// padded to three pairs and the whole key to six.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseKey(Vec<(u64, String)>);

impl ReleaseKey {
    pub fn new(release: &str) -> Self {
        let mut components = Vec::with_capacity(6);
        for part in release.splitn(2, "dls") {
            let part = part.replace(['.', '_'], "-");
            for sub in part.splitn(4, '-') {
                let digits = sub.len() - sub.trim_start_matches(|c: char| c.is_ascii_digit()).len();
                if digits > 0 {
                    let number = sub[..digits].parse().unwrap_or(u64::MAX);
                    let suffix = match &sub[digits..] {
                        "" => "z",
                        s => s,
                    };
                    components.push((number, suffix.to_string()));
                } else {
                    components.push((0, sub.to_string()));
                }
            }
            pad(&mut components, 3);
        }
        pad(&mut components, 6);
        Self(components)
    }
}

fn pad(components: &mut Vec<(u64, String)>, len: usize) {
    while components.len() < len {
        components.push((0, String::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/opt/modules/foo-1.2", Some("foo"), Version::Known("1.2".into()))]
    #[case("/prod/support/asyn/4-21", Some("asyn"), Version::Known("4-21".into()))]
    #[case("/prod/support/motor/6-3dls1", Some("motor"), Version::Known("6-3dls1".into()))]
    #[case("/work/support/calc", Some("calc"), Version::Unknown)]
    #[case("/work/support/my-module", Some("my-module"), Version::Unknown)]
    #[case("/", None, Version::Unknown)]
    fn given_install_path_when_classifying_then_extracts_name_and_version(
        #[case] path: &str,
        #[case] name: Option<&str>,
        #[case] version: Version,
    ) {
        let (n, v) = classify_path(Path::new(path));
        assert_eq!(n.as_deref(), name);
        assert_eq!(v, version);
    }

    #[rstest]
    #[case("1-0", "1-1")]
    #[case("2-0beta1", "2-0")]
    #[case("9", "10")]
    #[case("4-5", "4-5dls1")]
    #[case("4-5dls1", "4-5dls2")]
    #[case("1.2", "1.10")]
    fn given_two_releases_when_comparing_then_orders_lowest_first(
        #[case] lower: &str,
        #[case] higher: &str,
    ) {
        assert!(ReleaseKey::new(lower) < ReleaseKey::new(higher));
        assert!(ReleaseKey::new(higher) > ReleaseKey::new(lower));
    }

    #[test]
    fn given_equivalent_separators_when_comparing_then_equal() {
        assert_eq!(ReleaseKey::new("1.2"), ReleaseKey::new("1-2"));
        assert_eq!(ReleaseKey::new("1_2"), ReleaseKey::new("1-2"));
    }

    #[test]
    fn given_unknown_version_when_displaying_then_prints_unknown() {
        assert_eq!(Version::Unknown.to_string(), "unknown");
        assert!(Version::Unknown.release_key().is_none());
    }
}
