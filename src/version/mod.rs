//! Version parsing and ordering for release tags.
//!
//! Release tags come from humans, so parsing never fails. The rules:
//!
//! - Leading non-digit characters are stripped (`v1.2.0`, `release-1.2.0`)
//! - Dot-separated numeric components compare numerically (`1.10.0 > 1.9.0`)
//! - Missing trailing components are zero (`1.2 == 1.2.0`)
//! - A `-tag`, or text glued to the last number (`1.2rc1`), marks a pre-release,
//!   which sorts below the same numbers without one
//! - `+build` metadata is kept for display but ignored when ordering
//! - Strings with no leading number parse to [`Version::Unknown`], which sorts
//!   below every parsed version; two unknowns compare lexicographically
//!
//! # Examples
//!
//! ```rust
//! use launchkit::version::Version;
//! use std::cmp::Ordering;
//!
//! assert!(Version::parse("1.2.3") < Version::parse("1.10.0"));
//! assert_eq!(Version::parse("v2.0.0").cmp(&Version::parse("2.0.0")), Ordering::Equal);
//! assert!(Version::parse("1.0.0-beta") < Version::parse("1.0.0"));
//! assert!(Version::parse("nightly") < Version::parse("0.0.1"));
//! ```

use semver::Prerelease;
use std::cmp::Ordering;
use std::fmt;

/// A parsed version tag.
#[derive(Debug, Clone)]
pub enum Version {
    /// Numeric components plus optional pre-release and build tags.
    Semantic {
        components: Vec<u64>,
        pre: Option<String>,
        build: Option<String>,
    },
    /// Anything without a leading number; keeps the raw text for fallback ordering.
    Unknown(String),
}

impl Version {
    /// Parse a version string. Never fails.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let start = match trimmed.find(|c: char| c.is_ascii_digit()) {
            Some(idx) => idx,
            None => return Self::Unknown(trimmed.to_string()),
        };
        let body = &trimmed[start..];

        let (body, build) = match body.split_once('+') {
            Some((head, build)) => (head, Some(build.to_string())),
            None => (body, None),
        };
        let (numbers, pre) = match body.split_once('-') {
            Some((head, pre)) if !pre.is_empty() => (head, Some(pre)),
            Some((head, _)) => (head, None),
            None => (body, None),
        };

        let mut components = Vec::new();
        let mut rest = numbers;
        loop {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if end == 0 {
                break;
            }
            match rest[..end].parse::<u64>() {
                Ok(n) => components.push(n),
                Err(_) => return Self::Unknown(trimmed.to_string()),
            }
            rest = &rest[end..];
            match rest.strip_prefix('.') {
                Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
                _ => break,
            }
        }

        // "1.2rc1" carries its pre-release tag without a separator
        let tail = rest.trim_start_matches(['.', '_']);
        let pre = match (tail.is_empty(), pre) {
            (true, pre) => pre.map(str::to_string),
            (false, None) => Some(tail.to_string()),
            (false, Some(pre)) => Some(format!("{tail}-{pre}")),
        };

        if components.is_empty() {
            return Self::Unknown(trimmed.to_string());
        }

        Self::Semantic {
            components,
            pre,
            build,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Numeric component at `idx`, zero when absent.
    fn component(components: &[u64], idx: usize) -> u64 {
        components.get(idx).copied().unwrap_or(0)
    }
}

/// Three-way comparison of two versions.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// Whether `candidate` is strictly newer than `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    Version::parse(candidate) > Version::parse(current)
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    match (Prerelease::new(a), Prerelease::new(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unknown(a), Self::Unknown(b)) => a.cmp(b),
            (Self::Unknown(_), Self::Semantic {
                ..
            }) => Ordering::Less,
            (Self::Semantic {
                ..
            }, Self::Unknown(_)) => Ordering::Greater,
            (
                Self::Semantic {
                    components: a,
                    pre: pre_a,
                    ..
                },
                Self::Semantic {
                    components: b,
                    pre: pre_b,
                    ..
                },
            ) => {
                let len = a.len().max(b.len());
                for idx in 0..len {
                    match Self::component(a, idx).cmp(&Self::component(b, idx)) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }

                match (pre_a, pre_b) {
                    (None, None) => Ordering::Equal,
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(a), Some(b)) => compare_prerelease(a, b),
                }
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "{raw}"),
            Self::Semantic {
                components,
                pre,
                build,
            } => {
                let numbers: Vec<String> = components.iter().map(ToString::to_string).collect();
                write!(f, "{}", numbers.join("."))?;
                if let Some(pre) = pre {
                    write!(f, "-{pre}")?;
                }
                if let Some(build) = build {
                    write!(f, "+{build}")?;
                }
                Ok(())
            }
        }
    }
}
