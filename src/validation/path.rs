//! Scan target path validation.
//!
//! Paths arrive as untrusted strings and end up inside engine scripts, so
//! they are checked and normalized before any job is created.

use crate::core::ValidationError;

use std::fmt;

/// Longest path the engine accepts, in characters.
pub const MAX_PATH_LEN: usize = 32_767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    /// `X:\` with the drive letter upper-cased.
    Drive(char),
    /// `/`
    Slash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedPath {
    root: Root,
    segments: Vec<String>,
}

impl ParsedPath {
    /// Parses an absolute path, dropping empty and `.` segments.
    ///
    /// Returns `None` for anything that is not drive-absolute or `/`-rooted.
    fn parse(path: &str) -> Option<Self> {
        let bytes = path.as_bytes();
        let (root, rest) = if bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && (bytes[2] == b'\\' || bytes[2] == b'/')
        {
            (Root::Drive(bytes[0].to_ascii_uppercase() as char), &path[3..])
        } else if let Some(rest) = path.strip_prefix('/') {
            (Root::Slash, rest)
        } else {
            return None;
        };

        let segments = rest
            .split(|c: char| c == '\\' || c == '/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(str::to_string)
            .collect();

        Some(Self { root, segments })
    }

    fn same_path(&self, other: &ParsedPath) -> bool {
        self.segments.len() == other.segments.len() && self.starts_with(other)
    }

    fn starts_with(&self, base: &ParsedPath) -> bool {
        if self.root != base.root || base.segments.len() > self.segments.len() {
            return false;
        }
        let case_insensitive = matches!(self.root, Root::Drive(_));
        self.segments
            .iter()
            .zip(&base.segments)
            .all(|(ours, theirs)| {
                if case_insensitive {
                    ours.to_lowercase() == theirs.to_lowercase()
                } else {
                    ours == theirs
                }
            })
    }
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Root::Drive(letter) => write!(f, "{letter}:\\{}", self.segments.join("\\")),
            Root::Slash => write!(f, "/{}", self.segments.join("/")),
        }
    }
}

/// Directories scan targets must live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// Any absolute path is allowed.
    Any,
    /// Only paths under one of these normalized roots.
    Roots(Vec<String>),
}

impl AllowList {
    /// Builds an allow-list from root entries.
    ///
    /// An entry of `*` allows everything. Entries that are not absolute are
    /// dropped; duplicates are removed.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots: Vec<ParsedPath> = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry == "*" {
                return Self::Any;
            }
            if entry.is_empty() {
                continue;
            }
            match ParsedPath::parse(entry) {
                Some(parsed) => {
                    if !roots.iter().any(|root| root.same_path(&parsed)) {
                        roots.push(parsed);
                    }
                }
                None => {
                    tracing::warn!(
                        entry = %entry,
                        "Ignoring allowed scan root that is not absolute"
                    );
                }
            }
        }
        Self::Roots(roots.iter().map(ToString::to_string).collect())
    }

    /// Parses a comma-separated list of roots.
    pub fn parse(raw: &str) -> Self {
        Self::from_entries(raw.split(','))
    }

    /// Returns `true` if no path would be allowed.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Roots(roots) if roots.is_empty())
    }

    /// Renders the list for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "*".to_string(),
            Self::Roots(roots) => roots.join(", "),
        }
    }

    fn permits(&self, path: &ParsedPath) -> bool {
        match self {
            Self::Any => true,
            Self::Roots(roots) => roots
                .iter()
                .filter_map(|root| ParsedPath::parse(root))
                .any(|root| path.starts_with(&root)),
        }
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::Roots(Vec::new())
    }
}

/// A path that passed validation, in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedPath(String);

impl ValidatedPath {
    /// Returns the normalized path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the normalized path.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checks caller-supplied scan targets.
///
/// # Examples
///
/// ```rust
/// use defenderbridge::validation::{AllowList, PathValidator};
///
/// let validator = PathValidator::new(AllowList::parse("C:\\Data"));
/// let path = validator.validate("c:/data/./inbox\\report.pdf").unwrap();
/// assert_eq!(path.as_str(), "C:\\data\\inbox\\report.pdf");
///
/// assert!(validator.validate("C:\\Data\\..\\Windows").is_err());
/// assert!(validator.validate("\\\\server\\share").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathValidator {
    allow_list: AllowList,
}

impl PathValidator {
    /// Creates a validator over the given allow-list.
    pub fn new(allow_list: AllowList) -> Self {
        Self { allow_list }
    }

    /// Creates a validator that accepts any absolute path.
    pub fn permissive() -> Self {
        Self::new(AllowList::Any)
    }

    /// Returns the allow-list in use.
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Validates and normalizes `input`.
    ///
    /// # Errors
    ///
    /// Returns the first rule the path breaks, checked in this order: empty,
    /// NUL byte, length, UNC prefix, traversal, not absolute, allow-list.
    pub fn validate(&self, input: &str) -> Result<ValidatedPath, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }
        if trimmed.contains('\0') {
            return Err(ValidationError::NullByte);
        }

        let len = trimmed.chars().count();
        if len > MAX_PATH_LEN {
            return Err(ValidationError::TooLong {
                len,
                max: MAX_PATH_LEN,
            });
        }

        if trimmed.starts_with("\\\\") || trimmed.starts_with("//") {
            return Err(ValidationError::UncRejected {
                path: trimmed.to_string(),
            });
        }

        if trimmed.contains("..\\") || trimmed.contains("../") || trimmed.ends_with("..") {
            return Err(ValidationError::Traversal {
                path: trimmed.to_string(),
            });
        }

        let parsed = ParsedPath::parse(trimmed).ok_or_else(|| ValidationError::NotAbsolute {
            path: trimmed.to_string(),
        })?;

        if !self.allow_list.permits(&parsed) {
            return Err(ValidationError::OutsideAllowList {
                path: parsed.to_string(),
                allowed: self.allow_list.describe(),
            });
        }

        Ok(ValidatedPath(parsed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any() -> PathValidator {
        PathValidator::permissive()
    }

    #[test]
    fn test_accepts_absolute_paths() {
        assert_eq!(
            any().validate("C:\\Users\\test\\file.exe").unwrap().as_str(),
            "C:\\Users\\test\\file.exe"
        );
        assert_eq!(
            any().validate("  d:/folder//file.txt ").unwrap().as_str(),
            "D:\\folder\\file.txt"
        );
        assert_eq!(any().validate("/srv/./inbox/").unwrap().as_str(), "/srv/inbox");
        assert_eq!(any().validate("C:\\").unwrap().as_str(), "C:\\");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(any().validate(""), Err(ValidationError::Empty));
        assert_eq!(any().validate("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn test_rejects_relative() {
        for path in ["relative\\path.txt", "C:", "C:file.txt", "\\Windows", "*"] {
            assert!(
                matches!(any().validate(path), Err(ValidationError::NotAbsolute { .. })),
                "{path} should be rejected as relative"
            );
        }
    }

    #[test]
    fn test_rejects_traversal() {
        for path in ["C:\\Users\\..\\secret.txt", "/srv/../etc/passwd", "C:\\Users\\.."] {
            assert!(
                matches!(any().validate(path), Err(ValidationError::Traversal { .. })),
                "{path} should be rejected as traversal"
            );
        }
        // A dot run inside a file name is not a parent reference
        assert!(any().validate("C:\\Data\\v1..2.txt").is_ok());
    }

    #[test]
    fn test_rejects_unc_and_device_paths() {
        for path in ["\\\\server\\share\\file.txt", "//server/share", "\\\\?\\C:\\x"] {
            assert!(
                matches!(any().validate(path), Err(ValidationError::UncRejected { .. })),
                "{path} should be rejected as UNC"
            );
        }
    }

    #[test]
    fn test_rejects_null_byte_and_length() {
        assert_eq!(
            any().validate("C:\\Users\\test\0file.txt"),
            Err(ValidationError::NullByte)
        );

        let long = format!("C:\\{}", "a".repeat(MAX_PATH_LEN));
        assert!(matches!(
            any().validate(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_allow_list_matches_whole_segments() {
        let validator = PathValidator::new(AllowList::parse("C:\\Temp, /srv/scans"));

        assert!(validator.validate("C:\\Temp\\a.exe").is_ok());
        assert!(validator.validate("c:\\TEMP").is_ok());
        assert!(validator.validate("/srv/scans/in/x").is_ok());

        assert!(matches!(
            validator.validate("C:\\Temp2\\a.exe"),
            Err(ValidationError::OutsideAllowList { .. })
        ));
        assert!(matches!(
            validator.validate("/srv/Scans/x"),
            Err(ValidationError::OutsideAllowList { .. })
        ));
        assert!(matches!(
            validator.validate("D:\\Temp"),
            Err(ValidationError::OutsideAllowList { .. })
        ));
    }

    #[test]
    fn test_allow_list_parsing() {
        assert_eq!(AllowList::parse("C:\\A, *"), AllowList::Any);
        assert_eq!(
            AllowList::parse("C:\\A\\, c:/a, relative, "),
            AllowList::Roots(vec!["C:\\A".to_string()])
        );
        assert!(AllowList::parse("relative").is_empty());

        // Drive roots dedupe ignoring case; slash roots keep case
        assert_eq!(
            AllowList::parse("D:\\Scans\\Inbox, d:/scans/INBOX/, /srv/a, /srv/A"),
            AllowList::Roots(vec![
                "D:\\Scans\\Inbox".to_string(),
                "/srv/a".to_string(),
                "/srv/A".to_string(),
            ])
        );

        let nothing = PathValidator::new(AllowList::parse(""));
        assert!(nothing.validate("C:\\x").is_err());
    }
}
