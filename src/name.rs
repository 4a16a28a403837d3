//! Name utilities: validate a dataset name component, extract a pool name
//! from a full dataset name, and split `fs@snap` into its two halves.
use crate::error::{ValidationError, ValidationResult};
use once_cell::sync::Lazy;
use regex::Regex;

static NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-: ]+$").unwrap());

/// Validate a single name *component* (not a full `pool/a/b` path): 1-255
/// bytes, drawn from `[A-Za-z0-9_.\-: ]`.
pub fn namecheck(s: &str) -> ValidationResult {
    if s.is_empty() {
        return Err(ValidationError::Empty);
    }
    if s.len() > 255 {
        return Err(ValidationError::NameTooLong(s.to_owned()));
    }
    if !NAME_CHARS.is_match(s) {
        return Err(ValidationError::IllegalCharacter(s.to_owned()));
    }
    Ok(())
}

/// Extract the pool name from a full dataset-name string: the substring
/// before the first `/` or `@`.
pub fn poolname_of_str(full: &str) -> &str {
    let cut = full.find(|c| c == '/' || c == '@').unwrap_or_else(|| full.len());
    &full[..cut]
}

/// The last path component of a full dataset name: `tank/a/b` -> `b`,
/// `tank/a@snap` -> `snap`.
pub fn short_name(full: &str) -> &str {
    full.rsplit(|c| c == '/' || c == '@').next().unwrap_or(full)
}

/// Split `fs@snap` into `(basename, Some(snapname))`, or `(s, None)` if `s`
/// has no `@`.
pub fn split_snap(s: &str) -> (&str, Option<&str>) {
    match s.find('@') {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_full_charset() {
        assert!(namecheck("Data-Set_1.2:3 four").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Err(ValidationError::Empty), namecheck(""));
    }

    #[test]
    fn accepts_255_rejects_256() {
        let ok = "a".repeat(255);
        let bad = "a".repeat(256);
        assert!(namecheck(&ok).is_ok());
        assert!(namecheck(&bad).is_err());
    }

    #[test]
    fn rejects_illegal_character() {
        assert!(namecheck("bad/name").is_err());
        assert!(namecheck("bad@name").is_err());
        assert!(namecheck("bad*name").is_err());
    }

    #[test]
    fn poolname_stops_at_slash_or_at() {
        assert_eq!("tank", poolname_of_str("tank/foo/bar"));
        assert_eq!("tank", poolname_of_str("tank@snap"));
        assert_eq!("tank", poolname_of_str("tank"));
    }

    #[test]
    fn split_snap_splits_on_first_at() {
        assert_eq!(("tank/foo", Some("snap")), split_snap("tank/foo@snap"));
        assert_eq!(("tank/foo", None), split_snap("tank/foo"));
    }

    #[test]
    fn short_name_takes_last_component() {
        assert_eq!("b", short_name("tank/a/b"));
        assert_eq!("snap", short_name("tank/a@snap"));
        assert_eq!("tank", short_name("tank"));
    }
}
