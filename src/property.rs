//! The property model. Value enums use `strum`'s
//! `EnumString`/`Display` for `Checksum`/`Compression`/`CanMount`/`Copies` and
//! friends: this engine only carries the handful of values it actually
//! supports, not the full real `zfs(8)` surface.
use crate::{dataset::DatasetKind, error::{Error, Result}};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr};
use strum_macros::{AsRefStr, Display, EnumString};

/// Writable properties supported by the engine.
pub const WRITABLE_PROPERTIES: &[&str] =
    &["atime", "canmount", "checksum", "compression", "copies", "mountpoint", "quota", "version",
      "volblocksize"];

/// Read-only properties.
pub const READONLY_PROPERTIES: &[&str] =
    &["type", "name", "guid", "creation", "createtxg", "mounted", "origin"];

/// The pools-root default property map.
/// Used for inheritance (`get_inheritable_value`); only the entries in
/// [`WRITABLE_PROPERTIES`]/[`READONLY_PROPERTIES`] are reachable through the
/// typed `Dataset::get`/`set_property` accessor API: the rest exist purely
/// so a generic lookup (e.g. a façade's `zfs.get` over an arbitrary property
/// name) has something to fall back to, matching real `zfs(8)`'s default
/// values.
pub static DEFAULT_PROPERTIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [("atime", "on"),
     ("canmount", "on"),
     ("checksum", "on"),
     ("compression", "off"),
     ("copies", "1"),
     ("dedup", "off"),
     ("devices", "on"),
     ("encryption", "off"),
     ("exec", "on"),
     ("keyformat", "none"),
     ("keylocation", "none"),
     ("logbias", "latency"),
     ("mlslabel", "none"),
     ("mountpoint", "/"),
     ("nbmand", "off"),
     ("normalization", "none"),
     ("overlay", "off"),
     ("primarycache", "all"),
     ("quota", "none"),
     ("readonly", "off"),
     ("recordsize", "131072"),
     ("redundant_metadata", "all"),
     ("refquota", "none"),
     ("refreservation", "none"),
     ("relatime", "off"),
     ("reservation", "none"),
     ("secondarycache", "all"),
     ("setuid", "on"),
     ("sharenfs", "off"),
     ("sharesmb", "off"),
     ("snapdev", "hidden"),
     ("snapdir", "hidden"),
     ("sync", "standard"),
     ("version", "5"),
     ("volmode", "default"),
     ("vscan", "off"),
     ("xattr", "on"),
     ("zoned", "off")]
    .iter()
    .cloned()
    .collect()
});

#[derive(AsRefStr, EnumString, Display, Eq, PartialEq, Debug, Clone, Copy)]
pub enum Atime {
    #[strum(serialize = "on")]
    On,
    #[strum(serialize = "off")]
    Off,
}
impl Default for Atime {
    fn default() -> Self { Atime::On }
}

#[derive(AsRefStr, EnumString, Display, Eq, PartialEq, Debug, Clone, Copy)]
pub enum CanMount {
    #[strum(serialize = "on")]
    On,
    #[strum(serialize = "off")]
    Off,
    #[strum(serialize = "noauto")]
    NoAuto,
}
impl Default for CanMount {
    fn default() -> Self { CanMount::On }
}

/// Checksum algorithms accepted by `namecheck`'s sibling, the property
/// validator (`on, off, fletcher2/4, sha256/512, skein,
/// edonr, noparity`).
#[derive(AsRefStr, EnumString, Display, Eq, PartialEq, Debug, Clone, Copy)]
pub enum Checksum {
    #[strum(serialize = "on")]
    On,
    #[strum(serialize = "off")]
    Off,
    #[strum(serialize = "fletcher2")]
    Fletcher2,
    #[strum(serialize = "fletcher4")]
    Fletcher4,
    #[strum(serialize = "sha256")]
    Sha256,
    #[strum(serialize = "sha512")]
    Sha512,
    #[strum(serialize = "skein")]
    Skein,
    #[strum(serialize = "edonr")]
    Edonr,
    #[strum(serialize = "noparity")]
    NoParity,
}
impl Default for Checksum {
    fn default() -> Self { Checksum::On }
}

#[derive(AsRefStr, EnumString, Display, Eq, PartialEq, Debug, Clone, Copy)]
pub enum Compression {
    #[strum(serialize = "on")]
    On,
    #[strum(serialize = "off")]
    Off,
}
impl Default for Compression {
    fn default() -> Self { Compression::Off }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Copies {
    One,
    Two,
    Three,
}
impl Default for Copies {
    fn default() -> Self { Copies::One }
}
impl Copies {
    pub fn as_u64(self) -> u64 {
        match self {
            Copies::One => 1,
            Copies::Two => 2,
            Copies::Three => 3,
        }
    }
}
impl FromStr for Copies {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1" => Ok(Copies::One),
            "2" => Ok(Copies::Two),
            "3" => Ok(Copies::Three),
            _ => Err(Error::InvalidArgument(format!("'{}' is not a valid copies value", s))),
        }
    }
}
impl fmt::Display for Copies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_u64()) }
}

/// `mountpoint`: an absolute path, or the literal `none`
/// or `legacy`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum MountPointValue {
    Path(PathBuf),
    None,
    Legacy,
}
impl FromStr for MountPointValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(MountPointValue::None),
            "legacy" => Ok(MountPointValue::Legacy),
            _ if s.starts_with('/') => Ok(MountPointValue::Path(PathBuf::from(s))),
            _ => Err(Error::InvalidArgument(format!(
                "'{}' must be an absolute path, 'none', or 'legacy'",
                s
            ))),
        }
    }
}
impl fmt::Display for MountPointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountPointValue::Path(p) => write!(f, "{}", p.display()),
            MountPointValue::None => write!(f, "none"),
            MountPointValue::Legacy => write!(f, "legacy"),
        }
    }
}

/// `quota`: a human-readable number (`\d+[bkmgtpe]?`) or
/// `none`. Filesystem-only.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum QuotaValue {
    Bytes(u64),
    None,
}
impl fmt::Display for QuotaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaValue::Bytes(n) => write!(f, "{}", n),
            QuotaValue::None => write!(f, "none"),
        }
    }
}

static HUMAN_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(\d+)([bkmgtpe])?$").unwrap());

/// Parse a human-readable size, same grammar as the `quota`
/// column.
pub fn parse_human_number(value: &str) -> Result<u64> {
    if value == "none" {
        return Ok(0);
    }
    let caps = HUMAN_NUMBER.captures(value).ok_or_else(|| Error::BadHumanNumber(value.to_owned()))?;
    let digits: u64 =
        caps[1].parse().map_err(|_| Error::BadHumanNumber(value.to_owned()))?;
    let mult: u64 = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1,
        Some(ref s) if s == "b" => 1,
        Some(ref s) if s == "k" => 1024,
        Some(ref s) if s == "m" => 1024u64.pow(2),
        Some(ref s) if s == "g" => 1024u64.pow(3),
        Some(ref s) if s == "t" => 1024u64.pow(4),
        Some(ref s) if s == "p" => 1024u64.pow(5),
        Some(ref s) if s == "e" => 1024u64.pow(6),
        Some(_) => return Err(Error::BadHumanNumber(value.to_owned())),
    };
    digits.checked_mul(mult).ok_or_else(|| Error::BadHumanNumber(value.to_owned()))
}

pub fn parse_quota(value: &str) -> Result<QuotaValue> {
    if value == "none" {
        Ok(QuotaValue::None)
    } else {
        parse_human_number(value).map(QuotaValue::Bytes)
    }
}

/// A validated, typed property value, as stored in [`crate::dataset::Dataset::local`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Atime(Atime),
    CanMount(CanMount),
    Checksum(Checksum),
    Compression(Compression),
    Copies(Copies),
    MountPoint(MountPointValue),
    Quota(QuotaValue),
    Version(u64),
    VolBlockSize(u64),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Atime(v) => write!(f, "{}", v),
            PropertyValue::CanMount(v) => write!(f, "{}", v),
            PropertyValue::Checksum(v) => write!(f, "{}", v),
            PropertyValue::Compression(v) => write!(f, "{}", v),
            PropertyValue::Copies(v) => write!(f, "{}", v),
            PropertyValue::MountPoint(v) => write!(f, "{}", v),
            PropertyValue::Quota(v) => write!(f, "{}", v),
            PropertyValue::Version(v) => write!(f, "{}", v),
            PropertyValue::VolBlockSize(v) => write!(f, "{}", v),
        }
    }
}

/// Where a property's value came from (`getInheritableValue`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySource {
    Local,
    Default,
    Inherited(String),
}

/// Parse and validate a raw property write, dispatching on name: raw string
/// in, typed value out, for a `set`, not a `get`.
///
/// `creating` mirrors `create`'s "allowing creation-only setters to
/// distinguish via `state == creating`" for `volblocksize`.
pub fn validate_and_parse(
    name: &str,
    raw: &str,
    kind: DatasetKind,
    creating: bool,
) -> Result<PropertyValue> {
    if READONLY_PROPERTIES.contains(&name) {
        return Err(Error::ReadOnlyProperty(name.to_owned()));
    }
    match name {
        "atime" => raw.parse::<Atime>().map(PropertyValue::Atime).map_err(|_| invalid(name, raw)),
        "canmount" => {
            raw.parse::<CanMount>().map(PropertyValue::CanMount).map_err(|_| invalid(name, raw))
        },
        "checksum" => {
            raw.parse::<Checksum>().map(PropertyValue::Checksum).map_err(|_| invalid(name, raw))
        },
        "compression" => raw
            .parse::<Compression>()
            .map(PropertyValue::Compression)
            .map_err(|_| invalid(name, raw)),
        "copies" => raw.parse::<Copies>().map(PropertyValue::Copies),
        "mountpoint" => {
            if kind != DatasetKind::Filesystem {
                return Err(Error::UnsupportedProperty(name.to_owned(), kind.to_string()));
            }
            raw.parse::<MountPointValue>().map(PropertyValue::MountPoint)
        },
        "quota" => {
            if kind != DatasetKind::Filesystem {
                return Err(Error::UnsupportedProperty(name.to_owned(), kind.to_string()));
            }
            parse_quota(raw).map(PropertyValue::Quota)
        },
        "version" => {
            raw.parse::<u64>().map(PropertyValue::Version).map_err(|_| invalid(name, raw))
        },
        "volblocksize" => {
            if kind != DatasetKind::Volume {
                return Err(Error::UnsupportedProperty(name.to_owned(), kind.to_string()));
            }
            if !creating {
                return Err(Error::InvalidArgument(
                    "volblocksize can only be set during creation".to_owned(),
                ));
            }
            raw.parse::<u64>().map(PropertyValue::VolBlockSize).map_err(|_| invalid(name, raw))
        },
        _ => Err(Error::Unimplemented(name.to_owned())),
    }
}

fn invalid(name: &str, raw: &str) -> Error {
    Error::InvalidArgument(format!("'{}' is not a valid value for '{}'", raw, name))
}
