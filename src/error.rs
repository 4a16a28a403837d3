//! Error taxonomy: a `quick_error!`-defined `Error` with a lightweight
//! `ErrorKind` projection for callers who only care which branch fired,
//! plus a `ValidationError` used to collect per-dataset name failures
//! before a two-phase operation (see [`crate::walk`]) commits to anything.
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type ValidationResult<T = (), E = ValidationError> = std::result::Result<T, E>;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// `namecheck` rejected a dataset name.
        DatasetName(name: String) {
            display("invalid dataset name: '{}'", name)
        }
        /// Operation expected a different `DatasetKind`.
        DatasetType(expected: &'static str, name: String) {
            display("'{}' is not a {}", name, expected)
        }
        /// Sibling name collision.
        DatasetExists(name: String) {
            display("cannot create '{}': dataset already exists", name)
        }
        /// Dataset isn't `Active` (it's `Creating`, `Destroyed`, or `PoolDestroyed`).
        InactiveDataset(name: String) {
            display("cannot access '{}': dataset is not active", name)
        }
        /// Malformed recursive args or rename target.
        InvalidArgument(msg: String) {
            display("{}", msg)
        }
        /// Archive/restore hit a node type it doesn't know how to handle.
        InvalidFileType(path: PathBuf) {
            display("'{}' is not a regular file, directory, or symlink", path.display())
        }
        /// `mount` precondition failed without `ignore_not_mountable`.
        Unmountable(reason: String) {
            display("cannot mount: {}", reason)
        }
        /// `mount` would overlay a non-empty directory.
        OverlayMount(path: PathBuf) {
            display("cannot mount: '{}' is not empty", path.display())
        }
        /// `unmount` found a mount-point strictly below this one.
        FilesystemBusy(name: String) {
            display("cannot unmount '{}': filesystem is busy", name)
        }
        /// `destroy` on a snapshot with at least one hold.
        SnapshotHold(name: String) {
            display("cannot destroy '{}': dataset is busy", name)
        }
        /// `destroy` without `recursive` over a dataset with children/snapshots.
        Descendant(name: String) {
            display("cannot destroy '{}': filesystem has children", name)
        }
        /// `destroy` of a snapshot whose clone isn't also in the destroy set.
        Dependant(snapshot: String, clone: String) {
            display("cannot destroy '{}': has dependent clone '{}'", snapshot, clone)
        }
        /// Write to a read-only property.
        ReadOnlyProperty(name: String) {
            display("cannot set property '{}': read-only", name)
        }
        /// Property not valid for this dataset type.
        UnsupportedProperty(name: String, kind: String) {
            display("property '{}' is not valid for {}", name, kind)
        }
        /// `quota`/similar couldn't be parsed as a human-readable size.
        BadHumanNumber(value: String) {
            display("'{}' is not a valid size", value)
        }
        /// `destroyPool` on a pool that doesn't exist.
        NoSuchPool(name: String) {
            display("cannot open '{}': no such pool", name)
        }
        /// A property getter outside the small supported set.
        Unimplemented(name: String) {
            display("property '{}' is not implemented", name)
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DatasetName(_) => ErrorKind::DatasetName,
            Error::DatasetType(..) => ErrorKind::DatasetType,
            Error::DatasetExists(_) => ErrorKind::DatasetExists,
            Error::InactiveDataset(_) => ErrorKind::InactiveDataset,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidFileType(_) => ErrorKind::InvalidFileType,
            Error::Unmountable(_) => ErrorKind::Unmountable,
            Error::OverlayMount(_) => ErrorKind::OverlayMount,
            Error::FilesystemBusy(_) => ErrorKind::FilesystemBusy,
            Error::SnapshotHold(_) => ErrorKind::SnapshotHold,
            Error::Descendant(_) => ErrorKind::Descendant,
            Error::Dependant(..) => ErrorKind::Dependant,
            Error::ReadOnlyProperty(_) => ErrorKind::ReadOnlyProperty,
            Error::UnsupportedProperty(..) => ErrorKind::UnsupportedProperty,
            Error::BadHumanNumber(_) => ErrorKind::BadHumanNumber,
            Error::NoSuchPool(_) => ErrorKind::NoSuchPool,
            Error::Unimplemented(_) => ErrorKind::Unimplemented,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorKind {
    DatasetName,
    DatasetType,
    DatasetExists,
    InactiveDataset,
    InvalidArgument,
    InvalidFileType,
    Unmountable,
    OverlayMount,
    FilesystemBusy,
    SnapshotHold,
    Descendant,
    Dependant,
    ReadOnlyProperty,
    UnsupportedProperty,
    BadHumanNumber,
    NoSuchPool,
    Unimplemented,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool { self.kind() == other.kind() }
}

quick_error! {
    #[derive(Debug, Eq, PartialEq, Clone)]
    pub enum ValidationError {
        NotAString(dataset: String) {
            display("'{}' is not a valid name", dataset)
        }
        Empty {
            display("dataset name cannot be empty")
        }
        NameTooLong(dataset: String) {
            display("'{}' exceeds 255 bytes", dataset)
        }
        IllegalCharacter(dataset: String) {
            display("'{}' contains an illegal character", dataset)
        }
    }
}
