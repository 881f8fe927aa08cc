//! `serialize_with` helpers for foreign types stored in our error and mapping
//! types, so soft-error lists and reports can be emitted as JSON

use {serde::Serializer, std::ffi::OsString};

/// Errors are written as their pretty-printed `Debug` form
fn serialize_debug<S: Serializer, E: std::fmt::Debug>(
    error: &E,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{error:#?}"))
}

pub fn serialize_io_error<S: Serializer>(
    error: &std::io::Error,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serialize_debug(error, serializer)
}

pub fn serialize_scroll_error<S: Serializer>(
    error: &scroll::Error,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serialize_debug(error, serializer)
}

pub fn serialize_goblin_error<S: Serializer>(
    error: &goblin::error::Error,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serialize_debug(error, serializer)
}

pub fn serialize_proc_error<S: Serializer>(
    error: &procfs_core::ProcError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serialize_debug(error, serializer)
}

/// Paths recorded in a core are not guaranteed to be UTF-8
pub fn serialize_os_string<S: Serializer>(
    value: &Option<OsString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(s) => serializer.serialize_some(&s.to_string_lossy()),
        None => serializer.serialize_none(),
    }
}
