//! Translating mapping paths recorded in a core into paths under an
//! alternate root, for when the crashed process's filesystem is mounted
//! somewhere else on the analysis host.

use {
    super::{errors::PathError, maps_reader::MappingInfo},
    std::{
        ffi::{OsStr, OsString},
        path::{Path, PathBuf},
    },
};

pub const PATH_MAX: usize = libc::PATH_MAX as usize;

/// Prefixes `path` with `root`.
///
/// This is a plain byte concatenation, `Path::join` would throw the root away
/// since mapping paths are absolute. The result has to fit in [`PATH_MAX`]
/// bytes including a trailing NUL.
pub fn translate_path(root: Option<&Path>, path: &OsStr) -> Result<PathBuf, PathError> {
    let root = root.map(Path::as_os_str).unwrap_or_default();
    let length = root.len() + path.len();
    if length >= PATH_MAX {
        return Err(PathError::TooLong {
            length,
            max: PATH_MAX,
        });
    }

    let mut translated = OsString::with_capacity(length);
    translated.push(root);
    translated.push(path);
    Ok(PathBuf::from(translated))
}

/// Resolves the file backing `mapping`, as seen from the analysis host
pub fn resolve_mapping_path(
    root: Option<&Path>,
    mapping: &MappingInfo,
) -> Result<PathBuf, PathError> {
    let name = mapping.name.as_deref().ok_or(PathError::NoName)?;
    translate_path(root, name)
}
