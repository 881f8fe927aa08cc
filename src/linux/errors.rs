use {
    super::{notes::NoteType, serializers::*},
    crate::Pid,
    error_graph::ErrorList,
    std::path::PathBuf,
    thiserror::Error,
};

#[derive(Debug, Error, serde::Serialize)]
pub enum InitError {
    #[error("init() was already called on this dumper")]
    AlreadyInitialized,
    #[error("procfs snapshot directory {} is not accessible", .0.display())]
    SnapshotDirectory(
        PathBuf,
        #[source]
        #[serde(serialize_with = "serialize_io_error")]
        std::io::Error,
    ),
    #[error("procfs snapshot path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed to load the core file")]
    CoreReader(#[from] CoreReaderError),
    #[error("core file contains no NT_PRSTATUS notes")]
    NoThreads,
    #[error("failed to build the mapping table")]
    MapsReader(#[from] MapsReaderError),
    #[error("errors occurred while parsing core notes")]
    NoteErrors(#[source] ErrorList<NoteError>),
    #[error("failed to read the snapshot auxv file")]
    ReadSnapshotAuxvFailed(#[source] AuxvError),
    #[error("failed to read the snapshot status file")]
    ReadSnapshotStatusFailed(#[source] SnapshotError),
}

#[derive(Debug, Error, serde::Serialize)]
pub enum CoreReaderError {
    #[error("failed to open core file {}", .0.display())]
    Open(
        PathBuf,
        #[source]
        #[serde(serialize_with = "serialize_io_error")]
        std::io::Error,
    ),
    #[error("failed to map core file into memory")]
    Mmap(
        #[source]
        #[serde(serialize_with = "serialize_io_error")]
        std::io::Error,
    ),
    #[error("file does not start with the ELF magic")]
    NotElf,
    #[error("unsupported ELF class {0}, only 64-bit cores can be read")]
    UnsupportedClass(u8),
    #[error("unsupported ELF version {0}")]
    UnsupportedVersion(u32),
    #[error("ELF file is not a core file (e_type {0})")]
    NotCore(u16),
    #[error("unsupported machine type {0}")]
    UnsupportedMachine(u16),
    #[error("program header entry size is {actual}, expected {expected}")]
    ProgramHeaderSize { actual: u16, expected: usize },
    #[error("program header table ({count} entries at {offset:#x}) exceeds the file size {file_size}")]
    ProgramHeadersOutOfBounds {
        offset: u64,
        count: usize,
        file_size: usize,
    },
    #[error("e_phnum is PN_XNUM but section header 0 at {shoff:#x} is missing")]
    MissingExtendedPhnum { shoff: u64 },
    #[error("PT_NOTE segment at {offset:#x} ({size} bytes) exceeds the file size {file_size}")]
    NoteSegmentOutOfBounds {
        offset: u64,
        size: u64,
        file_size: usize,
    },
    #[error("core file contains no PT_NOTE segment")]
    NoNoteSegment,
    #[error("failed to parse ELF headers")]
    Goblin(
        #[from]
        #[serde(serialize_with = "serialize_goblin_error")]
        goblin::error::Error,
    ),
    #[error("failed to parse core notes")]
    Note(#[from] NoteError),
}

#[derive(Debug, Error, serde::Serialize)]
pub enum NoteError {
    #[error("note header at offset {0:#x} is truncated")]
    TruncatedHeader(usize),
    #[error("note at offset {offset:#x} declares {declared} bytes but only {remaining} remain in the segment")]
    Overrun {
        offset: usize,
        declared: u64,
        remaining: usize,
    },
    #[error("{kind:?} descriptor is {actual} bytes, expected {expected}")]
    UnexpectedSize {
        kind: NoteType,
        actual: usize,
        expected: usize,
    },
    #[error("NT_FILE note declares {count} entries which do not fit in {size} bytes")]
    FileNoteTooSmall { count: u64, size: usize },
    #[error("NT_FILE entry {index} ends ({end:#x}) before it starts ({start:#x})")]
    FileNoteInvalidRange { index: usize, start: u64, end: u64 },
    #[error("NT_FILE entry {index} has an offset that overflows")]
    FileNoteOffsetOverflow { index: usize },
    #[error("NT_FILE note has {expected} entries but only {found} names")]
    FileNoteMissingNames { expected: usize, found: usize },
    #[error("failed to read note data")]
    Scroll(
        #[from]
        #[serde(serialize_with = "serialize_scroll_error")]
        scroll::Error,
    ),
}

#[derive(Debug, Error, serde::Serialize)]
pub enum SnapshotError {
    #[error("failed to build snapshot path")]
    Path(#[from] ProcPathError),
    #[error("failed to read {}", .0.display())]
    Io(
        PathBuf,
        #[source]
        #[serde(serialize_with = "serialize_io_error")]
        std::io::Error,
    ),
    #[error("failed to parse {}", .0.display())]
    Procfs(
        PathBuf,
        #[source]
        #[serde(serialize_with = "serialize_proc_error")]
        procfs_core::ProcError,
    ),
}

#[derive(Debug, Error, serde::Serialize)]
pub enum AuxvError {
    #[error("failed to open the snapshot auxv file")]
    Snapshot(#[from] SnapshotError),
    #[error("invalid auxv format (should not hit EOF before AT_NULL)")]
    InvalidFormat,
    #[error("failed to read auxv entry")]
    ReadFailed(
        #[source]
        #[serde(serialize_with = "serialize_io_error")]
        std::io::Error,
    ),
}

#[derive(Debug, Error, serde::Serialize)]
pub enum MapsReaderError {
    #[error("core has no NT_FILE note and the snapshot maps file is unusable")]
    NoMappingSource(#[source] SnapshotError),
    #[error("mapping {start:#x}-{end:#x} ends before it starts")]
    InvalidRange { start: u64, end: u64 },
    #[error("no mappings could be built from the core")]
    NoMappings,
}

#[derive(Debug, Error, serde::Serialize)]
pub enum ThreadInfoError {
    #[error("dumper has not been initialized")]
    NotInitialized,
    #[error("thread index {index} out of bounds ({count} threads)")]
    IndexOutOfBounds { index: usize, count: usize },
}

#[derive(Debug, Error, serde::Serialize)]
pub enum DumperError {
    #[error("dumper has not been initialized")]
    NotInitialized,
    #[error("no mapping contains the stack pointer {0:#x}")]
    NoStackPointerMapping(u64),
}

#[derive(Debug, Error, PartialEq, Eq, serde::Serialize)]
pub enum PathError {
    #[error("mapping has no name")]
    NoName,
    #[error("resolved path of {length} bytes does not fit in {max} bytes")]
    TooLong { length: usize, max: usize },
}

#[derive(Debug, Error, PartialEq, Eq, serde::Serialize)]
pub enum ProcPathError {
    #[error("proc node name is empty")]
    EmptyNode,
    #[error("proc node name of {0} bytes is too long")]
    NodeTooLong(usize),
    #[error("proc path of {length} bytes exceeds the limit of {max}")]
    PathTooLong { length: usize, max: usize },
    #[error("invalid pid {0} for a live /proc path")]
    InvalidPid(Pid),
    #[error("proc node name {0:?} contains a NUL byte")]
    NulInNode(String),
}
