//! Building the table of memory mappings of the crashed process.

use {
    super::{
        core_reader::LoadSegment,
        errors::{MapsReaderError, SnapshotError},
        notes::MappedFiles,
        proc_path::{ProcNode, ProcfsLocator},
        root_path::PATH_MAX,
        serializers::serialize_os_string,
    },
    crate::Pid,
    procfs_core::{
        process::{MMapPath, MemoryMap, MemoryMaps},
        FromRead,
    },
    serde::Serializer,
    std::ffi::{OsStr, OsString},
};

pub const LINUX_GATE_LIBRARY_NAME: &str = "linux-gate.so";

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MMPermissions: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const SHARED = 1 << 3;
        const PRIVATE = 1 << 4;
    }
}

impl MMPermissions {
    /// The permission string as printed in `/proc/<pid>/maps`, e.g. `r-xp`
    pub fn as_maps_str(&self) -> String {
        let flag = |flag, c| if self.contains(flag) { c } else { '-' };
        [
            flag(Self::READ, 'r'),
            flag(Self::WRITE, 'w'),
            flag(Self::EXECUTE, 'x'),
            if self.contains(Self::SHARED) {
                's'
            } else {
                'p'
            },
        ]
        .into_iter()
        .collect()
    }
}

impl From<procfs_core::process::MMPermissions> for MMPermissions {
    fn from(perms: procfs_core::process::MMPermissions) -> Self {
        use procfs_core::process::MMPermissions as P;
        let mut permissions = Self::empty();
        for (theirs, ours) in [
            (P::READ, Self::READ),
            (P::WRITE, Self::WRITE),
            (P::EXECUTE, Self::EXECUTE),
            (P::SHARED, Self::SHARED),
            (P::PRIVATE, Self::PRIVATE),
        ] {
            if perms.contains(theirs) {
                permissions |= ours;
            }
        }
        permissions
    }
}

fn serialize_permissions<S: Serializer>(
    permissions: &MMPermissions,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&permissions.as_maps_str())
}

/// The extent of a mapping as the kernel listed it, before merging
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SystemMappingInfo {
    pub start_address: u64,
    pub end_address: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MappingInfo {
    pub start_address: u64,
    pub size: u64,
    pub system_mapping_info: SystemMappingInfo,
    /// Offset into the backing file
    pub offset: u64,
    #[serde(serialize_with = "serialize_permissions")]
    pub permissions: MMPermissions,
    pub exec: bool,
    #[serde(serialize_with = "serialize_os_string")]
    pub name: Option<OsString>,
}

impl MappingInfo {
    pub fn anonymous(start_address: u64, size: u64) -> Self {
        Self {
            start_address,
            size,
            system_mapping_info: SystemMappingInfo {
                start_address,
                end_address: start_address.saturating_add(size),
            },
            offset: 0,
            permissions: MMPermissions::empty(),
            exec: false,
            name: None,
        }
    }

    fn new(
        start: u64,
        end: u64,
        offset: u64,
        permissions: MMPermissions,
        name: Option<OsString>,
    ) -> Result<Self, MapsReaderError> {
        if end < start {
            return Err(MapsReaderError::InvalidRange { start, end });
        }
        let name = name.filter(|name| {
            let fits = name.len() < PATH_MAX;
            if !fits {
                log::warn!("dropping mapping name of {} bytes at {start:#x}", name.len());
            }
            fits
        });
        Ok(Self {
            start_address: start,
            size: end - start,
            system_mapping_info: SystemMappingInfo {
                start_address: start,
                end_address: end,
            },
            offset,
            permissions,
            exec: permissions.contains(MMPermissions::EXECUTE),
            name,
        })
    }

    pub fn end_address(&self) -> u64 {
        self.start_address + self.size
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.start_address && address - self.start_address < self.size
    }

    pub fn name(&self) -> Option<&OsStr> {
        self.name.as_deref()
    }

    fn overlaps(&self, other: &Self) -> bool {
        self.start_address < other.end_address() && other.start_address < self.end_address()
    }

    fn is_mergeable_with(&self, next: &Self) -> bool {
        self.name.is_some() && self.name == next.name && self.end_address() == next.start_address
    }
}

/// Returns the mapping containing `address` from a sorted, non-overlapping
/// mapping table
pub fn find_mapping(mappings: &[MappingInfo], address: u64) -> Option<&MappingInfo> {
    let index = mappings.partition_point(|m| m.start_address <= address);
    mappings[..index]
        .last()
        .filter(|mapping| mapping.contains(address))
}

/// Reads the `maps` file of the procfs snapshot
pub fn read_snapshot_maps(procfs: &ProcfsLocator, pid: Pid) -> Result<MemoryMaps, SnapshotError> {
    let path = procfs.build_proc_path(pid, ProcNode::Maps)?;
    if failspot::failspot!(ReadSnapshotMaps) {
        return Err(SnapshotError::Io(
            path,
            std::io::Error::other("ReadSnapshotMaps failspot"),
        ));
    }
    let file = std::fs::File::open(&path).map_err(|e| SnapshotError::Io(path.clone(), e))?;
    MemoryMaps::from_read(file).map_err(|e| SnapshotError::Procfs(path, e))
}

/// Accumulates mappings from the available sources and produces the final,
/// sorted table
#[derive(Debug, Default)]
pub struct MappingListBuilder {
    mappings: Vec<MappingInfo>,
}

impl MappingListBuilder {
    /// Mappings from an `NT_FILE` note. Permissions come from the `PT_LOAD`
    /// segment starting at the same address, the note does not carry them.
    pub fn from_file_note(
        files: &MappedFiles,
        segments: &[LoadSegment],
    ) -> Result<Self, MapsReaderError> {
        let mappings = files
            .entries
            .iter()
            .map(|entry| {
                let permissions = segments
                    .iter()
                    .find(|seg| seg.vaddr == entry.start)
                    .map(LoadSegment::permissions)
                    .unwrap_or_default();
                MappingInfo::new(
                    entry.start,
                    entry.end,
                    entry.offset,
                    permissions,
                    Some(entry.name.clone()),
                )
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { mappings })
    }

    /// Mappings from a parsed `/proc/<pid>/maps` file. Only file backed
    /// mappings keep a name, pseudo paths like `[stack]` are anonymous and the
    /// vDSO is named by [`Self::name_linux_gate`].
    pub fn from_memory_maps(
        maps: impl IntoIterator<Item = MemoryMap>,
    ) -> Result<Self, MapsReaderError> {
        let mappings = maps
            .into_iter()
            .map(|map| {
                let name = match map.pathname {
                    MMapPath::Path(path) => Some(path.into_os_string()),
                    _ => None,
                };
                MappingInfo::new(
                    map.address.0,
                    map.address.1,
                    map.offset,
                    map.perms.into(),
                    name,
                )
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { mappings })
    }

    /// Adds every `PT_LOAD` segment not covered by a mapping as an anonymous
    /// mapping, so thread stacks and heap memory always resolve
    pub fn add_unmapped_segments(mut self, segments: &[LoadSegment]) -> Self {
        let mut added = Vec::new();
        for segment in segments {
            if segment.memsz == 0 {
                continue;
            }
            let mut mapping = MappingInfo::anonymous(segment.vaddr, segment.end() - segment.vaddr);
            if self.mappings.iter().any(|m| m.overlaps(&mapping)) {
                continue;
            }
            mapping.permissions = segment.permissions();
            mapping.exec = mapping.permissions.contains(MMPermissions::EXECUTE);
            added.push(mapping);
        }
        log::debug!("added {} anonymous mappings from PT_LOAD segments", added.len());
        self.mappings.extend(added);
        self
    }

    /// Names the mapping of the vDSO, located through `AT_SYSINFO_EHDR`
    pub fn name_linux_gate(mut self, linux_gate_address: Option<u64>) -> Self {
        let Some(address) = linux_gate_address.filter(|&a| a != 0) else {
            return self;
        };
        if let Some(mapping) = self
            .mappings
            .iter_mut()
            .find(|m| m.start_address == address)
        {
            mapping.name = Some(LINUX_GATE_LIBRARY_NAME.into());
            mapping.offset = 0;
        }
        self
    }

    /// Sorts the mappings, drops overlapping entries and merges adjacent
    /// mappings of the same file
    pub fn build(mut self) -> Result<Vec<MappingInfo>, MapsReaderError> {
        // Named mappings sort first among those starting at the same address
        self.mappings
            .sort_by_key(|m| (m.start_address, m.name.is_none()));

        let mut result: Vec<MappingInfo> = Vec::with_capacity(self.mappings.len());
        for mapping in self.mappings {
            match result.last_mut() {
                Some(previous) if previous.overlaps(&mapping) => {
                    log::warn!(
                        "dropping mapping {:#x}-{:#x} which overlaps {:#x}-{:#x}",
                        mapping.start_address,
                        mapping.end_address(),
                        previous.start_address,
                        previous.end_address()
                    );
                }
                Some(previous) if previous.is_mergeable_with(&mapping) => {
                    previous.size += mapping.size;
                    previous.system_mapping_info.end_address =
                        mapping.system_mapping_info.end_address;
                    previous.exec |= mapping.exec;
                    previous.permissions |= mapping.permissions;
                }
                _ => result.push(mapping),
            }
        }

        if result.is_empty() {
            return Err(MapsReaderError::NoMappings);
        }
        Ok(result)
    }
}
