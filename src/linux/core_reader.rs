//! Memory mapped access to an ELF core file.

use {
    super::{
        errors::{CoreReaderError, NoteError},
        maps_reader::MMPermissions,
        notes::{NoteIter, RawNote},
        registers::Arch,
    },
    goblin::{
        container::{Container, Ctx, Endian},
        elf::{
            header::{self, Header},
            program_header::{self, ProgramHeader},
            section_header::SectionHeader,
            Elf,
        },
    },
    memmap2::Mmap,
    std::{fs::File, ops::Deref, ops::Range, path::Path},
};

/// Bytes of memory the core has no contents for are reported as this value
pub const MISSING_MEMORY_FILL: u8 = 0xab;

/// `e_phnum` value meaning the real count is in `sh_info` of section 0
const PN_XNUM: u16 = 0xffff;

/// Number of program headers, following the extended numbering the kernel
/// uses for processes with 65535 or more mappings
fn program_header_count(
    bytes: &[u8],
    header: &Header,
    ctx: Ctx,
) -> Result<usize, CoreReaderError> {
    if header.e_phnum != PN_XNUM {
        return Ok(usize::from(header.e_phnum));
    }

    let section_size = SectionHeader::size(ctx);
    let in_bounds = usize::try_from(header.e_shoff)
        .ok()
        .filter(|&offset| offset != 0)
        .and_then(|offset| offset.checked_add(section_size))
        .is_some_and(|end| end <= bytes.len());
    if !in_bounds {
        return Err(CoreReaderError::MissingExtendedPhnum {
            shoff: header.e_shoff,
        });
    }
    let sections = SectionHeader::parse(bytes, header.e_shoff as usize, 1, ctx)?;
    let count = sections.first().map_or(0, |section| section.sh_info);
    log::debug!("core uses extended program header numbering, {count} headers");
    Ok(count as usize)
}

/// A `PT_LOAD` segment, a region of the crashed process's memory
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadSegment {
    pub vaddr: u64,
    pub memsz: u64,
    pub file_offset: u64,
    /// Number of bytes present in the core, may be less than `memsz` for
    /// regions the kernel chose not to dump and for truncated cores
    pub filesz: u64,
    pub flags: u32,
}

impl LoadSegment {
    pub fn end(&self) -> u64 {
        self.vaddr.saturating_add(self.memsz)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.vaddr && address - self.vaddr < self.memsz
    }

    pub fn permissions(&self) -> MMPermissions {
        let mut permissions = MMPermissions::PRIVATE;
        if self.flags & program_header::PF_R != 0 {
            permissions |= MMPermissions::READ;
        }
        if self.flags & program_header::PF_W != 0 {
            permissions |= MMPermissions::WRITE;
        }
        if self.flags & program_header::PF_X != 0 {
            permissions |= MMPermissions::EXECUTE;
        }
        permissions
    }
}

/// A validated core file.
///
/// Generic over the backing storage so cores can be read from memory as well
/// as from a mapped file.
pub struct CoreFile<T = Mmap> {
    data: T,
    arch: Arch,
    endian: Endian,
    load_segments: Vec<LoadSegment>,
    note_segments: Vec<Range<usize>>,
}

impl CoreFile<Mmap> {
    pub fn open(path: &Path) -> Result<Self, CoreReaderError> {
        let file = File::open(path).map_err(|e| CoreReaderError::Open(path.to_owned(), e))?;
        // SAFETY: The core is only read, if it is truncated while mapped
        // accesses may fault, which is the same contract every reader of
        // mapped files accepts.
        let mmap = unsafe { Mmap::map(&file) }.map_err(CoreReaderError::Mmap)?;
        Self::parse(mmap)
    }
}

impl<T: Deref<Target = [u8]>> CoreFile<T> {
    pub fn parse(data: T) -> Result<Self, CoreReaderError> {
        let bytes: &[u8] = &data;
        let file_size = bytes.len();

        if file_size < header::SELFMAG || &bytes[..header::SELFMAG] != header::ELFMAG {
            return Err(CoreReaderError::NotElf);
        }
        match bytes.get(header::EI_CLASS) {
            Some(&header::ELFCLASS64) => {}
            Some(&class) => return Err(CoreReaderError::UnsupportedClass(class)),
            None => return Err(CoreReaderError::NotElf),
        }

        let header: Header = Elf::parse_header(bytes)?;
        if header.e_version != u32::from(header::EV_CURRENT) {
            return Err(CoreReaderError::UnsupportedVersion(header.e_version));
        }
        if header.e_type != header::ET_CORE {
            return Err(CoreReaderError::NotCore(header.e_type));
        }
        let arch = Arch::from_machine(header.e_machine)
            .ok_or(CoreReaderError::UnsupportedMachine(header.e_machine))?;
        let endian = header.endianness()?;
        let ctx = Ctx::new(Container::Big, endian);

        let expected = ProgramHeader::size(ctx);
        if usize::from(header.e_phentsize) != expected {
            return Err(CoreReaderError::ProgramHeaderSize {
                actual: header.e_phentsize,
                expected,
            });
        }

        let count = program_header_count(bytes, &header, ctx)?;
        let table_in_bounds = usize::try_from(header.e_phoff)
            .ok()
            .and_then(|offset| offset.checked_add(count.checked_mul(expected)?))
            .is_some_and(|end| end <= file_size);
        if !table_in_bounds {
            return Err(CoreReaderError::ProgramHeadersOutOfBounds {
                offset: header.e_phoff,
                count,
                file_size,
            });
        }

        let program_headers = ProgramHeader::parse(bytes, header.e_phoff as usize, count, ctx)?;

        let mut load_segments = Vec::new();
        let mut note_segments = Vec::new();
        for phdr in &program_headers {
            match phdr.p_type {
                program_header::PT_NOTE => {
                    let range = file_range(phdr.p_offset, phdr.p_filesz, file_size).ok_or(
                        CoreReaderError::NoteSegmentOutOfBounds {
                            offset: phdr.p_offset,
                            size: phdr.p_filesz,
                            file_size,
                        },
                    )?;
                    note_segments.push(range);
                }
                program_header::PT_LOAD => {
                    let available = (file_size as u64).saturating_sub(phdr.p_offset);
                    let filesz = phdr.p_filesz.min(available);
                    if filesz < phdr.p_filesz {
                        log::warn!(
                            "PT_LOAD segment at {:#x} is truncated, {} of {} bytes present",
                            phdr.p_vaddr,
                            filesz,
                            phdr.p_filesz
                        );
                    }
                    load_segments.push(LoadSegment {
                        vaddr: phdr.p_vaddr,
                        memsz: phdr.p_memsz,
                        file_offset: phdr.p_offset,
                        filesz: filesz.min(phdr.p_memsz),
                        flags: phdr.p_flags,
                    });
                }
                _ => {}
            }
        }

        if note_segments.is_empty() {
            return Err(CoreReaderError::NoNoteSegment);
        }
        log::debug!(
            "{arch:?} core with {} PT_LOAD and {} PT_NOTE segments",
            load_segments.len(),
            note_segments.len()
        );

        Ok(Self {
            data,
            arch,
            endian,
            load_segments,
            note_segments,
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn load_segments(&self) -> &[LoadSegment] {
        &self.load_segments
    }

    /// All notes of all `PT_NOTE` segments, in file order
    pub fn notes(&self) -> impl Iterator<Item = Result<RawNote<'_>, NoteError>> + '_ {
        let bytes: &[u8] = &self.data;
        let endian = self.endian;
        self.note_segments
            .iter()
            .flat_map(move |range| NoteIter::new(&bytes[range.clone()], endian))
    }

    pub fn find_segment(&self, address: u64) -> Option<&LoadSegment> {
        self.load_segments.iter().find(|seg| seg.contains(address))
    }

    /// The bytes of crash-time memory starting at `address` that the core
    /// holds contiguously, up to `length`
    pub fn memory_at(&self, address: u64, length: usize) -> Option<&[u8]> {
        let segment = self.find_segment(address)?;
        let offset_in_segment = address - segment.vaddr;
        if offset_in_segment >= segment.filesz {
            return None;
        }
        let available = segment.filesz - offset_in_segment;
        let length = (length as u64).min(available);
        let start = usize::try_from(segment.file_offset + offset_in_segment).ok()?;
        let end = start.checked_add(usize::try_from(length).ok()?)?;
        self.data.get(start..end)
    }

    /// Copies `length` bytes of crash-time memory starting at `address`.
    /// Bytes the core does not contain read as [`MISSING_MEMORY_FILL`].
    pub fn copy_memory(&self, address: u64, length: usize) -> Vec<u8> {
        let mut buffer = vec![MISSING_MEMORY_FILL; length];
        let mut copied = 0;
        while copied < length {
            let Some(current) = address.checked_add(copied as u64) else {
                break;
            };
            match self.memory_at(current, length - copied) {
                Some(bytes) if !bytes.is_empty() => {
                    buffer[copied..copied + bytes.len()].copy_from_slice(bytes);
                    copied += bytes.len();
                }
                _ => {
                    // Skip to the next segment that has file contents, if any
                    let next = self
                        .load_segments
                        .iter()
                        .filter(|seg| seg.vaddr > current && seg.filesz > 0)
                        .map(|seg| seg.vaddr)
                        .min();
                    match next {
                        Some(next) if next - address < length as u64 => {
                            copied = (next - address) as usize;
                        }
                        _ => break,
                    }
                }
            }
        }
        buffer
    }
}

fn file_range(offset: u64, size: u64, file_size: usize) -> Option<Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    (end <= file_size).then_some(start..end)
}
