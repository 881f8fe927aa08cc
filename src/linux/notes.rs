//! Walking and decoding the `PT_NOTE` segments of a core file.
//!
//! Every length in a note is untrusted, all reads are bounds checked against
//! the segment the note lives in.

use {
    super::{
        auxv::{parse_auxv, AuxvPair},
        errors::NoteError,
        registers::{Arch, Registers},
    },
    crate::Pid,
    error_graph::WriteErrorList,
    scroll::{Endian, Pread},
    std::ffi::OsString,
};

/// Owner name of the notes the kernel writes about the process
pub const CORE_NOTE_OWNER: &[u8] = b"CORE";

/// Notes are padded to 4 bytes in both ELF classes on Linux
const NOTE_ALIGN: usize = 4;
const NOTE_HEADER_SIZE: usize = 12;

const PRSTATUS_REGS_OFFSET: usize = 112;
const SIGINFO_SIZE: usize = 128;
const PRPSINFO_SIZE: usize = 136;
const FILE_NOTE_ENTRY_SIZE: u64 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(u32)]
pub enum NoteType {
    PrStatus = 1,
    FpRegSet = 2,
    PrPsInfo = 3,
    Auxv = 6,
    SigInfo = 0x5349_4749,
    File = 0x4649_4c45,
}

impl TryFrom<u32> for NoteType {
    type Error = u32;

    fn try_from(n_type: u32) -> Result<Self, Self::Error> {
        Ok(match n_type {
            1 => Self::PrStatus,
            2 => Self::FpRegSet,
            3 => Self::PrPsInfo,
            6 => Self::Auxv,
            0x5349_4749 => Self::SigInfo,
            0x4649_4c45 => Self::File,
            unknown => return Err(unknown),
        })
    }
}

/// A single note, borrowed from the core image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawNote<'a> {
    /// Owner name without its NUL terminator
    pub owner: &'a [u8],
    pub n_type: u32,
    pub desc: &'a [u8],
    /// Offset of the note header within its segment
    pub offset: usize,
}

impl RawNote<'_> {
    pub fn is_core(&self) -> bool {
        self.owner == CORE_NOTE_OWNER
    }

    pub fn kind(&self) -> Option<NoteType> {
        NoteType::try_from(self.n_type).ok()
    }
}

/// Iterates over the notes of one `PT_NOTE` segment.
///
/// Stops after the first malformed note, since nothing after it can be
/// located reliably.
pub struct NoteIter<'a> {
    data: &'a [u8],
    offset: usize,
    endian: Endian,
    done: bool,
}

impl<'a> NoteIter<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            offset: 0,
            endian,
            done: false,
        }
    }

    fn read_note(&mut self) -> Result<RawNote<'a>, NoteError> {
        let start = self.offset;
        let len = self.data.len();
        if len - start < NOTE_HEADER_SIZE {
            return Err(NoteError::TruncatedHeader(start));
        }

        let mut offset = start;
        let namesz: u32 = self.data.gread_with(&mut offset, self.endian)?;
        let descsz: u32 = self.data.gread_with(&mut offset, self.endian)?;
        let n_type: u32 = self.data.gread_with(&mut offset, self.endian)?;

        let name_end = checked_end(offset, namesz, len).ok_or(NoteError::Overrun {
            offset: start,
            declared: namesz.into(),
            remaining: len - offset,
        })?;
        let name = &self.data[offset..name_end];

        let desc_start = align_up(name_end).min(len);
        let desc_end = checked_end(desc_start, descsz, len).ok_or(NoteError::Overrun {
            offset: start,
            declared: descsz.into(),
            remaining: len - desc_start,
        })?;
        let desc = &self.data[desc_start..desc_end];

        self.offset = align_up(desc_end).min(len);

        let owner = name.split(|&b| b == 0).next().unwrap_or_default();
        Ok(RawNote {
            owner,
            n_type,
            desc,
            offset: start,
        })
    }
}

impl<'a> Iterator for NoteIter<'a> {
    type Item = Result<RawNote<'a>, NoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }
        let note = self.read_note();
        if note.is_err() {
            self.done = true;
        }
        Some(note)
    }
}

fn align_up(offset: usize) -> usize {
    offset.saturating_add(NOTE_ALIGN - 1) & !(NOTE_ALIGN - 1)
}

fn checked_end(start: usize, size: u32, len: usize) -> Option<usize> {
    start
        .checked_add(usize::try_from(size).ok()?)
        .filter(|&end| end <= len)
}

fn expect_size(kind: NoteType, desc: &[u8], expected: usize) -> Result<(), NoteError> {
    if desc.len() != expected {
        return Err(NoteError::UnexpectedSize {
            kind,
            actual: desc.len(),
            expected,
        });
    }
    Ok(())
}

/// Reads a fixed size, NUL padded C string field
fn c_string_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Decoded `elf_prstatus`
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PrStatus {
    pub signo: i32,
    pub code: i32,
    pub errno: i32,
    pub cursig: i16,
    pub sigpend: u64,
    pub sighold: u64,
    pub pid: Pid,
    pub ppid: Pid,
    pub pgrp: Pid,
    pub sid: Pid,
    pub regs: Registers,
}

impl PrStatus {
    /// Size of `elf_prstatus` for 64-bit cores of `arch`: the fixed header,
    /// `pr_reg` and `pr_fpvalid` padded to 8 bytes
    pub const fn size(arch: Arch) -> usize {
        PRSTATUS_REGS_OFFSET + arch.general_registers_size() + 8
    }

    pub fn parse(desc: &[u8], arch: Arch, endian: Endian) -> Result<Self, NoteError> {
        expect_size(NoteType::PrStatus, desc, Self::size(arch))?;

        let offset = &mut 0;
        let signo = desc.gread_with(offset, endian)?;
        let code = desc.gread_with(offset, endian)?;
        let errno = desc.gread_with(offset, endian)?;
        let cursig = desc.gread_with(offset, endian)?;
        *offset = 16;
        let sigpend = desc.gread_with(offset, endian)?;
        let sighold = desc.gread_with(offset, endian)?;
        let pid = desc.gread_with(offset, endian)?;
        let ppid = desc.gread_with(offset, endian)?;
        let pgrp = desc.gread_with(offset, endian)?;
        let sid = desc.gread_with(offset, endian)?;

        // pr_utime, pr_stime, pr_cutime and pr_cstime are not used
        let regs_end = PRSTATUS_REGS_OFFSET + arch.general_registers_size();
        let regs = Registers::parse(arch, &desc[PRSTATUS_REGS_OFFSET..regs_end], endian)?;

        Ok(Self {
            signo,
            code,
            errno,
            cursig,
            sigpend,
            sighold,
            pid,
            ppid,
            pgrp,
            sid,
            regs,
        })
    }
}

/// The fields of `siginfo_t` the dumper reads
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SigInfo {
    pub signo: i32,
    pub errno: i32,
    pub code: i32,
    /// `si_addr` for fault signals, `si_call_addr` for SIGSYS
    pub addr: u64,
    /// `si_syscall`, only meaningful for SIGSYS
    pub syscall: i32,
    /// `si_arch`, only meaningful for SIGSYS
    pub arch: u32,
}

impl SigInfo {
    pub fn parse(desc: &[u8], endian: Endian) -> Result<Self, NoteError> {
        expect_size(NoteType::SigInfo, desc, SIGINFO_SIZE)?;
        Ok(Self {
            signo: desc.pread_with(0, endian)?,
            errno: desc.pread_with(4, endian)?,
            code: desc.pread_with(8, endian)?,
            addr: desc.pread_with(16, endian)?,
            syscall: desc.pread_with(24, endian)?,
            arch: desc.pread_with(28, endian)?,
        })
    }
}

/// Process level information from `NT_PRPSINFO`
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Pid,
    pub pgrp: Pid,
    pub sid: Pid,
    pub uid: u32,
    pub gid: u32,
    /// Numeric scheduler state
    pub state: u8,
    /// Single character state, as shown by `ps`
    pub sname: char,
    pub zombie: bool,
    pub nice: i8,
    pub flags: u64,
    /// Executable name, truncated to 15 bytes by the kernel
    pub fname: String,
    /// Start of the command line, truncated to 79 bytes by the kernel
    pub psargs: String,
}

impl ProcessInfo {
    pub fn parse(desc: &[u8], endian: Endian) -> Result<Self, NoteError> {
        expect_size(NoteType::PrPsInfo, desc, PRPSINFO_SIZE)?;
        let state: u8 = desc.pread(0)?;
        let sname: u8 = desc.pread(1)?;
        let zombie: u8 = desc.pread(2)?;
        let nice: i8 = desc.pread(3)?;
        Ok(Self {
            state,
            sname: char::from(sname),
            zombie: zombie != 0,
            nice,
            flags: desc.pread_with(8, endian)?,
            uid: desc.pread_with(16, endian)?,
            gid: desc.pread_with(20, endian)?,
            pid: desc.pread_with(24, endian)?,
            ppid: desc.pread_with(28, endian)?,
            pgrp: desc.pread_with(32, endian)?,
            sid: desc.pread_with(36, endian)?,
            fname: c_string_field(&desc[40..56]),
            psargs: c_string_field(&desc[56..136]),
        })
    }
}

/// One entry of the `NT_FILE` note
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNoteEntry {
    pub start: u64,
    pub end: u64,
    /// File offset in bytes
    pub offset: u64,
    pub name: OsString,
}

/// The decoded `NT_FILE` note
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappedFiles {
    pub page_size: u64,
    pub entries: Vec<FileNoteEntry>,
}

impl MappedFiles {
    pub fn parse(desc: &[u8], endian: Endian) -> Result<Self, NoteError> {
        use std::os::unix::ffi::OsStrExt;

        let offset = &mut 0;
        let count: u64 = desc.gread_with(offset, endian)?;
        let page_size: u64 = desc.gread_with(offset, endian)?;

        let table_size = count
            .checked_mul(FILE_NOTE_ENTRY_SIZE)
            .and_then(|size| usize::try_from(size).ok())
            .filter(|&size| size <= desc.len() - *offset)
            .ok_or(NoteError::FileNoteTooSmall {
                count,
                size: desc.len(),
            })?;
        // Bounded by the descriptor length above
        let count = table_size / FILE_NOTE_ENTRY_SIZE as usize;

        let mut ranges = Vec::with_capacity(count);
        for index in 0..count {
            let start: u64 = desc.gread_with(offset, endian)?;
            let end: u64 = desc.gread_with(offset, endian)?;
            let page_offset: u64 = desc.gread_with(offset, endian)?;
            if end < start {
                return Err(NoteError::FileNoteInvalidRange { index, start, end });
            }
            let file_offset = page_offset
                .checked_mul(page_size)
                .ok_or(NoteError::FileNoteOffsetOverflow { index })?;
            ranges.push((start, end, file_offset));
        }

        let mut names = &desc[*offset..];
        let mut entries = Vec::with_capacity(count);
        for (found, (start, end, offset)) in ranges.into_iter().enumerate() {
            let nul = names
                .iter()
                .position(|&b| b == 0)
                .ok_or(NoteError::FileNoteMissingNames {
                    expected: count,
                    found,
                })?;
            entries.push(FileNoteEntry {
                start,
                end,
                offset,
                name: std::ffi::OsStr::from_bytes(&names[..nul]).to_owned(),
            });
            names = &names[nul + 1..];
        }

        Ok(Self { page_size, entries })
    }
}

/// A thread as described by its `NT_PRSTATUS` note and the `NT_FPREGSET`
/// note following it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadNote {
    pub status: PrStatus,
    pub fpregs: Option<Vec<u8>>,
}

/// Everything the dumper takes from the notes of a core
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoreNotes {
    /// In note order, the first one is the crashing thread
    pub threads: Vec<ThreadNote>,
    pub siginfo: Option<SigInfo>,
    pub process_info: Option<ProcessInfo>,
    pub auxv: Vec<AuxvPair>,
    pub mapped_files: Option<MappedFiles>,
}

impl CoreNotes {
    /// Decodes all `CORE` notes.
    ///
    /// Structural problems (malformed note headers, a wrongly sized
    /// `NT_PRSTATUS`, a malformed `NT_FILE`) are fatal. Notes that can be
    /// dropped without losing a thread are skipped and reported to
    /// `soft_errors`.
    ///
    /// Process wide notes (`NT_SIGINFO`, `NT_PRPSINFO`, `NT_AUXV` and
    /// `NT_FILE`) are expected once. When repeated, the first decoded one is
    /// kept and later ones are ignored.
    pub fn parse<'a>(
        notes: impl IntoIterator<Item = Result<RawNote<'a>, NoteError>>,
        arch: Arch,
        endian: Endian,
        mut soft_errors: impl WriteErrorList<NoteError>,
    ) -> Result<Self, NoteError> {
        let mut parsed = Self::default();
        let mut auxv_seen = false;

        for note in notes {
            let note = note?;
            if !note.is_core() {
                log::debug!(
                    "skipping note of type {:#x} with owner {:?}",
                    note.n_type,
                    String::from_utf8_lossy(note.owner)
                );
                continue;
            }
            let Some(kind) = note.kind() else {
                log::debug!("skipping unknown CORE note type {:#x}", note.n_type);
                continue;
            };

            match kind {
                NoteType::PrStatus => {
                    let status = PrStatus::parse(note.desc, arch, endian)?;
                    parsed.threads.push(ThreadNote {
                        status,
                        fpregs: None,
                    });
                }
                NoteType::FpRegSet => {
                    if let Err(e) = expect_size(kind, note.desc, arch.fp_registers_size()) {
                        log::warn!("skipping NT_FPREGSET note: {e}");
                        soft_errors.push(e);
                        continue;
                    }
                    match parsed.threads.last_mut() {
                        Some(thread) => thread.fpregs = Some(note.desc.to_vec()),
                        None => log::debug!("NT_FPREGSET note before any NT_PRSTATUS"),
                    }
                }
                NoteType::SigInfo => {
                    if parsed.siginfo.is_some() {
                        continue;
                    }
                    match SigInfo::parse(note.desc, endian) {
                        Ok(siginfo) => parsed.siginfo = Some(siginfo),
                        Err(e) => {
                            log::warn!("skipping NT_SIGINFO note: {e}");
                            soft_errors.push(e);
                        }
                    }
                }
                NoteType::PrPsInfo => {
                    if parsed.process_info.is_some() {
                        log::debug!("ignoring repeated NT_PRPSINFO note");
                        continue;
                    }
                    match ProcessInfo::parse(note.desc, endian) {
                        Ok(info) => parsed.process_info = Some(info),
                        Err(e) => {
                            log::warn!("skipping NT_PRPSINFO note: {e}");
                            soft_errors.push(e);
                        }
                    }
                }
                NoteType::Auxv => {
                    if auxv_seen {
                        log::debug!("ignoring repeated NT_AUXV note");
                        continue;
                    }
                    auxv_seen = true;
                    parsed.auxv = parse_auxv(note.desc, endian);
                }
                NoteType::File => {
                    if parsed.mapped_files.is_some() {
                        log::debug!("ignoring repeated NT_FILE note");
                        continue;
                    }
                    parsed.mapped_files = Some(MappedFiles::parse(note.desc, endian)?);
                }
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod test {
    use {super::*, error_graph::ErrorList};

    fn note(owner: &[u8], n_type: u32, desc: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(owner.len() as u32 + 1).to_le_bytes());
        out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        out.extend_from_slice(&n_type.to_le_bytes());
        out.extend_from_slice(owner);
        out.push(0);
        out.resize(align_up(out.len()), 0);
        out.extend_from_slice(desc);
        out.resize(align_up(out.len()), 0);
        out
    }

    fn prstatus(pid: i32, signo: i32) -> Vec<u8> {
        let mut desc = vec![0u8; PrStatus::size(Arch::X86_64)];
        desc[0..4].copy_from_slice(&signo.to_le_bytes());
        desc[32..36].copy_from_slice(&pid.to_le_bytes());
        desc[36..40].copy_from_slice(&1i32.to_le_bytes());
        // rsp
        desc[112 + 19 * 8..112 + 20 * 8].copy_from_slice(&0x7ffd_0000u64.to_le_bytes());
        desc
    }

    fn parse(segment: &[u8]) -> (Result<CoreNotes, NoteError>, ErrorList<NoteError>) {
        let mut soft_errors = ErrorList::default();
        let notes = CoreNotes::parse(
            NoteIter::new(segment, Endian::Little),
            Arch::X86_64,
            Endian::Little,
            &mut soft_errors,
        );
        (notes, soft_errors)
    }

    #[test]
    fn note_type_codes() {
        assert_eq!(NoteType::try_from(1), Ok(NoteType::PrStatus));
        assert_eq!(NoteType::try_from(0x5349_4749), Ok(NoteType::SigInfo));
        assert_eq!(NoteType::try_from(0x4649_4c45), Ok(NoteType::File));
        assert_eq!(NoteType::try_from(0x202), Err(0x202));
        assert_eq!(NoteType::Auxv as u32, 6);
    }

    #[test]
    fn iterates_aligned_notes() {
        let mut segment = note(b"CORE", 1, &[1, 2, 3]);
        segment.extend(note(b"LINUX", 0x202, &[0; 8]));
        let notes: Vec<_> = NoteIter::new(&segment, Endian::Little)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].owner, b"CORE");
        assert_eq!(notes[0].desc, &[1, 2, 3]);
        assert!(notes[0].is_core());
        assert_eq!(notes[1].owner, b"LINUX");
        assert_eq!(notes[1].offset, 24);
        assert!(notes[1].kind().is_none());
    }

    #[test]
    fn truncated_header() {
        let mut segment = note(b"CORE", 1, &[]);
        segment.extend_from_slice(&[0; 8]);
        let mut iter = NoteIter::new(&segment, Endian::Little);
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next(),
            Some(Err(NoteError::TruncatedHeader(20)))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn descriptor_overrun() {
        let mut segment = note(b"CORE", 1, &[0; 16]);
        // Claim a descriptor larger than what remains
        segment[4..8].copy_from_slice(&0x1000u32.to_le_bytes());
        assert!(matches!(
            NoteIter::new(&segment, Endian::Little).next(),
            Some(Err(NoteError::Overrun {
                offset: 0,
                declared: 0x1000,
                ..
            }))
        ));
    }

    #[test]
    fn huge_name_size() {
        let mut segment = note(b"CORE", 1, &[]);
        segment[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            NoteIter::new(&segment, Endian::Little).next(),
            Some(Err(NoteError::Overrun { .. }))
        ));
    }

    #[test]
    fn threads_in_note_order() {
        let mut segment = note(b"CORE", 1, &prstatus(100, 6));
        segment.extend(note(b"CORE", 2, &[0xfe; 512]));
        segment.extend(note(b"CORE", 1, &prstatus(101, 0)));
        let (notes, soft_errors) = parse(&segment);
        let notes = notes.unwrap();
        assert!(soft_errors.is_empty());
        assert_eq!(notes.threads.len(), 2);
        assert_eq!(notes.threads[0].status.pid, 100);
        assert_eq!(notes.threads[0].status.signo, 6);
        assert_eq!(notes.threads[0].status.ppid, 1);
        assert_eq!(notes.threads[0].fpregs.as_deref(), Some(&[0xfe; 512][..]));
        assert_eq!(notes.threads[1].status.pid, 101);
        assert!(notes.threads[1].fpregs.is_none());
        assert_eq!(notes.threads[1].status.regs.stack_pointer(), 0x7ffd_0000);
    }

    #[test]
    fn wrong_prstatus_size_is_fatal() {
        let segment = note(b"CORE", 1, &[0; 100]);
        assert!(matches!(
            parse(&segment).0,
            Err(NoteError::UnexpectedSize {
                kind: NoteType::PrStatus,
                actual: 100,
                expected: 336
            })
        ));
    }

    #[test]
    fn wrong_fpregset_size_is_skipped() {
        let mut segment = note(b"CORE", 1, &prstatus(100, 11));
        segment.extend(note(b"CORE", 2, &[0; 12]));
        let (notes, soft_errors) = parse(&segment);
        assert!(notes.unwrap().threads[0].fpregs.is_none());
        assert_eq!(soft_errors.len(), 1);
    }

    #[test]
    fn first_siginfo_wins() {
        let mut first = vec![0u8; 128];
        first[0..4].copy_from_slice(&11i32.to_le_bytes());
        first[8..12].copy_from_slice(&1i32.to_le_bytes());
        first[16..24].copy_from_slice(&0xdead_beefu64.to_le_bytes());
        let mut second = vec![0u8; 128];
        second[0..4].copy_from_slice(&6i32.to_le_bytes());

        let mut segment = note(b"CORE", 1, &prstatus(100, 11));
        segment.extend(note(b"CORE", 0x5349_4749, &first));
        segment.extend(note(b"CORE", 0x5349_4749, &second));
        let siginfo = parse(&segment).0.unwrap().siginfo.unwrap();
        assert_eq!(siginfo.signo, 11);
        assert_eq!(siginfo.code, 1);
        assert_eq!(siginfo.addr, 0xdead_beef);
    }

    #[test]
    fn first_process_notes_win() {
        let prpsinfo = |pid: i32, fname: &[u8]| {
            let mut desc = vec![0u8; 136];
            desc[24..28].copy_from_slice(&pid.to_le_bytes());
            desc[40..40 + fname.len()].copy_from_slice(fname);
            desc
        };
        let auxv = |page_size: u64| {
            let mut desc = Vec::new();
            for value in [6, page_size, 0, 0] {
                desc.extend_from_slice(&value.to_le_bytes());
            }
            desc
        };

        let mut segment = note(b"CORE", 1, &prstatus(100, 11));
        segment.extend(note(b"CORE", 3, &prpsinfo(100, b"first")));
        segment.extend(note(b"CORE", 6, &auxv(0x1000)));
        segment.extend(note(b"CORE", 3, &prpsinfo(200, b"second")));
        segment.extend(note(b"CORE", 6, &auxv(0x10000)));
        let (notes, soft_errors) = parse(&segment);
        let notes = notes.unwrap();
        assert!(soft_errors.is_empty());

        let info = notes.process_info.unwrap();
        assert_eq!(info.pid, 100);
        assert_eq!(info.fname, "first");
        assert_eq!(notes.auxv.first().map(|pair| pair.value), Some(0x1000));
    }

    #[test]
    fn short_siginfo_is_skipped() {
        let segment = note(b"CORE", 0x5349_4749, &[0; 64]);
        let (notes, soft_errors) = parse(&segment);
        assert!(notes.unwrap().siginfo.is_none());
        assert_eq!(soft_errors.len(), 1);
    }

    #[test]
    fn foreign_owner_is_skipped() {
        let segment = note(b"GNU", 1, &[0; 4]);
        let (notes, soft_errors) = parse(&segment);
        assert_eq!(notes.unwrap(), CoreNotes::default());
        assert!(soft_errors.is_empty());
    }

    #[test]
    fn prpsinfo() {
        let mut desc = vec![0u8; 136];
        desc[1] = b'R';
        desc[16..20].copy_from_slice(&1000u32.to_le_bytes());
        desc[24..28].copy_from_slice(&4242i32.to_le_bytes());
        desc[28..32].copy_from_slice(&4000i32.to_le_bytes());
        desc[40..44].copy_from_slice(b"prog");
        desc[56..68].copy_from_slice(b"prog --crash");
        let info = ProcessInfo::parse(&desc, Endian::Little).unwrap();
        assert_eq!(info.sname, 'R');
        assert_eq!(info.uid, 1000);
        assert_eq!(info.pid, 4242);
        assert_eq!(info.ppid, 4000);
        assert_eq!(info.fname, "prog");
        assert_eq!(info.psargs, "prog --crash");
    }

    fn file_note(page_size: u64, entries: &[(u64, u64, u64)], names: &[&str]) -> Vec<u8> {
        let mut desc = Vec::new();
        desc.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        desc.extend_from_slice(&page_size.to_le_bytes());
        for (start, end, page_offset) in entries {
            desc.extend_from_slice(&start.to_le_bytes());
            desc.extend_from_slice(&end.to_le_bytes());
            desc.extend_from_slice(&page_offset.to_le_bytes());
        }
        for name in names {
            desc.extend_from_slice(name.as_bytes());
            desc.push(0);
        }
        desc
    }

    #[test]
    fn mapped_files() {
        let desc = file_note(
            0x1000,
            &[(0x40_0000, 0x40_1000, 0), (0x40_1000, 0x40_3000, 1)],
            &["/bin/prog", "/bin/prog"],
        );
        let files = MappedFiles::parse(&desc, Endian::Little).unwrap();
        assert_eq!(files.page_size, 0x1000);
        assert_eq!(
            files.entries[1],
            FileNoteEntry {
                start: 0x40_1000,
                end: 0x40_3000,
                offset: 0x1000,
                name: "/bin/prog".into(),
            }
        );
    }

    #[test]
    fn mapped_files_count_too_large() {
        let mut desc = file_note(0x1000, &[(0, 0x1000, 0)], &["/a"]);
        desc[0..8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            MappedFiles::parse(&desc, Endian::Little),
            Err(NoteError::FileNoteTooSmall { .. })
        ));
    }

    #[test]
    fn mapped_files_inverted_range() {
        let desc = file_note(0x1000, &[(0x2000, 0x1000, 0)], &["/a"]);
        assert!(matches!(
            MappedFiles::parse(&desc, Endian::Little),
            Err(NoteError::FileNoteInvalidRange { index: 0, .. })
        ));
    }

    #[test]
    fn mapped_files_missing_names() {
        let desc = file_note(0x1000, &[(0, 0x1000, 0), (0x1000, 0x2000, 0)], &["/a"]);
        assert!(matches!(
            MappedFiles::parse(&desc, Endian::Little),
            Err(NoteError::FileNoteMissingNames {
                expected: 2,
                found: 1
            })
        ));
    }
}
