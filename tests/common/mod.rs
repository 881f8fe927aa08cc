//! Builds synthetic x86_64 core files for driving the dumper in tests.

use {
    postmortem_dumper::CoreDumper,
    std::path::{Path, PathBuf},
};

pub const PAGE_SIZE: u64 = 0x1000;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const PRSTATUS_SIZE: usize = 336;

pub const NT_PRSTATUS: u32 = 1;
pub const NT_FPREGSET: u32 = 2;
pub const NT_PRPSINFO: u32 = 3;
pub const NT_AUXV: u32 = 6;
pub const NT_SIGINFO: u32 = 0x5349_4749;
pub const NT_FILE: u32 = 0x4649_4c45;

pub const AT_PHDR: u64 = 3;
pub const AT_PHNUM: u64 = 5;
pub const AT_PAGESZ: u64 = 6;
pub const AT_ENTRY: u64 = 9;
pub const AT_SYSINFO_EHDR: u64 = 33;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

#[derive(Clone, Copy, Debug)]
pub struct Thread {
    pub tid: i32,
    pub ppid: i32,
    pub signo: i32,
    pub rsp: u64,
    pub rip: u64,
}

struct Load {
    vaddr: u64,
    memsz: u64,
    flags: u32,
    data: Vec<u8>,
}

/// Assembles a little-endian ELF64 core with a single `PT_NOTE` segment
/// followed by `PT_LOAD` segments
#[derive(Default)]
pub struct CoreBuilder {
    notes: Vec<u8>,
    loads: Vec<Load>,
}

#[allow(unused)]
impl CoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(mut self, owner: &[u8], n_type: u32, desc: &[u8]) -> Self {
        let name_size = if owner.is_empty() { 0 } else { owner.len() + 1 };
        self.notes
            .extend_from_slice(&(name_size as u32).to_le_bytes());
        self.notes
            .extend_from_slice(&(desc.len() as u32).to_le_bytes());
        self.notes.extend_from_slice(&n_type.to_le_bytes());
        if !owner.is_empty() {
            self.notes.extend_from_slice(owner);
            self.notes.push(0);
        }
        pad4(&mut self.notes);
        self.notes.extend_from_slice(desc);
        pad4(&mut self.notes);
        self
    }

    pub fn core_note(self, n_type: u32, desc: &[u8]) -> Self {
        self.note(b"CORE", n_type, desc)
    }

    pub fn prstatus(self, thread: Thread) -> Self {
        let mut desc = vec![0u8; PRSTATUS_SIZE];
        put(&mut desc, 0, &thread.signo.to_le_bytes());
        put(&mut desc, 12, &(thread.signo as i16).to_le_bytes());
        put(&mut desc, 32, &thread.tid.to_le_bytes());
        put(&mut desc, 36, &thread.ppid.to_le_bytes());
        put(&mut desc, 40, &thread.tid.to_le_bytes());
        put(&mut desc, 44, &thread.tid.to_le_bytes());
        // pr_reg starts at 112, rip is register 16 and rsp register 19
        put(&mut desc, 112 + 16 * 8, &thread.rip.to_le_bytes());
        put(&mut desc, 112 + 19 * 8, &thread.rsp.to_le_bytes());
        self.core_note(NT_PRSTATUS, &desc)
    }

    pub fn fpregset(self, bytes: &[u8]) -> Self {
        self.core_note(NT_FPREGSET, bytes)
    }

    pub fn siginfo(self, signo: i32, code: i32, addr: u64) -> Self {
        let mut desc = vec![0u8; 128];
        put(&mut desc, 0, &signo.to_le_bytes());
        put(&mut desc, 8, &code.to_le_bytes());
        put(&mut desc, 16, &addr.to_le_bytes());
        self.core_note(NT_SIGINFO, &desc)
    }

    pub fn sigsys(self, call_addr: u64, syscall: i32, arch: u32) -> Self {
        let mut desc = vec![0u8; 128];
        put(&mut desc, 0, &31i32.to_le_bytes());
        // SYS_SECCOMP
        put(&mut desc, 8, &1i32.to_le_bytes());
        put(&mut desc, 16, &call_addr.to_le_bytes());
        put(&mut desc, 24, &syscall.to_le_bytes());
        put(&mut desc, 28, &arch.to_le_bytes());
        self.core_note(NT_SIGINFO, &desc)
    }

    pub fn prpsinfo(self, pid: i32, ppid: i32, fname: &str) -> Self {
        let mut desc = vec![0u8; 136];
        desc[1] = b'R';
        put(&mut desc, 16, &1000u32.to_le_bytes());
        put(&mut desc, 20, &1000u32.to_le_bytes());
        put(&mut desc, 24, &pid.to_le_bytes());
        put(&mut desc, 28, &ppid.to_le_bytes());
        put(&mut desc, 32, &pid.to_le_bytes());
        put(&mut desc, 36, &pid.to_le_bytes());
        put(&mut desc, 40, &fname.as_bytes()[..fname.len().min(15)]);
        put(&mut desc, 56, &fname.as_bytes()[..fname.len().min(79)]);
        self.core_note(NT_PRPSINFO, &desc)
    }

    pub fn auxv(self, pairs: &[(u64, u64)]) -> Self {
        let mut desc = Vec::new();
        for (key, value) in pairs.iter().chain(&[(0, 0)]) {
            desc.extend_from_slice(&key.to_le_bytes());
            desc.extend_from_slice(&value.to_le_bytes());
        }
        self.core_note(NT_AUXV, &desc)
    }

    /// A complete auxv, with the vDSO at `linux_gate`
    pub fn full_auxv(self, linux_gate: u64) -> Self {
        self.auxv(&[
            (AT_SYSINFO_EHDR, linux_gate),
            (AT_PHDR, 0x40_0040),
            (AT_PHNUM, 11),
            (AT_PAGESZ, PAGE_SIZE),
            (AT_ENTRY, 0x40_1000),
        ])
    }

    /// `files` is `(start, end, offset in pages, name)`
    pub fn file_note(self, files: &[(u64, u64, u64, &str)]) -> Self {
        self.file_note_with_page_size(PAGE_SIZE, files)
    }

    pub fn file_note_with_page_size(
        self,
        page_size: u64,
        files: &[(u64, u64, u64, &str)],
    ) -> Self {
        let mut desc = Vec::new();
        desc.extend_from_slice(&(files.len() as u64).to_le_bytes());
        desc.extend_from_slice(&page_size.to_le_bytes());
        for (start, end, page_offset, _) in files {
            desc.extend_from_slice(&start.to_le_bytes());
            desc.extend_from_slice(&end.to_le_bytes());
            desc.extend_from_slice(&page_offset.to_le_bytes());
        }
        for (.., name) in files {
            desc.extend_from_slice(name.as_bytes());
            desc.push(0);
        }
        self.core_note(NT_FILE, &desc)
    }

    /// A `PT_LOAD` segment of `memsz` bytes, of which `data` is present in
    /// the core
    pub fn load(mut self, vaddr: u64, memsz: u64, flags: u32, data: Vec<u8>) -> Self {
        self.loads.push(Load {
            vaddr,
            memsz,
            flags,
            data,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = 1 + self.loads.len();
        let notes_offset = EHDR_SIZE + phnum * PHDR_SIZE;

        let mut bytes = vec![0u8; EHDR_SIZE];
        put(&mut bytes, 0, b"\x7fELF");
        bytes[4] = 2; // ELFCLASS64
        bytes[5] = 1; // ELFDATA2LSB
        bytes[6] = 1; // EV_CURRENT
        put(&mut bytes, 16, &4u16.to_le_bytes()); // ET_CORE
        put(&mut bytes, 18, &62u16.to_le_bytes()); // EM_X86_64
        put(&mut bytes, 20, &1u32.to_le_bytes());
        put(&mut bytes, 32, &(EHDR_SIZE as u64).to_le_bytes());
        put(&mut bytes, 52, &(EHDR_SIZE as u16).to_le_bytes());
        put(&mut bytes, 54, &(PHDR_SIZE as u16).to_le_bytes());
        put(&mut bytes, 56, &(phnum as u16).to_le_bytes());

        write_phdr(
            &mut bytes,
            4,
            0,
            notes_offset as u64,
            0,
            self.notes.len() as u64,
            0,
        );
        let mut data_offset = notes_offset + self.notes.len();
        for load in &self.loads {
            write_phdr(
                &mut bytes,
                1,
                load.flags,
                data_offset as u64,
                load.vaddr,
                load.data.len() as u64,
                load.memsz,
            );
            data_offset += load.data.len();
        }

        bytes.extend_from_slice(&self.notes);
        for load in &self.loads {
            bytes.extend_from_slice(&load.data);
        }
        bytes
    }
}

fn pad4(bytes: &mut Vec<u8>) {
    bytes.resize(bytes.len().next_multiple_of(4), 0);
}

fn put(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

fn write_phdr(
    bytes: &mut Vec<u8>,
    p_type: u32,
    flags: u32,
    offset: u64,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
) {
    bytes.extend_from_slice(&p_type.to_le_bytes());
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&offset.to_le_bytes());
    bytes.extend_from_slice(&vaddr.to_le_bytes());
    bytes.extend_from_slice(&vaddr.to_le_bytes());
    bytes.extend_from_slice(&filesz.to_le_bytes());
    bytes.extend_from_slice(&memsz.to_le_bytes());
    bytes.extend_from_slice(&PAGE_SIZE.to_le_bytes());
}

/// A core file and procfs snapshot directory in a temporary directory
pub struct Fixture {
    _dir: tempfile::TempDir,
    pub core_path: PathBuf,
    pub procfs_path: PathBuf,
}

#[allow(unused)]
impl Fixture {
    pub fn new(core: &[u8]) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("postmortem_dumper")
            .tempdir()
            .unwrap();
        let core_path = dir.path().join("core");
        let procfs_path = dir.path().join("proc");
        std::fs::write(&core_path, core).unwrap();
        std::fs::create_dir(&procfs_path).unwrap();
        Self {
            _dir: dir,
            core_path,
            procfs_path,
        }
    }

    pub fn with_core(core: &CoreBuilder) -> Self {
        Self::new(&core.build())
    }

    pub fn write_proc_file(&self, node: &str, contents: impl AsRef<[u8]>) -> &Self {
        std::fs::write(self.procfs_path.join(node), contents).unwrap();
        self
    }

    pub fn dumper(&self, pid: i32) -> CoreDumper {
        CoreDumper::new(pid, &self.core_path, &self.procfs_path)
    }

    pub fn procfs(&self) -> &Path {
        &self.procfs_path
    }
}

/// Stack pointer of thread `index` in [`standard_core`]
#[allow(unused)]
pub fn stack_pointer(index: usize) -> u64 {
    STACK_BASE + index as u64 * STACK_SIZE + 0x7f38
}

pub const STACK_BASE: u64 = 0x7ffd_0000_0000;
pub const STACK_SIZE: u64 = 0x2_0000;
pub const LINUX_GATE: u64 = 0x7fff_f7fc_1000;
pub const PROCESS_ID: i32 = 4242;
pub const PARENT_ID: i32 = 4000;

/// A process with `thread_count` threads, each with its own stack segment,
/// an executable mapped in two adjacent parts, libc and a vDSO. The first
/// thread crashed with `signo`. No signal information note is added.
#[allow(unused)]
pub fn standard_core(thread_count: usize, signo: i32) -> CoreBuilder {
    let mut core = CoreBuilder::new();
    for index in 0..thread_count {
        core = core.prstatus(Thread {
            tid: PROCESS_ID + index as i32,
            ppid: PARENT_ID,
            signo: if index == 0 { signo } else { 0 },
            rsp: stack_pointer(index),
            rip: 0x40_1234 + index as u64,
        });
        core = core.fpregset(&[index as u8; 512]);
    }
    core = core
        .prpsinfo(PROCESS_ID, PARENT_ID, "crasher")
        .full_auxv(LINUX_GATE)
        .file_note(&[
            (0x40_0000, 0x40_1000, 0, "/usr/bin/crasher"),
            (0x40_1000, 0x40_3000, 1, "/usr/bin/crasher"),
            (0x7fff_f7d0_0000, 0x7fff_f7e0_0000, 0, "/usr/lib/libc.so.6"),
        ])
        .load(0x40_0000, 0x1000, PF_R, vec![0x7f; 0x100])
        .load(0x40_1000, 0x2000, PF_R | PF_X, vec![0xcc; 0x100])
        .load(0x7fff_f7d0_0000, 0x10_0000, PF_R | PF_X, Vec::new())
        .load(LINUX_GATE, 0x2000, PF_R | PF_X, vec![0x7f, b'E', b'L', b'F']);
    for index in 0..thread_count {
        let base = STACK_BASE + index as u64 * STACK_SIZE;
        let stack: Vec<u8> = (0..STACK_SIZE).map(|i| (i % 251) as u8).collect();
        core = core.load(base, STACK_SIZE, PF_R | PF_W, stack);
    }
    core
}
