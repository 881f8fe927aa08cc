//! A [`Dumper`] for processes that are already dead, reconstructed from an
//! ELF core file and a copy of the process's procfs directory.

use {
    super::{
        auxv::AuxvInfo,
        core_reader::CoreFile,
        dumper::{self, Dumper},
        errors::{
            CoreReaderError, DumperError, InitError, MapsReaderError, PathError, ProcPathError,
            SnapshotError, ThreadInfoError,
        },
        maps_reader::{read_snapshot_maps, MappingInfo, MappingListBuilder},
        notes::{CoreNotes, ProcessInfo},
        proc_path::{ProcNode, ProcfsLocator},
        registers::Arch,
        root_path,
        thread_info::{CrashInfo, ThreadInfo},
    },
    crate::Pid,
    error_graph::{strategy::DontCare, WriteErrorList},
    minidump_common::errors::ExceptionCodeLinux,
    procfs_core::{process::Status, FromRead},
    std::path::{Path, PathBuf},
};

const SIGBUS: u32 = ExceptionCodeLinux::SIGBUS as u32;
const SIGFPE: u32 = ExceptionCodeLinux::SIGFPE as u32;
const SIGILL: u32 = ExceptionCodeLinux::SIGILL as u32;
const SIGSEGV: u32 = ExceptionCodeLinux::SIGSEGV as u32;
const SIGSYS: u32 = ExceptionCodeLinux::SIGSYS as u32;
const SIGTRAP: u32 = ExceptionCodeLinux::SIGTRAP as u32;

enum State {
    Uninitialized,
    Initialized(Box<CoreState>),
    Failed,
}

struct CoreState {
    core: CoreFile,
    threads: Vec<Pid>,
    thread_infos: Vec<ThreadInfo>,
    mappings: Vec<MappingInfo>,
    crash: CrashInfo,
    auxv: AuxvInfo,
    process_info: Option<ProcessInfo>,
    page_size: u64,
}

pub struct CoreDumper {
    pid: Pid,
    core_path: PathBuf,
    procfs: ProcfsLocator,
    root_prefix: Option<PathBuf>,
    state: State,
}

impl CoreDumper {
    /// `pid` is the id of the crashed process, it is only used when the core
    /// itself does not say. `procfs_path` is the directory holding the copy
    /// of `/proc/<pid>`.
    pub fn new(pid: Pid, core_path: impl Into<PathBuf>, procfs_path: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            core_path: core_path.into(),
            procfs: ProcfsLocator::snapshot(procfs_path),
            root_prefix: None,
            state: State::Uninitialized,
        }
    }

    /// Resolve mapping paths below `root` instead of `/`, for when the
    /// crashed system's filesystem is mounted elsewhere
    pub fn with_root_prefix(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_prefix = Some(root.into());
        self
    }

    pub fn core_path(&self) -> &Path {
        &self.core_path
    }

    pub fn root_prefix(&self) -> Option<&Path> {
        self.root_prefix.as_deref()
    }

    /// Same as [`Dumper::init`], additionally reporting problems that did
    /// not prevent initialization
    pub fn init_report_soft_errors(
        &mut self,
        mut soft_errors: impl WriteErrorList<InitError>,
    ) -> Result<(), InitError> {
        if !matches!(self.state, State::Uninitialized) {
            return Err(InitError::AlreadyInitialized);
        }

        match self.load(&mut soft_errors) {
            Ok(state) => {
                log::debug!(
                    "loaded {} threads and {} mappings from {}",
                    state.threads.len(),
                    state.mappings.len(),
                    self.core_path.display()
                );
                self.state = State::Initialized(Box::new(state));
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    pub fn build_proc_path(&self, pid: Pid, node: impl AsRef<str>) -> Result<PathBuf, ProcPathError> {
        self.procfs.build_proc_path(pid, node)
    }

    pub fn process_info(&self) -> Option<&ProcessInfo> {
        self.state()?.process_info.as_ref()
    }

    pub fn auxv(&self) -> Option<&AuxvInfo> {
        self.state().map(|state| &state.auxv)
    }

    pub fn crash_info(&self) -> Option<&CrashInfo> {
        self.state().map(|state| &state.crash)
    }

    pub fn arch(&self) -> Option<Arch> {
        self.state().map(|state| state.core.arch())
    }

    fn state(&self) -> Option<&CoreState> {
        match &self.state {
            State::Initialized(state) => Some(state),
            State::Uninitialized | State::Failed => None,
        }
    }

    fn load(
        &self,
        soft_errors: &mut impl WriteErrorList<InitError>,
    ) -> Result<CoreState, InitError> {
        self.check_snapshot_dir()?;

        let core = CoreFile::open(&self.core_path)?;
        let (arch, endian) = (core.arch(), core.endian());
        let notes = CoreNotes::parse(
            core.notes(),
            arch,
            endian,
            soft_errors.subwriter(InitError::NoteErrors),
        )
        .map_err(CoreReaderError::from)?;

        let Some(crashing) = notes.threads.first() else {
            return Err(InitError::NoThreads);
        };

        let mut auxv = AuxvInfo::from_pairs(notes.auxv.iter().copied());
        if let Err(e) = auxv.try_filling_missing_info(&self.procfs, self.pid, endian) {
            log::warn!("failed to read the snapshot auxv: {e}");
            soft_errors.push(InitError::ReadSnapshotAuxvFailed(e));
        }

        let page_size = notes
            .mapped_files
            .as_ref()
            .map(|files| files.page_size)
            .filter(|size| size.is_power_of_two())
            .or_else(|| auxv.get_page_size().filter(|size| size.is_power_of_two()))
            .unwrap_or_else(host_page_size);

        let mappings = match &notes.mapped_files {
            Some(files) => MappingListBuilder::from_file_note(files, core.load_segments())?,
            None => {
                log::debug!("core has no NT_FILE note, reading the snapshot maps");
                let maps = read_snapshot_maps(&self.procfs, self.pid)
                    .map_err(MapsReaderError::NoMappingSource)?;
                MappingListBuilder::from_memory_maps(maps)?
            }
        }
        .add_unmapped_segments(core.load_segments())
        .name_linux_gate(auxv.get_linux_gate_address())
        .build()?;

        let tgid = match &notes.process_info {
            Some(info) => info.pid,
            None => self.snapshot_tgid(soft_errors).unwrap_or(if self.pid > 0 {
                self.pid
            } else {
                crashing.status.pid
            }),
        };

        let thread_infos: Vec<_> = notes
            .threads
            .iter()
            .map(|thread| ThreadInfo::from_note(thread, tgid))
            .collect();
        let threads = thread_infos.iter().map(|info| info.tid).collect();
        let crash = crash_info(&notes);

        Ok(CoreState {
            core,
            threads,
            thread_infos,
            mappings,
            crash,
            auxv,
            process_info: notes.process_info,
            page_size,
        })
    }

    fn check_snapshot_dir(&self) -> Result<(), InitError> {
        let Some(dir) = self.procfs.snapshot_dir() else {
            return Ok(());
        };
        let metadata =
            std::fs::metadata(dir).map_err(|e| InitError::SnapshotDirectory(dir.to_owned(), e))?;
        if !metadata.is_dir() {
            return Err(InitError::NotADirectory(dir.to_owned()));
        }
        Ok(())
    }

    /// The thread group id from the snapshot `status` file
    fn snapshot_tgid(&self, soft_errors: &mut impl WriteErrorList<InitError>) -> Option<Pid> {
        match self.read_snapshot_status() {
            Ok(status) => Some(status.tgid),
            Err(e) => {
                log::warn!("failed to read the snapshot status: {e}");
                soft_errors.push(InitError::ReadSnapshotStatusFailed(e));
                None
            }
        }
    }

    fn read_snapshot_status(&self) -> Result<Status, SnapshotError> {
        let path = self.procfs.build_proc_path(self.pid, ProcNode::Status)?;
        if failspot::failspot!(ReadSnapshotStatus) {
            return Err(SnapshotError::Io(
                path,
                std::io::Error::other("ReadSnapshotStatus failspot"),
            ));
        }
        let file = std::fs::File::open(&path).map_err(|e| SnapshotError::Io(path.clone(), e))?;
        Status::from_read(file).map_err(|e| SnapshotError::Procfs(path, e))
    }
}

/// The crash is described by the first `NT_PRSTATUS` note (thread and
/// signal) and the first `NT_SIGINFO` note (faulting address).
///
/// Signals sent by a process to itself, like SIGABRT from `abort()`, carry no
/// address, so a crash address of 0 is ambiguous.
fn crash_info(notes: &CoreNotes) -> CrashInfo {
    let status = &notes.threads[0].status;
    let signo = match status.signo {
        0 => i32::from(status.cursig),
        signo => signo,
    };
    let mut crash = CrashInfo {
        address: 0,
        signal: u32::try_from(signo).unwrap_or_default(),
        signal_code: status.code,
        thread: status.pid,
        exception_info: Vec::new(),
    };

    if let Some(siginfo) = &notes.siginfo {
        crash.signal_code = siginfo.code;
        match u32::try_from(siginfo.signo).unwrap_or_default() {
            SIGSYS => {
                crash.address = siginfo.addr;
                crash.exception_info = vec![
                    u64::try_from(siginfo.syscall).unwrap_or_default(),
                    u64::from(siginfo.arch),
                ];
            }
            SIGBUS | SIGFPE | SIGILL | SIGSEGV | SIGTRAP => crash.address = siginfo.addr,
            _ => {}
        }
    }

    crash
}

fn host_page_size() -> u64 {
    nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .and_then(|size| u64::try_from(size).ok())
        .unwrap_or(4096)
}

impl Dumper for CoreDumper {
    fn init(&mut self) -> Result<(), InitError> {
        self.init_report_soft_errors(DontCare)
    }

    fn is_post_mortem(&self) -> bool {
        true
    }

    /// The threads of a dead process are already stopped
    fn threads_suspend(&mut self) -> Result<(), DumperError> {
        Ok(())
    }

    fn threads_resume(&mut self) -> Result<(), DumperError> {
        Ok(())
    }

    fn threads(&self) -> &[Pid] {
        self.state()
            .map(|state| state.threads.as_slice())
            .unwrap_or_default()
    }

    fn get_thread_info_by_index(&self, index: usize) -> Result<ThreadInfo, ThreadInfoError> {
        let state = self.state().ok_or(ThreadInfoError::NotInitialized)?;
        state
            .thread_infos
            .get(index)
            .cloned()
            .ok_or(ThreadInfoError::IndexOutOfBounds {
                index,
                count: state.thread_infos.len(),
            })
    }

    fn mappings(&self) -> &[MappingInfo] {
        self.state()
            .map(|state| state.mappings.as_slice())
            .unwrap_or_default()
    }

    fn page_size(&self) -> u64 {
        self.state()
            .map_or_else(host_page_size, |state| state.page_size)
    }

    fn crash_address(&self) -> u64 {
        self.crash_info().map_or(0, |crash| crash.address)
    }

    fn crash_signal(&self) -> u32 {
        self.crash_info().map_or(0, |crash| crash.signal)
    }

    fn crash_signal_code(&self) -> i32 {
        self.crash_info().map_or(0, |crash| crash.signal_code)
    }

    fn crash_thread(&self) -> Pid {
        self.crash_info().map_or(0, |crash| crash.thread)
    }

    fn crash_exception_info(&self) -> &[u64] {
        self.crash_info()
            .map(|crash| crash.exception_info.as_slice())
            .unwrap_or_default()
    }

    fn get_mapping_absolute_path(&self, mapping: &MappingInfo) -> Result<PathBuf, PathError> {
        root_path::resolve_mapping_path(self.root_prefix.as_deref(), mapping)
    }

    fn copy_from_process(&self, address: u64, length: usize) -> Result<Vec<u8>, DumperError> {
        let state = self.state().ok_or(DumperError::NotInitialized)?;
        Ok(state.core.copy_memory(address, length))
    }

    fn get_stack_info(&self, stack_pointer: u64) -> Result<(u64, usize), DumperError> {
        let state = self.state().ok_or(DumperError::NotInitialized)?;
        dumper::stack_info(&state.mappings, state.page_size, stack_pointer)
    }
}
