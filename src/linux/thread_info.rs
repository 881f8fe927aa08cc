use {
    super::{notes::ThreadNote, registers::Registers},
    crate::Pid,
};

/// The state of one thread at the time of the crash
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ThreadInfo {
    pub tid: Pid,
    pub tgid: Pid,
    pub ppid: Pid,
    pub regs: Registers,
    /// Raw `NT_FPREGSET` contents, if the core had them for this thread
    #[serde(skip)]
    pub fpregs: Option<Vec<u8>>,
    pub stack_pointer: u64,
    pub instruction_pointer: u64,
}

impl ThreadInfo {
    pub(crate) fn from_note(note: &ThreadNote, tgid: Pid) -> Self {
        let status = &note.status;
        Self {
            tid: status.pid,
            tgid,
            ppid: status.ppid,
            stack_pointer: status.regs.stack_pointer(),
            instruction_pointer: status.regs.instruction_pointer(),
            regs: status.regs.clone(),
            fpregs: note.fpregs.clone(),
        }
    }
}

/// What is known about the crash itself
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CrashInfo {
    /// Faulting address, 0 when the signal carries none (e.g. SIGABRT)
    pub address: u64,
    pub signal: u32,
    pub signal_code: i32,
    pub thread: Pid,
    /// For SIGSYS, the system call number and audit architecture
    pub exception_info: Vec<u64>,
}
