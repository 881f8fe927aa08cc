//! General purpose register sets as stored in the `pr_reg` field of
//! `NT_PRSTATUS` notes.

use scroll::{Endian, Pread};

/// Architectures whose cores can be read
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn from_machine(e_machine: u16) -> Option<Self> {
        match e_machine {
            goblin::elf::header::EM_X86_64 => Some(Self::X86_64),
            goblin::elf::header::EM_AARCH64 => Some(Self::Aarch64),
            _ => None,
        }
    }

    /// Size of `elf_gregset_t`
    pub const fn general_registers_size(self) -> usize {
        match self {
            Self::X86_64 => 27 * 8,
            Self::Aarch64 => 34 * 8,
        }
    }

    /// Size of the `NT_FPREGSET` payload, `user_fpregs_struct` on x86_64 and
    /// `user_fpsimd_state` on aarch64
    pub const fn fp_registers_size(self) -> usize {
        match self {
            Self::X86_64 => 512,
            Self::Aarch64 => 528,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct X86_64Registers {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

impl X86_64Registers {
    fn parse(bytes: &[u8], endian: Endian) -> Result<Self, scroll::Error> {
        let offset = &mut 0;
        // Fields are initialized in declaration order, which is the kernel's
        // user_regs_struct order
        Ok(Self {
            r15: bytes.gread_with(offset, endian)?,
            r14: bytes.gread_with(offset, endian)?,
            r13: bytes.gread_with(offset, endian)?,
            r12: bytes.gread_with(offset, endian)?,
            rbp: bytes.gread_with(offset, endian)?,
            rbx: bytes.gread_with(offset, endian)?,
            r11: bytes.gread_with(offset, endian)?,
            r10: bytes.gread_with(offset, endian)?,
            r9: bytes.gread_with(offset, endian)?,
            r8: bytes.gread_with(offset, endian)?,
            rax: bytes.gread_with(offset, endian)?,
            rcx: bytes.gread_with(offset, endian)?,
            rdx: bytes.gread_with(offset, endian)?,
            rsi: bytes.gread_with(offset, endian)?,
            rdi: bytes.gread_with(offset, endian)?,
            orig_rax: bytes.gread_with(offset, endian)?,
            rip: bytes.gread_with(offset, endian)?,
            cs: bytes.gread_with(offset, endian)?,
            eflags: bytes.gread_with(offset, endian)?,
            rsp: bytes.gread_with(offset, endian)?,
            ss: bytes.gread_with(offset, endian)?,
            fs_base: bytes.gread_with(offset, endian)?,
            gs_base: bytes.gread_with(offset, endian)?,
            ds: bytes.gread_with(offset, endian)?,
            es: bytes.gread_with(offset, endian)?,
            fs: bytes.gread_with(offset, endian)?,
            gs: bytes.gread_with(offset, endian)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Aarch64Registers {
    /// x0 to x30, x29 is the frame pointer and x30 the link register
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64,
}

impl Aarch64Registers {
    fn parse(bytes: &[u8], endian: Endian) -> Result<Self, scroll::Error> {
        let offset = &mut 0;
        let mut regs = [0u64; 31];
        for reg in regs.iter_mut() {
            *reg = bytes.gread_with(offset, endian)?;
        }
        Ok(Self {
            regs,
            sp: bytes.gread_with(offset, endian)?,
            pc: bytes.gread_with(offset, endian)?,
            pstate: bytes.gread_with(offset, endian)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Registers {
    X86_64(X86_64Registers),
    Aarch64(Aarch64Registers),
}

impl Registers {
    pub fn parse(arch: Arch, bytes: &[u8], endian: Endian) -> Result<Self, scroll::Error> {
        Ok(match arch {
            Arch::X86_64 => Self::X86_64(X86_64Registers::parse(bytes, endian)?),
            Arch::Aarch64 => Self::Aarch64(Aarch64Registers::parse(bytes, endian)?),
        })
    }

    pub fn arch(&self) -> Arch {
        match self {
            Self::X86_64(_) => Arch::X86_64,
            Self::Aarch64(_) => Arch::Aarch64,
        }
    }

    pub fn stack_pointer(&self) -> u64 {
        match self {
            Self::X86_64(regs) => regs.rsp,
            Self::Aarch64(regs) => regs.sp,
        }
    }

    pub fn instruction_pointer(&self) -> u64 {
        match self {
            Self::X86_64(regs) => regs.rip,
            Self::Aarch64(regs) => regs.pc,
        }
    }
}
