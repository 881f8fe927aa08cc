pub use reader::ProcfsAuxvIter;
use {
    crate::{
        errors::{AuxvError, SnapshotError},
        proc_path::{ProcNode, ProcfsLocator},
        Pid,
    },
    scroll::Endian,
    std::{fs::File, io::BufReader},
};

mod reader;

/// The type used in auxv keys and values. Only 64-bit cores are read, so
/// this does not follow the host pointer width.
pub type AuxvType = u64;

pub mod consts {
    use super::AuxvType;
    pub const AT_NULL: AuxvType = 0;
    pub const AT_PHDR: AuxvType = 3;
    pub const AT_PHNUM: AuxvType = 5;
    pub const AT_PAGESZ: AuxvType = 6;
    pub const AT_ENTRY: AuxvType = 9;
    pub const AT_SYSINFO_EHDR: AuxvType = 33;
}

/// An auxv key-value pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct AuxvPair {
    pub key: AuxvType,
    pub value: AuxvType,
}

/// Parses the descriptor of an `NT_AUXV` note. A trailing partial entry is
/// ignored.
pub fn parse_auxv(bytes: &[u8], endian: Endian) -> Vec<AuxvPair> {
    ProcfsAuxvIter::new(bytes, endian)
        .map_while(Result::ok)
        .collect()
}

/// The auxv entries the dumper cares about.
///
/// Filled from the core's `NT_AUXV` note first. Missing entries may then be
/// taken from the `auxv` file of the procfs snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AuxvInfo {
    program_header_count: Option<AuxvType>,
    program_header_address: Option<AuxvType>,
    linux_gate_address: Option<AuxvType>,
    entry_address: Option<AuxvType>,
    page_size: Option<AuxvType>,
}

impl AuxvInfo {
    pub fn from_pairs(pairs: impl IntoIterator<Item = AuxvPair>) -> Self {
        let mut info = Self::default();
        info.fill(pairs);
        info
    }

    /// Sets every field that is still unset from `pairs`. The first
    /// occurrence of a key wins.
    fn fill(&mut self, pairs: impl IntoIterator<Item = AuxvPair>) {
        for AuxvPair { key, value } in pairs {
            let dest_field = match key {
                consts::AT_PHNUM => &mut self.program_header_count,
                consts::AT_PHDR => &mut self.program_header_address,
                consts::AT_SYSINFO_EHDR => &mut self.linux_gate_address,
                consts::AT_ENTRY => &mut self.entry_address,
                consts::AT_PAGESZ => &mut self.page_size,
                _ => continue,
            };
            if dest_field.is_none() {
                *dest_field = Some(value);
            }
        }
    }

    pub fn try_filling_missing_info(
        &mut self,
        procfs: &ProcfsLocator,
        pid: Pid,
        endian: Endian,
    ) -> Result<(), AuxvError> {
        if self.is_complete() {
            return Ok(());
        }

        failspot::failspot!(ReadSnapshotAuxv bail(AuxvError::InvalidFormat));

        let auxv_path = procfs
            .build_proc_path(pid, ProcNode::Auxv)
            .map_err(SnapshotError::from)?;
        let auxv_file =
            File::open(&auxv_path).map_err(|e| SnapshotError::Io(auxv_path.clone(), e))?;

        let mut pairs = Vec::new();
        for pair in ProcfsAuxvIter::new(BufReader::new(auxv_file), endian) {
            match pair {
                Ok(pair) => pairs.push(pair),
                Err(AuxvError::InvalidFormat) => break,
                Err(e) => return Err(e),
            }
        }
        log::debug!(
            "read {} auxv entries from {}",
            pairs.len(),
            auxv_path.display()
        );
        self.fill(pairs);

        Ok(())
    }

    pub fn get_program_header_count(&self) -> Option<AuxvType> {
        self.program_header_count
    }
    pub fn get_program_header_address(&self) -> Option<AuxvType> {
        self.program_header_address
    }
    pub fn get_linux_gate_address(&self) -> Option<AuxvType> {
        self.linux_gate_address
    }
    pub fn get_entry_address(&self) -> Option<AuxvType> {
        self.entry_address
    }
    pub fn get_page_size(&self) -> Option<AuxvType> {
        self.page_size
    }
    pub fn is_complete(&self) -> bool {
        self.program_header_count.is_some()
            && self.program_header_address.is_some()
            && self.linux_gate_address.is_some()
            && self.entry_address.is_some()
            && self.page_size.is_some()
    }
}
