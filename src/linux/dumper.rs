use {
    super::{
        errors::{DumperError, InitError, PathError, ThreadInfoError},
        maps_reader::{self, MappingInfo},
        thread_info::ThreadInfo,
    },
    crate::Pid,
    std::path::PathBuf,
};

/// Upper bound of stack memory captured per thread
pub const STACK_TO_CAPTURE: usize = 32 * 1024;

/// Operations a minidump writer needs from the process it describes.
///
/// Implemented for dead processes by [`CoreDumper`][super::CoreDumper].
/// A live-process implementation would suspend and resume threads for real.
pub trait Dumper {
    /// Collects everything about the process. May only be called once.
    fn init(&mut self) -> Result<(), InitError>;

    /// Whether the process described is already dead
    fn is_post_mortem(&self) -> bool;

    fn threads_suspend(&mut self) -> Result<(), DumperError>;
    fn threads_resume(&mut self) -> Result<(), DumperError>;

    fn threads(&self) -> &[Pid];
    fn get_thread_info_by_index(&self, index: usize) -> Result<ThreadInfo, ThreadInfoError>;

    /// Sorted, non-overlapping
    fn mappings(&self) -> &[MappingInfo];
    fn page_size(&self) -> u64;

    fn crash_address(&self) -> u64;
    fn crash_signal(&self) -> u32;
    fn crash_signal_code(&self) -> i32;
    fn crash_thread(&self) -> Pid;
    fn crash_exception_info(&self) -> &[u64];

    fn get_mapping_absolute_path(&self, mapping: &MappingInfo) -> Result<PathBuf, PathError>;

    /// Reads memory of the process, bytes that cannot be read are filled in
    fn copy_from_process(&self, address: u64, length: usize) -> Result<Vec<u8>, DumperError>;

    fn find_mapping(&self, address: u64) -> Option<&MappingInfo> {
        maps_reader::find_mapping(self.mappings(), address)
    }

    /// `(page aligned stack pointer, bytes of stack to capture)`
    fn get_stack_info(&self, stack_pointer: u64) -> Result<(u64, usize), DumperError> {
        stack_info(self.mappings(), self.page_size(), stack_pointer)
    }
}

/// Locates the stack memory to capture for a thread: from the start of the
/// page containing `stack_pointer` to [`STACK_TO_CAPTURE`] bytes past it,
/// clipped at the end of its mapping. The range always contains
/// `stack_pointer`, whatever the page size.
pub fn stack_info(
    mappings: &[MappingInfo],
    page_size: u64,
    stack_pointer: u64,
) -> Result<(u64, usize), DumperError> {
    let page_size = page_size.max(1);
    let stack_base = stack_pointer - stack_pointer % page_size;

    let mapping = maps_reader::find_mapping(mappings, stack_base)
        .ok_or(DumperError::NoStackPointerMapping(stack_base))?;
    let available = mapping.end_address() - stack_base;
    let wanted = (stack_pointer - stack_base).saturating_add(STACK_TO_CAPTURE as u64);
    let stack_len = usize::try_from(available.min(wanted)).unwrap_or(usize::MAX);
    Ok((stack_base, stack_len))
}
