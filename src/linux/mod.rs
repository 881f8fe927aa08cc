pub mod auxv;
pub mod core_dumper;
pub mod core_reader;
pub mod dumper;
pub mod errors;
pub mod maps_reader;
pub mod notes;
pub mod proc_path;
pub mod registers;
pub mod root_path;
mod serializers;
pub mod thread_info;

pub use core_dumper::CoreDumper;
pub use dumper::Dumper;
pub use maps_reader::MappingInfo;
pub use thread_info::{CrashInfo, ThreadInfo};
