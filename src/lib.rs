cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;

        pub use linux::*;
    }
}

failspot::failspot_name! {
    pub enum FailSpotName {
        ReadSnapshotAuxv,
        ReadSnapshotMaps,
        ReadSnapshotStatus,
    }
}

/// A process or thread id, as recorded in the core file
pub type Pid = i32;
