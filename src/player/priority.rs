//! Best-effort elevated scheduling for the read loop
//!
//! On Windows the loop thread registers with MMCSS under the "Playback" task
//! so the scheduler favors it during real-time delivery. Elsewhere this is a
//! logged no-op. Elevation is an option, never a correctness requirement.

#[cfg(windows)]
use windows::Win32::System::Threading::{
    AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW, AvSetMmThreadPriority,
    AVRT_PRIORITY_HIGH,
};

/// Keeps the elevated registration alive; reverts on drop.
#[cfg(windows)]
pub struct PriorityGuard(windows::Win32::Foundation::HANDLE);

#[cfg(windows)]
impl Drop for PriorityGuard {
    fn drop(&mut self) {
        // Best-effort revert. Nothing to do if it fails.
        let _ = unsafe { AvRevertMmThreadCharacteristics(self.0) };
    }
}

#[cfg(windows)]
pub fn elevate_read_loop_priority() -> Option<PriorityGuard> {
    let mut task_index = 0u32;
    let task = windows::core::HSTRING::from("Playback");
    let handle = match unsafe { AvSetMmThreadCharacteristicsW(&task, &mut task_index) } {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!("unable to elevate read loop scheduling: {err}");
            return None;
        }
    };
    let _ = unsafe { AvSetMmThreadPriority(handle, AVRT_PRIORITY_HIGH) };
    tracing::debug!("read loop registered with MMCSS");
    Some(PriorityGuard(handle))
}

#[cfg(not(windows))]
pub struct PriorityGuard(());

#[cfg(not(windows))]
pub fn elevate_read_loop_priority() -> Option<PriorityGuard> {
    tracing::debug!("elevated scheduling not available on this platform");
    None
}
