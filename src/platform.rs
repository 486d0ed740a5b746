//! Platform detection and best-effort application of execution attributes
//! to the running worker thread.
//!
//! Attribute application is advisory: an OS that refuses a priority or
//! affinity request leaves the worker exactly as it was. Failures are
//! logged at debug level and otherwise swallowed; they must never take a
//! worker down.

use crate::attrs::{AffinityMode, ExecutionAttrs, Priority};

/// Closed enumeration of the platforms the pool knows about. Consumed at
/// pool creation to seed per-worker thread properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlatformId {
    Windows,
    Linux,
    MacOs,
    Ios,
    Android,
    FreeBsd,
    None,
}

impl PlatformId {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(windows) {
            PlatformId::Windows
        } else if cfg!(target_os = "android") {
            PlatformId::Android
        } else if cfg!(target_os = "linux") {
            PlatformId::Linux
        } else if cfg!(target_os = "macos") {
            PlatformId::MacOs
        } else if cfg!(target_os = "ios") {
            PlatformId::Ios
        } else if cfg!(target_os = "freebsd") {
            PlatformId::FreeBsd
        } else {
            PlatformId::None
        }
    }
}

/// Applies the given attributes to the calling thread: affinity first, then
/// priority. Best-effort on every platform.
pub(crate) fn apply_to_current_thread(attrs: &ExecutionAttrs) {
    apply_affinity(attrs);
    apply_priority(attrs.priority());
}

fn apply_affinity(attrs: &ExecutionAttrs) {
    match attrs.affinity_mode() {
        AffinityMode::Hard => {
            // An empty mask means the ideal core was out of range; treat as
            // "no hard pinning" rather than an impossible CPU set.
            if attrs.affinity_mask() != 0 {
                pin_to_mask(attrs.affinity_mask());
            }
        }
        AffinityMode::Soft => hint_ideal_core(attrs.ideal_core()),
        AffinityMode::Undefined => {}
    }
}

#[cfg(windows)]
fn hint_ideal_core(core: usize) {
    use winapi::um::processthreadsapi::{GetCurrentThread, SetThreadIdealProcessor};

    unsafe {
        if SetThreadIdealProcessor(GetCurrentThread(), core as u32) == u32::MAX {
            tracing::debug!(core, "SetThreadIdealProcessor failed");
        }
    }
}

/// Platforms without an ideal-processor hint pin to the single preferred
/// core instead; where even that is unavailable the call is a no-op.
#[cfg(not(windows))]
fn hint_ideal_core(core: usize) {
    let pinned = core_affinity::set_for_current(core_affinity::CoreId { id: core });
    if !pinned {
        tracing::debug!(core, "soft core pin rejected");
    }
}

#[cfg(target_os = "linux")]
fn pin_to_mask(mask: u64) {
    use std::mem;

    unsafe {
        let mut cpuset: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut cpuset);
        for cpu in 0..u64::BITS as usize {
            if mask & (1u64 << cpu) != 0 {
                libc::CPU_SET(cpu, &mut cpuset);
            }
        }

        let rc = libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &cpuset);
        if rc != 0 {
            tracing::debug!(mask, "sched_setaffinity rejected the mask");
        }
    }
}

#[cfg(windows)]
fn pin_to_mask(mask: u64) {
    use winapi::um::processthreadsapi::GetCurrentThread;
    use winapi::um::winbase::SetThreadAffinityMask;

    unsafe {
        if SetThreadAffinityMask(GetCurrentThread(), mask as usize) == 0 {
            tracing::debug!(mask, "SetThreadAffinityMask failed");
        }
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
fn pin_to_mask(mask: u64) {
    // No native facility for a full-mask pin on this platform.
    tracing::debug!(mask, "hard affinity unsupported on this platform");
}

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
fn apply_priority(priority: Priority) {
    use std::mem;

    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = mem::zeroed();
        if libc::pthread_getschedparam(thread, &mut policy, &mut param) != 0 {
            return;
        }

        let min = libc::sched_get_priority_min(policy);
        let max = libc::sched_get_priority_max(policy);
        if min < 0 || max < 0 {
            return;
        }

        param.sched_priority = match priority {
            Priority::Low => min,
            Priority::Normal => (min + max) / 2,
            Priority::High | Priority::Critical => max - 1,
            Priority::TimeCritical => max,
        };

        if libc::pthread_setschedparam(thread, policy, &param) != 0 {
            tracing::debug!(?priority, "pthread_setschedparam rejected the priority");
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn apply_priority(priority: Priority) {
    use libc::qos_class_t;

    let class = match priority {
        Priority::Low => qos_class_t::QOS_CLASS_UTILITY,
        Priority::Normal => qos_class_t::QOS_CLASS_DEFAULT,
        Priority::High => qos_class_t::QOS_CLASS_USER_INITIATED,
        Priority::Critical | Priority::TimeCritical => qos_class_t::QOS_CLASS_USER_INTERACTIVE,
    };

    unsafe {
        if libc::pthread_set_qos_class_self_np(class, 0) != 0 {
            tracing::debug!(?priority, "QoS class change rejected");
        }
    }
}

#[cfg(windows)]
fn apply_priority(priority: Priority) {
    use winapi::um::processthreadsapi::{GetCurrentThread, SetThreadPriority};
    use winapi::um::winbase::{
        THREAD_PRIORITY_ABOVE_NORMAL, THREAD_PRIORITY_HIGHEST, THREAD_PRIORITY_LOWEST,
        THREAD_PRIORITY_NORMAL, THREAD_PRIORITY_TIME_CRITICAL,
    };

    let level = match priority {
        Priority::Low => THREAD_PRIORITY_LOWEST,
        Priority::Normal => THREAD_PRIORITY_NORMAL,
        Priority::High => THREAD_PRIORITY_ABOVE_NORMAL,
        Priority::Critical => THREAD_PRIORITY_HIGHEST,
        Priority::TimeCritical => THREAD_PRIORITY_TIME_CRITICAL,
    };

    unsafe {
        if SetThreadPriority(GetCurrentThread(), level as i32) == 0 {
            tracing::debug!(?priority, "SetThreadPriority failed");
        }
    }
}

#[cfg(not(any(unix, windows)))]
fn apply_priority(_priority: Priority) {}
