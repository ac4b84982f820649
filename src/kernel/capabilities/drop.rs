//! Capability clearing and the no-new-privileges lock.
use super::{
    LINUX_CAPABILITY_VERSION_3, MAX_CAP, PR_CAPBSET_DROP, PR_CAP_AMBIENT,
    PR_CAP_AMBIENT_CLEAR_ALL, PR_SET_NO_NEW_PRIVS,
};
use crate::config::types::{CordonError, Result};

/// Snapshot of the process capability sets from `/proc/self/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityStatus {
    pub inheritable: u64,
    pub permitted: u64,
    pub effective: u64,
    pub bounding: u64,
    pub ambient: u64,
}

impl CapabilityStatus {
    pub fn parse(status: &str) -> Self {
        let mut caps = CapabilityStatus::default();
        for line in status.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let Ok(bits) = u64::from_str_radix(value.trim(), 16) else {
                continue;
            };
            match key {
                "CapInh" => caps.inheritable = bits,
                "CapPrm" => caps.permitted = bits,
                "CapEff" => caps.effective = bits,
                "CapBnd" => caps.bounding = bits,
                "CapAmb" => caps.ambient = bits,
                _ => {}
            }
        }
        caps
    }

    /// No capability is usable now or after `execve`.
    pub fn is_cleared(&self) -> bool {
        self.inheritable == 0 && self.permitted == 0 && self.effective == 0 && self.ambient == 0
    }
}

pub fn read_capability_status() -> Result<CapabilityStatus> {
    let status = std::fs::read_to_string("/proc/self/status").map_err(|e| {
        CordonError::Privilege(format!("cannot read /proc/self/status: {}", e))
    })?;
    Ok(CapabilityStatus::parse(&status))
}

/// Drop all capabilities from all sets (bounding, ambient, effective, permitted, inheritable).
///
/// The bounding set goes first: dropping from it needs `CAP_SETPCAP`, which
/// the final `capset` removes.
pub fn drop_all_capabilities() -> Result<()> {
    drop_bounding_capabilities();
    drop_ambient_capabilities();
    drop_process_capabilities()?;

    let status = read_capability_status()?;
    if !status.is_cleared() {
        return Err(CordonError::Privilege(format!(
            "capabilities still present after drop: {:?}",
            status
        )));
    }
    log::info!("Cleared all capability sets");
    Ok(())
}

fn drop_bounding_capabilities() {
    for cap in 0..=MAX_CAP {
        // SAFETY: prctl(PR_CAPBSET_DROP) with any cap number is safe; invalid caps are ignored.
        let _ = unsafe { libc::prctl(PR_CAPBSET_DROP, cap as libc::c_ulong, 0, 0, 0) };
    }
}

fn drop_ambient_capabilities() {
    // SAFETY: prctl(PR_CAP_AMBIENT, PR_CAP_AMBIENT_CLEAR_ALL) is safe. Returns error
    // on older kernels without ambient capability support (non-fatal).
    let result = unsafe {
        libc::prctl(
            PR_CAP_AMBIENT,
            PR_CAP_AMBIENT_CLEAR_ALL as libc::c_ulong,
            0,
            0,
            0,
        )
    };
    if result != 0 {
        log::warn!("Failed to clear ambient capabilities (may not be supported)");
    }
}

/// Zero effective, permitted and inheritable via raw capset(2).
fn drop_process_capabilities() -> Result<()> {
    #[repr(C)]
    struct CapUserHeader {
        version: u32,
        pid: i32,
    }

    #[repr(C)]
    struct CapUserData {
        effective: u32,
        permitted: u32,
        inheritable: u32,
    }

    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };

    // Version 3 requires two data entries: caps 0-31 and caps 32-63.
    let data = [
        CapUserData { effective: 0, permitted: 0, inheritable: 0 },
        CapUserData { effective: 0, permitted: 0, inheritable: 0 },
    ];

    // SAFETY: capset(2) with valid header (version 3, pid 0 = current) and
    // two zeroed data entries. Properly initialized structs, valid pointers.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            &header as *const CapUserHeader,
            data.as_ptr(),
        )
    };

    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CordonError::Privilege(format!("capset failed: {}", err)));
    }
    log::debug!("Zeroed capability sets via capset(2)");
    Ok(())
}

/// Prevent privilege escalation via execve (setuid, file capabilities).
/// Idempotent and irreversible once set.
pub fn set_no_new_privs() -> Result<()> {
    // SAFETY: prctl(PR_SET_NO_NEW_PRIVS, 1) is safe and idempotent.
    let result = unsafe { libc::prctl(PR_SET_NO_NEW_PRIVS, 1 as libc::c_ulong, 0, 0, 0) };
    if result != 0 {
        return Err(CordonError::Privilege(format!(
            "Failed to set PR_SET_NO_NEW_PRIVS: {}",
            std::io::Error::last_os_error()
        )));
    }
    log::info!("Set PR_SET_NO_NEW_PRIVS");
    Ok(())
}
