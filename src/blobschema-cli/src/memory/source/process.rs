//! Live Process Memory Source
//!
//! Memory source implementation for reading from a running game client.

use super::{MemoryRegion, MemorySource, PointerWidth};
use crate::memory::binary::{self, ModuleInfo};
use crate::memory::error::{MemoryError, Result};

use anyhow::{bail, Context};
use process_memory::{ProcessHandle, PutAddress, TryIntoProcessHandle};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use sysinfo::System;

struct Attached {
    handle: ProcessHandle,
    maps: Vec<MemoryRegion>,
    module: Option<ModuleInfo>,
    pointer_width: PointerWidth,
}

enum State {
    Unopened,
    Opened(Attached),
    Closed,
}

/// A target process, opened for memory access
pub struct RemoteProcess {
    pub pid: u32,
    pub exe_path: PathBuf,
    state: State,
}

impl RemoteProcess {
    pub fn new(pid: u32) -> Self {
        let exe_path = std::fs::read_link(format!("/proc/{}/exe", pid))
            .unwrap_or_else(|_| PathBuf::from("unknown"));
        Self {
            pid,
            exe_path,
            state: State::Unopened,
        }
    }

    /// Open a handle to the process and detect its pointer width.
    ///
    /// `module_name` selects the main module among the mapped files.
    pub fn open(&mut self, module_name: &str) -> anyhow::Result<()> {
        match self.state {
            State::Unopened => {}
            State::Opened(_) => bail!("Process {} is already open", self.pid),
            State::Closed => return Err(MemoryError::Disposed.into()),
        }

        let handle = (self.pid as process_memory::Pid)
            .try_into_process_handle()
            .with_context(|| {
                format!("Failed to attach to process {}. Try running with sudo.", self.pid)
            })?;
        let maps = parse_maps(self.pid)?;

        self.state = State::Opened(Attached {
            handle,
            maps,
            module: None,
            pointer_width: PointerWidth::Bits64,
        });

        let module = binary::find_main_module(self, module_name)
            .with_context(|| format!("Failed to identify main module '{}'", module_name))?;
        tracing::info!(
            pid = self.pid,
            base = format_args!("{:#x}", module.base),
            size = format_args!("{:#x}", module.size),
            width = ?module.pointer_width,
            "opened process"
        );

        if let State::Opened(attached) = &mut self.state {
            attached.pointer_width = module.pointer_width;
            attached.module = Some(module);
        }
        Ok(())
    }

    /// Release the handle. Further access fails with `Disposed`.
    pub fn close(&mut self) {
        if self.is_open() {
            tracing::debug!(pid = self.pid, "closing process handle");
        }
        self.state = State::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Opened(_))
    }

    pub fn main_module(&self) -> Result<&ModuleInfo> {
        self.attached()?.module.as_ref().ok_or(MemoryError::NotOpened)
    }

    fn attached(&self) -> Result<&Attached> {
        match &self.state {
            State::Unopened => Err(MemoryError::NotOpened),
            State::Opened(attached) => Ok(attached),
            State::Closed => Err(MemoryError::Disposed),
        }
    }

    /// Process info summary
    pub fn info(&self) -> String {
        let module_info = self
            .main_module()
            .map(|m| format!("Base: {:#x}, Size: {:#x}, {:?}", m.base, m.size, m.pointer_width))
            .unwrap_or_else(|_| "Not found".to_string());

        format!(
            "PID: {}\nExecutable: {}\nMain Module: {}\nMemory Regions: {}",
            self.pid,
            self.exe_path.display(),
            module_info,
            self.regions().len()
        )
    }
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        self.close();
    }
}

impl MemorySource for RemoteProcess {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>> {
        self.attached()?;
        read_exact(self.pid, address, size)
    }

    fn write_bytes(&self, address: usize, data: &[u8]) -> Result<()> {
        let attached = self.attached()?;
        attached
            .handle
            .put_address(address, data)
            .map_err(|e| MemoryError::Write {
                address,
                size: data.len(),
                reason: e.to_string(),
            })
    }

    fn regions(&self) -> &[MemoryRegion] {
        match &self.state {
            State::Opened(attached) => &attached.maps,
            _ => &[],
        }
    }

    fn pointer_width(&self) -> PointerWidth {
        match &self.state {
            State::Opened(attached) => attached.pointer_width,
            _ => PointerWidth::Bits64,
        }
    }
}

/// Copy `size` bytes at `address` out of process `pid`.
///
/// The kernel stops at the first unreadable page and reports how far it
/// got; anything less than the full range is an access error.
fn read_exact(pid: u32, address: usize, size: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; size];
    if size == 0 {
        return Ok(buffer);
    }

    let local = libc::iovec {
        iov_base: buffer.as_mut_ptr().cast(),
        iov_len: size,
    };
    let remote = libc::iovec {
        iov_base: address as *mut libc::c_void,
        iov_len: size,
    };
    // SAFETY: `local` describes exactly `buffer`; the remote iovec is only read from
    let copied = unsafe { libc::process_vm_readv(pid as libc::pid_t, &local, 1, &remote, 1, 0) };

    if copied < 0 {
        return Err(MemoryError::Access {
            address,
            requested: size,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    if (copied as usize) < size {
        return Err(MemoryError::Access {
            address,
            requested: size,
            reason: format!("only {} bytes readable", copied),
        });
    }
    Ok(buffer)
}

/// Find a running process whose name or command line contains `name`.
///
/// Threads are folded into their thread group and the candidate with the
/// largest resident memory wins.
pub fn find_process(name: &str) -> anyhow::Result<u32> {
    let mut system = System::new_all();
    system.refresh_all();

    let needle = name.to_ascii_lowercase();
    let mut candidates: Vec<(u32, u64)> = Vec::new();

    for process in system.processes().values() {
        let pid = process.pid().as_u32();
        let process_name = process.name().to_string_lossy().to_ascii_lowercase();
        let cmdline_match = std::fs::read_to_string(format!("/proc/{}/cmdline", pid))
            .map(|c| c.to_ascii_lowercase().contains(&needle))
            .unwrap_or(false);

        if process_name.contains(&needle) || cmdline_match {
            let tgid = get_tgid(pid).unwrap_or(pid);
            candidates.push((tgid, process.memory()));
        }
    }

    candidates.sort_by(|a, b| b.1.cmp(&a.1));
    candidates.dedup_by(|a, b| a.0 == b.0);

    if let Some((pid, memory)) = candidates.first() {
        tracing::info!(pid, memory_mb = memory / 1_000_000, "found target process");
        return Ok(*pid);
    }

    bail!("No process matching '{}' found. Is the game running?", name)
}

/// Get the thread group ID (main process) for a given PID/TID
pub fn get_tgid(pid: u32) -> Option<u32> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
    status
        .lines()
        .find(|line| line.starts_with("Tgid:"))
        .and_then(|line| line.split_whitespace().nth(1)?.parse().ok())
}

/// Parse /proc/pid/maps to get memory regions
pub fn parse_maps(pid: u32) -> anyhow::Result<Vec<MemoryRegion>> {
    let maps_path = format!("/proc/{}/maps", pid);
    let file = File::open(&maps_path)
        .with_context(|| format!("Failed to open {}. Do you have permission?", maps_path))?;

    let mut regions = Vec::new();
    for line in BufReader::new(file).lines() {
        if let Some(region) = parse_maps_line(&line?) {
            regions.push(region);
        }
    }
    Ok(regions)
}

fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let mut parts = line.split_whitespace();
    let (start, end) = parts.next()?.split_once('-')?;
    let perms = parts.next().unwrap_or("");
    // offset, device and inode precede the path, which may contain spaces
    let path = parts.skip(3).collect::<Vec<_>>().join(" ");

    Some(MemoryRegion::new(
        usize::from_str_radix(start, 16).ok()?,
        usize::from_str_radix(end, 16).ok()?,
        perms,
        (!path.is_empty()).then_some(path.as_str()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::source::region::Protection;

    /// Two anonymous pages; the first holds 0xAB, the second is inaccessible
    fn half_mapped() -> (usize, usize) {
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                page * 2,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(base, libc::MAP_FAILED);
        unsafe {
            std::ptr::write_bytes(base.cast::<u8>(), 0xAB, page);
            let guard = base.cast::<u8>().add(page).cast();
            assert_eq!(libc::mprotect(guard, page, libc::PROT_NONE), 0);
        }
        (base as usize, page)
    }

    #[test]
    fn test_read_exact_own_process() {
        let (base, page) = half_mapped();
        let pid = std::process::id();

        let bytes = read_exact(pid, base, page).unwrap();
        assert!(bytes.iter().all(|&b| b == 0xAB));
        assert!(read_exact(pid, base, 0).unwrap().is_empty());

        unsafe { libc::munmap(base as *mut libc::c_void, page * 2) };
    }

    #[test]
    fn test_read_exact_rejects_short_read() {
        let (base, page) = half_mapped();
        let pid = std::process::id();

        match read_exact(pid, base, page * 2) {
            Err(MemoryError::Access {
                address, requested, ..
            }) => {
                assert_eq!(address, base);
                assert_eq!(requested, page * 2);
            }
            other => panic!("expected access error, got {:?}", other.map(|b| b.len())),
        }
        assert!(matches!(
            read_exact(pid, base + page, 16),
            Err(MemoryError::Access { .. })
        ));

        unsafe { libc::munmap(base as *mut libc::c_void, page * 2) };
    }

    #[test]
    fn test_parse_maps_line() {
        let region =
            parse_maps_line("140000000-140001000 r--p 00000000 08:02 1234 /games/My Game/client.exe")
                .unwrap();
        assert_eq!(region.start, 0x140000000);
        assert_eq!(region.end, 0x140001000);
        assert_eq!(region.protection, Protection::READ);
        assert_eq!(region.path.as_deref(), Some("/games/My Game/client.exe"));

        let anon = parse_maps_line("7f0000000000-7f0000001000 rw-p 00000000 00:00 0").unwrap();
        assert!(anon.path.is_none());

        assert!(parse_maps_line("").is_none());
        assert!(parse_maps_line("zzzz rw-p").is_none());
    }

    #[test]
    fn test_unopened_and_closed_state() {
        let mut process = RemoteProcess::new(u32::MAX);
        assert!(!process.is_open());
        assert!(matches!(process.read_bytes(0x1000, 4), Err(MemoryError::NotOpened)));
        assert!(process.regions().is_empty());

        process.close();
        assert!(matches!(process.read_u32(0x1000), Err(MemoryError::Disposed)));
        assert!(process.open("client").is_err());
    }
}
