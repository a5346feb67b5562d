//! Target process lookup and raw reads using the Windows API

#[cfg(windows)]
use windows::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(windows)]
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
#[cfg(windows)]
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, Process32FirstW, Process32NextW,
    MODULEENTRY32W, PROCESSENTRY32W, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
#[cfg(windows)]
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

use super::reader::{ProcessMemory, ProcessProvider};
#[cfg(windows)]
use super::reader::{MemoryReadError, ModuleInfo};

/// Finds the game process by executable name
#[derive(Debug, Clone)]
pub struct TargetProcessProvider {
    process_name: String,
}

impl TargetProcessProvider {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }
}

#[cfg(windows)]
fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

#[cfg(windows)]
fn find_process_id(name: &str) -> Option<u32> {
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).ok()?;
        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        let mut found = None;
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                if wide_to_string(&entry.szExeFile).eq_ignore_ascii_case(name) {
                    found = Some(entry.th32ProcessID);
                    break;
                }
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
        found
    }
}

#[cfg(windows)]
impl ProcessProvider for TargetProcessProvider {
    fn open_target(&self) -> Option<Box<dyn ProcessMemory>> {
        let pid = find_process_id(&self.process_name)?;
        let handle = unsafe {
            OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid)
        };
        match handle {
            Ok(handle) => {
                tracing::debug!("[MEM] Opened {} (pid {})", self.process_name, pid);
                Some(Box::new(WindowsProcess { handle, pid }))
            }
            Err(e) => {
                tracing::warn!("[MEM] OpenProcess({}) failed: {}", pid, e);
                None
            }
        }
    }
}

#[cfg(not(windows))]
impl ProcessProvider for TargetProcessProvider {
    fn open_target(&self) -> Option<Box<dyn ProcessMemory>> {
        tracing::warn!("Process memory reading not implemented on this platform");
        None
    }
}

/// Read-only handle to the game process
#[cfg(windows)]
struct WindowsProcess {
    handle: HANDLE,
    pid: u32,
}

// The handle is a kernel object reference, usable from any thread
#[cfg(windows)]
unsafe impl Send for WindowsProcess {}

#[cfg(windows)]
impl Drop for WindowsProcess {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

#[cfg(windows)]
impl ProcessMemory for WindowsProcess {
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryReadError> {
        let mut read = 0usize;
        let result = unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const std::ffi::c_void,
                buf.as_mut_ptr() as *mut std::ffi::c_void,
                buf.len(),
                Some(&mut read),
            )
        };
        match result {
            Ok(()) if read == buf.len() => Ok(()),
            Ok(()) => Err(MemoryReadError::OutOfBounds {
                address,
                len: buf.len(),
            }),
            Err(e) => Err(MemoryReadError::ReadFailed {
                address,
                len: buf.len(),
                reason: e.to_string(),
            }),
        }
    }

    fn module(&self, name: &str) -> Result<ModuleInfo, MemoryReadError> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.pid)
                .map_err(|_| MemoryReadError::ProcessUnavailable)?;
            let mut entry = MODULEENTRY32W {
                dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };

            let mut found = None;
            if Module32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    if wide_to_string(&entry.szModule).eq_ignore_ascii_case(name) {
                        found = Some(ModuleInfo {
                            base: entry.modBaseAddr as u64,
                            size: entry.modBaseSize as usize,
                        });
                        break;
                    }
                    if Module32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }
            let _ = CloseHandle(snapshot);
            found.ok_or_else(|| MemoryReadError::ModuleNotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_keeps_name() {
        let provider = TargetProcessProvider::new("GTA5.exe");
        assert_eq!(provider.process_name(), "GTA5.exe");
    }

    #[test]
    #[cfg(windows)]
    fn test_nonexistent_process() {
        let provider = TargetProcessProvider::new("NonExistentProcess12345.exe");
        assert!(provider.open_target().is_none());
    }
}
