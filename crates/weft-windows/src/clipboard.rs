//! Win32 clipboard access.
//!
//! `OpenClipboard` fails when another process holds it; the open is
//! retried 5 times with a 5 ms backoff before giving up. Text moves as
//! CF_UNICODETEXT through a moveable global allocation.

#![cfg(windows)]

use std::io;

use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, GetClipboardData, OpenClipboard, SetClipboardData,
};
use windows_sys::Win32::System::Memory::{GMEM_MOVEABLE, GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock};
use windows_sys::Win32::System::Ole::CF_UNICODETEXT;

use weft_core::error::{Error, Result};

const OPEN_RETRIES: u32 = 5;
const OPEN_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(5);

/// Clipboard session guard; closes on drop.
struct OpenGuard;

impl OpenGuard {
    fn acquire() -> Result<Self> {
        for attempt in 0..OPEN_RETRIES {
            // SAFETY: a null HWND associates the clipboard with the
            // current task.
            if unsafe { OpenClipboard(std::ptr::null_mut()) } != 0 {
                return Ok(Self);
            }
            if attempt + 1 < OPEN_RETRIES {
                std::thread::sleep(OPEN_RETRY_DELAY);
            }
        }
        Err(Error::Io(io::Error::other("clipboard is busy")))
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        // SAFETY: the guard only exists while the clipboard is open.
        unsafe { CloseClipboard() };
    }
}

/// Read the clipboard as text.
pub fn get() -> Result<Option<String>> {
    let _guard = OpenGuard::acquire()?;
    // SAFETY: the clipboard is open.
    let handle = unsafe { GetClipboardData(CF_UNICODETEXT as u32) };
    if handle.is_null() {
        return Ok(None);
    }
    // SAFETY: CF_UNICODETEXT data is a global allocation holding a
    // NUL-terminated UTF-16 string.
    let text = unsafe {
        let ptr = GlobalLock(handle as HANDLE) as *const u16;
        if ptr.is_null() {
            return Ok(None);
        }
        let mut len = 0usize;
        while *ptr.add(len) != 0 {
            len += 1;
        }
        let slice = std::slice::from_raw_parts(ptr, len);
        let text = String::from_utf16_lossy(slice);
        GlobalUnlock(handle as HANDLE);
        text
    };
    Ok(Some(text))
}

/// Replace the clipboard contents with `text`.
pub fn set(text: &str) -> Result<()> {
    let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    let _guard = OpenGuard::acquire()?;
    // SAFETY: the clipboard is open.
    if unsafe { EmptyClipboard() } == 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    // SAFETY: allocation is sized for the NUL-terminated UTF-16 copy;
    // ownership transfers to the clipboard on success.
    unsafe {
        let bytes = wide.len() * std::mem::size_of::<u16>();
        let alloc = GlobalAlloc(GMEM_MOVEABLE, bytes);
        if alloc.is_null() {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        let dst = GlobalLock(alloc) as *mut u16;
        if dst.is_null() {
            GlobalFree(alloc);
            return Err(Error::Io(io::Error::last_os_error()));
        }
        std::ptr::copy_nonoverlapping(wide.as_ptr(), dst, wide.len());
        GlobalUnlock(alloc);
        if SetClipboardData(CF_UNICODETEXT as u32, alloc as HANDLE).is_null() {
            GlobalFree(alloc);
            return Err(Error::Io(io::Error::last_os_error()));
        }
    }
    Ok(())
}
