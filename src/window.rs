//! Game window lookup using the Windows API

#[cfg(windows)]
use windows::core::PCWSTR;
#[cfg(windows)]
use windows::Win32::Foundation::{HWND, RECT};
#[cfg(windows)]
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, FindWindowW, GetWindowRect, PeekMessageW, SetForegroundWindow, ShowWindow,
    TranslateMessage, MSG, PM_REMOVE, SW_SHOW,
};

use crate::geometry::Rect;

#[cfg(windows)]
fn find_window(title: &str) -> Option<HWND> {
    let title_wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();

    unsafe {
        let hwnd = FindWindowW(PCWSTR::null(), PCWSTR(title_wide.as_ptr())).ok()?;
        if hwnd.0 as usize == 0 {
            None
        } else {
            Some(hwnd)
        }
    }
}

/// Screen rectangle of the window titled `title`
#[cfg(windows)]
pub fn find_game_window(title: &str) -> Option<Rect> {
    let hwnd = find_window(title)?;
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect).ok()? };
    Some(Rect::from_corners(rect.left, rect.top, rect.right, rect.bottom))
}

#[cfg(not(windows))]
pub fn find_game_window(_title: &str) -> Option<Rect> {
    tracing::warn!("Window lookup not implemented on this platform");
    None
}

/// Bring the game window to the foreground
#[cfg(windows)]
pub fn focus_game_window(title: &str) -> bool {
    let Some(hwnd) = find_window(title) else {
        tracing::warn!("[INIT] Could not find window '{}'", title);
        return false;
    };

    unsafe {
        let _ = ShowWindow(hwnd, SW_SHOW);
        let _ = SetForegroundWindow(hwnd);
    }
    tracing::info!("[INIT] Focused window '{}'", title);
    true
}

#[cfg(not(windows))]
pub fn focus_game_window(_title: &str) -> bool {
    tracing::warn!("Window focusing not implemented on this platform");
    false
}

/// Drain the calling thread's message queue. Hotkey events are delivered
/// through it, so the thread owning the hotkey manager calls this regularly.
#[cfg(windows)]
pub fn pump_messages() {
    let mut msg = MSG::default();
    unsafe {
        while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

#[cfg(not(windows))]
pub fn pump_messages() {}
