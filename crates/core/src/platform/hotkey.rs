use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::Command;

/// Latches set by the global hotkey listener and drained by whoever polls it.
#[derive(Debug, Default)]
pub struct HotkeyFlags {
    toggle: AtomicBool,
    death_test: AtomicBool,
    cycle_zone: AtomicBool,
}

impl HotkeyFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn raise(&self, cmd: Command) {
        let flag = match cmd {
            Command::Toggle => &self.toggle,
            Command::TestDeath => &self.death_test,
            Command::CycleZone => &self.cycle_zone,
            Command::Quit => return,
        };
        flag.store(true, Ordering::Release);
    }

    /// Take every pending command, clearing the latches.
    pub fn drain(&self) -> Vec<Command> {
        [
            (&self.toggle, Command::Toggle),
            (&self.death_test, Command::TestDeath),
            (&self.cycle_zone, Command::CycleZone),
        ]
        .into_iter()
        .filter(|(flag, _)| flag.swap(false, Ordering::AcqRel))
        .map(|(_, cmd)| cmd)
        .collect()
    }
}

/// Start a background thread that listens for the global hotkeys:
/// Cmd+Shift+K toggles run/pause, F2 requests a death test, F3 cycles the zone.
#[cfg(target_os = "macos")]
pub fn start_hotkey_listener(flags: Arc<HotkeyFlags>) {
    use std::ffi::c_void;

    // CGEventTap FFI types and functions
    type CGEventTapProxy = *mut c_void;
    type CGEventRef = *mut c_void;
    type CFMachPortRef = *mut c_void;
    type CFRunLoopSourceRef = *mut c_void;
    type CFRunLoopRef = *mut c_void;
    type CFStringRef = *const c_void;
    type CGEventMask = u64;
    type CGEventType = u32;
    type CGEventFlags = u64;

    type CGEventTapCallBack = unsafe extern "C" fn(
        CGEventTapProxy,
        CGEventType,
        CGEventRef,
        *mut c_void,
    ) -> CGEventRef;

    const K_CG_HID_EVENT_TAP: u32 = 0;
    const K_CG_HEAD_INSERT_EVENT_TAP: u32 = 0;
    const K_CG_EVENT_TAP_OPTION_LISTEN_ONLY: u32 = 1;
    const CG_EVENT_KEY_DOWN: u32 = 10;
    const CG_EVENT_FLAGS_CHANGED: u32 = 12;

    const K_CG_EVENT_FLAG_MASK_ALTERNATE: u64 = 0x00080000;
    const K_CG_EVENT_FLAG_MASK_SHIFT: u64 = 0x00020000;
    const K_CG_EVENT_FLAG_MASK_COMMAND: u64 = 0x00100000;
    const K_CG_EVENT_FLAG_MASK_CONTROL: u64 = 0x00040000;

    const KEYCODE_K: i64 = 40;
    const KEYCODE_F2: i64 = 120;
    const KEYCODE_F3: i64 = 99;

    // Keyboard event keycode field
    const K_CG_KEYBOARD_EVENT_KEYCODE: u32 = 9;

    extern "C" {
        fn CGEventTapCreate(
            tap: u32,
            place: u32,
            options: u32,
            events_of_interest: CGEventMask,
            callback: CGEventTapCallBack,
            user_info: *mut c_void,
        ) -> CFMachPortRef;

        fn CFMachPortCreateRunLoopSource(
            allocator: *const c_void,
            port: CFMachPortRef,
            order: i64,
        ) -> CFRunLoopSourceRef;

        fn CFRunLoopGetCurrent() -> CFRunLoopRef;

        fn CFRunLoopAddSource(
            rl: CFRunLoopRef,
            source: CFRunLoopSourceRef,
            mode: CFStringRef,
        );

        fn CFRunLoopRun();

        fn CGEventGetFlags(event: CGEventRef) -> CGEventFlags;
        fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
        fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

        static kCFRunLoopCommonModes: CFStringRef;
    }

    unsafe extern "C" fn hotkey_callback(
        _proxy: CGEventTapProxy,
        event_type: CGEventType,
        event: CGEventRef,
        user_info: *mut c_void,
    ) -> CGEventRef {
        unsafe {
            if event_type != CG_EVENT_KEY_DOWN {
                return event;
            }

            let flags = CGEventGetFlags(event);
            let keycode = CGEventGetIntegerValueField(event, K_CG_KEYBOARD_EVENT_KEYCODE);

            let has_cmd = (flags & K_CG_EVENT_FLAG_MASK_COMMAND) != 0;
            let has_shift = (flags & K_CG_EVENT_FLAG_MASK_SHIFT) != 0;
            let no_alt = (flags & K_CG_EVENT_FLAG_MASK_ALTERNATE) == 0;
            let no_ctrl = (flags & K_CG_EVENT_FLAG_MASK_CONTROL) == 0;

            let hotkeys = &*(user_info as *const HotkeyFlags);
            if keycode == KEYCODE_K && has_cmd && has_shift && no_alt && no_ctrl {
                hotkeys.raise(Command::Toggle);
            } else if keycode == KEYCODE_F2 {
                hotkeys.raise(Command::TestDeath);
            } else if keycode == KEYCODE_F3 {
                hotkeys.raise(Command::CycleZone);
            }

            event
        }
    }

    std::thread::spawn(move || {
        unsafe {
            let mask: CGEventMask = (1 << CG_EVENT_KEY_DOWN) | (1 << CG_EVENT_FLAGS_CHANGED);
            let flags_ptr = Arc::into_raw(flags) as *mut c_void;

            let tap = CGEventTapCreate(
                K_CG_HID_EVENT_TAP,
                K_CG_HEAD_INSERT_EVENT_TAP,
                K_CG_EVENT_TAP_OPTION_LISTEN_ONLY,
                mask,
                hotkey_callback,
                flags_ptr,
            );

            if tap.is_null() {
                tracing::error!(
                    "failed to create event tap for global hotkeys, \
                     grant Accessibility permission to your terminal"
                );
                // Reclaim the Arc so we don't leak
                let _ = Arc::from_raw(flags_ptr as *const HotkeyFlags);
                return;
            }

            let source = CFMachPortCreateRunLoopSource(std::ptr::null(), tap, 0);
            let run_loop = CFRunLoopGetCurrent();
            CFRunLoopAddSource(run_loop, source, kCFRunLoopCommonModes);
            CGEventTapEnable(tap, true);
            tracing::info!("global hotkeys Cmd+Shift+K / F2 / F3 registered");

            CFRunLoopRun(); // blocks forever
        }
    });
}

/// Start a background thread that listens for the global hotkeys (Windows):
/// Ctrl+Shift+K toggles run/pause, F2 requests a death test, F3 cycles the zone.
#[cfg(target_os = "windows")]
pub fn start_hotkey_listener(flags: Arc<HotkeyFlags>) {
    use std::ffi::c_void;

    type HWND = *mut c_void;
    type BOOL = i32;
    type UINT = u32;
    type WPARAM = usize;
    type LPARAM = isize;
    type DWORD = u32;
    type LONG = i32;

    #[repr(C)]
    struct POINT {
        x: LONG,
        y: LONG,
    }

    #[repr(C)]
    struct MSG {
        hwnd: HWND,
        message: UINT,
        w_param: WPARAM,
        l_param: LPARAM,
        time: DWORD,
        pt: POINT,
    }

    const MOD_CONTROL: u32 = 0x0002;
    const MOD_SHIFT: u32 = 0x0004;
    const MOD_NOREPEAT: u32 = 0x4000;
    const VK_K: u32 = 0x4B;
    const VK_F2: u32 = 0x71;
    const VK_F3: u32 = 0x72;
    const WM_HOTKEY: u32 = 0x0312;

    const BINDINGS: [(i32, u32, u32, Command); 3] = [
        (1, MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT, VK_K, Command::Toggle),
        (2, MOD_NOREPEAT, VK_F2, Command::TestDeath),
        (3, MOD_NOREPEAT, VK_F3, Command::CycleZone),
    ];

    #[link(name = "user32")]
    extern "system" {
        fn RegisterHotKey(hwnd: HWND, id: i32, fs_modifiers: UINT, vk: UINT) -> BOOL;
        fn GetMessageW(
            msg: *mut MSG,
            hwnd: HWND,
            msg_filter_min: UINT,
            msg_filter_max: UINT,
        ) -> BOOL;
    }

    std::thread::spawn(move || {
        unsafe {
            for (id, modifiers, vk, cmd) in BINDINGS {
                if RegisterHotKey(std::ptr::null_mut(), id, modifiers, vk) == 0 {
                    tracing::error!(
                        "failed to register global hotkey for {:?}, \
                         another application may have claimed it",
                        cmd
                    );
                }
            }
            tracing::info!("global hotkeys Ctrl+Shift+K / F2 / F3 registered");

            let mut msg: MSG = std::mem::zeroed();
            // GetMessageW blocks until a message arrives; returns 0 on WM_QUIT
            while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {
                if msg.message != WM_HOTKEY {
                    continue;
                }
                if let Some((_, _, _, cmd)) = BINDINGS.iter().find(|b| b.0 as usize == msg.w_param) {
                    flags.raise(*cmd);
                }
            }
        }
    });
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn start_hotkey_listener(_flags: Arc<HotkeyFlags>) {
    tracing::warn!("global hotkeys are not supported on this platform, use the TUI keys");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_clears_latches() {
        let flags = HotkeyFlags::new();
        flags.raise(Command::Toggle);
        flags.raise(Command::CycleZone);
        flags.raise(Command::Toggle);
        assert_eq!(flags.drain(), vec![Command::Toggle, Command::CycleZone]);
        assert!(flags.drain().is_empty());
    }
}
