//! Best-effort host clipboard access. Every failure degrades to a
//! notification at the call site; nothing here may stall input.

use arboard::Clipboard;

pub fn get() -> Option<String> {
    match Clipboard::new().and_then(|mut c| c.get_text()) {
        Ok(text) => Some(text),
        Err(e) => {
            log::debug!("clipboard read failed: {e}");
            None
        }
    }
}

pub fn set(text: &str) -> bool {
    match Clipboard::new().and_then(|mut c| c.set_text(text.to_string())) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("clipboard write failed: {e}");
            false
        }
    }
}
