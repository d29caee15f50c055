use log::{debug, warn};
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::os::fd::AsFd;

/// Scoped raw input mode on a terminal.
///
/// While the guard is alive the terminal delivers one byte per read, does not
/// echo, and reports Ctrl-C as a plain `0x03` byte instead of raising SIGINT.
/// Dropping the guard restores the settings captured on entry.
pub struct RawMode<F: AsFd> {
    tty: F,
    saved: Termios,
}

impl<F: AsFd> RawMode<F> {
    pub fn enable(tty: F) -> nix::Result<Self> {
        let saved = termios::tcgetattr(tty.as_fd())?;
        let mut raw = saved.clone();
        raw.local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(tty.as_fd(), SetArg::TCSANOW, &raw)?;
        debug!("terminal switched to raw mode");
        Ok(Self { tty, saved })
    }
}

impl<F: AsFd> Drop for RawMode<F> {
    fn drop(&mut self) {
        match termios::tcsetattr(self.tty.as_fd(), SetArg::TCSANOW, &self.saved) {
            Ok(()) => debug!("terminal mode restored"),
            Err(e) => warn!("failed to restore terminal mode: {}", e),
        }
    }
}
