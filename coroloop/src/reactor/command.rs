use super::poller::platform::{sys_close, sys_pipe, sys_read, sys_write};

use std::io;
use std::os::fd::RawFd;

/// Control commands delivered to a loop through its wake pipe.
///
/// Each command travels as a single byte, so concurrent writers never
/// interleave partial commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Stop the pump after the current tick.
    Quit,
}

impl Command {
    fn encode(self) -> u8 {
        match self {
            Command::Quit => b'q',
        }
    }

    fn decode(byte: u8) -> Option<Self> {
        match byte {
            b'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Write attempts made before a command is reported as undeliverable.
const MAX_SEND_RETRIES: usize = 3;

/// A non-blocking pipe carrying [`Command`]s into a loop.
///
/// The read end is watched by the loop thread; any thread may write.
pub(crate) struct CommandPipe {
    reader: RawFd,
    writer: RawFd,
}

unsafe impl Send for CommandPipe {}
unsafe impl Sync for CommandPipe {}

impl CommandPipe {
    pub(crate) fn new() -> io::Result<Self> {
        let (reader, writer) = sys_pipe()?;
        Ok(Self { reader, writer })
    }

    /// The read end, to be registered for readability.
    pub(crate) fn fd(&self) -> RawFd {
        self.reader
    }

    /// Writes one command, retrying `EINTR`/`EAGAIN` a few times.
    pub(crate) fn send(&self, command: Command) -> io::Result<()> {
        let buf = [command.encode()];
        let mut retries = 0;

        loop {
            if sys_write(self.writer, &buf) == 1 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            let transient = matches!(
                err.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            );

            if !transient || retries >= MAX_SEND_RETRIES {
                return Err(err);
            }
            retries += 1;
        }
    }

    /// Reads every pending command. Unknown bytes are logged and skipped.
    pub(crate) fn receive(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        let mut buf = [0u8; 64];

        loop {
            let n = sys_read(self.reader, &mut buf);
            if n <= 0 {
                break;
            }

            for &byte in &buf[..n as usize] {
                match Command::decode(byte) {
                    Some(command) => commands.push(command),
                    None => log::error!("unknown loop command byte {byte:#04x}"),
                }
            }
        }

        commands
    }
}

impl Drop for CommandPipe {
    fn drop(&mut self) {
        sys_close(self.reader);
        sys_close(self.writer);
    }
}
