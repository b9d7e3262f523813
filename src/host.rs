//! The host interface (spec §6), modeled as a trait rather than the
//! original's free `VM_*` functions, so the core never hard-codes
//! stdio: the REPL binds a `Stdio` host, tests bind an in-memory one.

use crate::error::HostError;

/// Everything the interpreter needs from its embedder: line input for
/// `INPUT`, character output for `PRINT`, and flushing. File/directory
/// access is optional and defaults to "unsupported" (spec §6: file and
/// directory callbacks are present in the original but not required by
/// every host).
pub trait Host {
    /// Reads one line of input (without the trailing newline), or
    /// `None` on end of input (`VM_getline`).
    fn get_line(&mut self) -> Result<Option<String>, HostError>;

    /// Writes one byte to the program's output stream (`VM_putchar`).
    fn put_char(&mut self, byte: u8) -> Result<(), HostError>;

    /// Reads one byte of input, or `None` on end of input
    /// (`VM_getchar`).
    fn get_char(&mut self) -> Result<Option<u8>, HostError>;

    /// Flushes buffered output (`VM_flush`).
    fn flush(&mut self) -> Result<(), HostError>;

    fn open_file(&mut self, _path: &str, _mode: &str) -> Result<u32, HostError> {
        Err(HostError::Other("file access is not supported by this host".to_string()))
    }

    fn read_dir(&mut self, _path: &str) -> Result<Vec<String>, HostError> {
        Err(HostError::Other("directory access is not supported by this host".to_string()))
    }
}

/// Writes to `print!`/reads from stdin, the host `src/bin/basic.rs`
/// binds for interactive and script-file use.
pub struct StdioHost;

impl Host for StdioHost {
    fn get_line(&mut self) -> Result<Option<String>, HostError> {
        use std::io::BufRead;
        let mut line = String::new();
        let n = std::io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    fn put_char(&mut self, byte: u8) -> Result<(), HostError> {
        use std::io::Write;
        std::io::stdout().write_all(&[byte])?;
        Ok(())
    }

    fn get_char(&mut self) -> Result<Option<u8>, HostError> {
        use std::io::Read;
        let mut buf = [0u8; 1];
        let n = std::io::stdin().read(&mut buf)?;
        Ok(if n == 0 { None } else { Some(buf[0]) })
    }

    fn flush(&mut self) -> Result<(), HostError> {
        use std::io::Write;
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// An in-memory host for `tests/scenarios.rs`: input lines are
/// supplied up front, output is captured for assertions.
#[derive(Default)]
pub struct BufferHost {
    input: std::collections::VecDeque<String>,
    pub output: Vec<u8>,
}

impl BufferHost {
    pub fn with_input(lines: &[&str]) -> Self {
        BufferHost { input: lines.iter().map(|s| s.to_string()).collect(), output: Vec::new() }
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Host for BufferHost {
    fn get_line(&mut self) -> Result<Option<String>, HostError> {
        Ok(self.input.pop_front())
    }

    fn put_char(&mut self, byte: u8) -> Result<(), HostError> {
        self.output.push(byte);
        Ok(())
    }

    fn get_char(&mut self) -> Result<Option<u8>, HostError> {
        Ok(None)
    }

    fn flush(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_host_replays_supplied_lines_in_order() {
        let mut host = BufferHost::with_input(&["first", "second"]);
        assert_eq!(host.get_line().unwrap(), Some("first".to_string()));
        assert_eq!(host.get_line().unwrap(), Some("second".to_string()));
        assert_eq!(host.get_line().unwrap(), None);
    }

    #[test]
    fn buffer_host_captures_output() {
        let mut host = BufferHost::default();
        for b in b"hi" {
            host.put_char(*b).unwrap();
        }
        assert_eq!(host.output_string(), "hi");
    }
}
