// ABOUTME: Operator interaction: line input, hidden password entry and yes/no questions.
// ABOUTME: Workflows talk to a Prompter so tests can script the answers.

use crate::secret::SecretBuffer;
use dialoguer::{Confirm, Password};
use std::io::{self, Read, Write};
use zeroize::Zeroizing;

/// Everything the provisioning flow asks of a human.
pub trait Prompter {
    /// Prints `prompt` and reads one raw line of at most `limit` bytes.
    ///
    /// `None` means the input ended before anything was read.
    fn read_line(&mut self, prompt: &str, limit: usize) -> io::Result<Option<String>>;

    /// Reads a password without echo straight into `secret`.
    fn read_password(&mut self, prompt: &str, secret: &mut SecretBuffer) -> io::Result<()>;

    fn confirm(&mut self, prompt: &str, default: bool) -> io::Result<bool>;
}

/// Prompter bound to the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_line(&mut self, prompt: &str, limit: usize) -> io::Result<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        read_line_bounded(&mut io::stdin().lock(), limit)
    }

    fn read_password(&mut self, prompt: &str, secret: &mut SecretBuffer) -> io::Result<()> {
        let password = Zeroizing::new(
            Password::new()
                .with_prompt(prompt)
                .interact()
                .map_err(io::Error::other)?,
        );
        secret.set(password.as_bytes());
        Ok(())
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> io::Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(io::Error::other)
    }
}

/// Reads bytes into `buf` until a newline (kept) or until `buf` is full.
///
/// Reads one byte at a time so nothing past the line is consumed and no
/// intermediate buffer holds a copy.
pub fn read_line_into<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut len = 0;
    while len < buf.len() {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                buf[len] = byte[0];
                len += 1;
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(len)
}

/// One raw line of at most `limit` bytes; `None` at end of input.
pub fn read_line_bounded<R: Read + ?Sized>(reader: &mut R, limit: usize) -> io::Result<Option<String>> {
    let mut buf = Zeroizing::new(vec![0u8; limit]);
    let len = read_line_into(reader, &mut buf)?;
    if len == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf[..len]).into_owned()))
}

/// Drops one trailing `\n`, and a `\r` before it.
pub fn strip_newline(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut input: &[u8] = b"first\nsecond\n";
        assert_eq!(
            read_line_bounded(&mut input, 100).unwrap().as_deref(),
            Some("first\n")
        );
        assert_eq!(
            read_line_bounded(&mut input, 100).unwrap().as_deref(),
            Some("second\n")
        );
        assert_eq!(read_line_bounded(&mut input, 100).unwrap(), None);
    }

    #[test]
    fn test_read_line_respects_limit() {
        let mut input: &[u8] = b"abcdefgh\n";
        assert_eq!(
            read_line_bounded(&mut input, 4).unwrap().as_deref(),
            Some("abcd")
        );
        assert_eq!(input, b"efgh\n");
    }

    #[test]
    fn test_strip_newline_removes_only_one() {
        let mut line = "token\n\n".to_string();
        strip_newline(&mut line);
        assert_eq!(line, "token\n");

        let mut line = "token\r\n".to_string();
        strip_newline(&mut line);
        assert_eq!(line, "token");

        let mut line = "token".to_string();
        strip_newline(&mut line);
        assert_eq!(line, "token");
    }
}
