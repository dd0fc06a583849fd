//! Line-by-line forwarding of child process output to the log.

use std::io::{BufRead, BufReader, Read};

/// Which pipe a line came from.
#[derive(Clone, Copy)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Extracts the message from a reader thread's panic payload.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Logs each line read from `pipe` until EOF.
///
/// stdout goes to INFO so remote Ansible output is visible at the default
/// level; stderr goes to WARN. Non-UTF-8 bytes are replaced. A read error
/// ends streaming but not the command; the exit status alone decides success.
pub(super) fn read_pipe_to_log<R: Read>(pipe: Option<R>, stream_type: StreamType) {
    let Some(pipe) = pipe else {
        tracing::error!(stream = %stream_type, "no pipe attached, output will not be logged");
        return;
    };

    for line in BufReader::new(pipe).split(b'\n') {
        match line {
            Ok(bytes) => emit_line(&bytes, stream_type),
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "failed to read output, stopping");
                break;
            }
        }
    }
}

/// Logs one line with any trailing CR removed.
fn emit_line(line: &[u8], stream_type: StreamType) {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim_end_matches('\r');
    match stream_type {
        StreamType::Stdout => tracing::info!(stream = %stream_type, "{}", trimmed),
        StreamType::Stderr => tracing::warn!(stream = %stream_type, "{}", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_from_str_and_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[test]
    fn reads_until_eof_without_panicking() {
        let input: &[u8] = b"PLAY [web-1]\r\nok: [localhost]\npartial";
        read_pipe_to_log(Some(input), StreamType::Stdout);
        read_pipe_to_log(None::<&[u8]>, StreamType::Stderr);
    }
}
