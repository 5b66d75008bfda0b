//! Line-oriented exchange with the external protocol client.
//!
//! [`Transport`] is the seam between session logic and the process: it sends
//! one command and returns the block of lines printed before the next prompt.
//! [`YazTransport`] drives a real `yaz-client` child process; tests supply
//! scripted transports instead.
//!
//! Design of [`YazTransport`]:
//! - **Reader:** a background thread reads the child's stdout, splits it into
//!   lines and reports the `Z> ` prompt as a response boundary
//! - **Hand-off:** lines travel to the session over a `crossbeam_channel`
//! - **Waiting:** `select!` over output, the cancel token and a deadline
//! - **Release:** the child is killed and reaped on `terminate` and on drop

use crate::cancel::CancelToken;
use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const PROMPT: &[u8] = b"Z> ";

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while talking to the client
#[derive(Debug)]
pub enum TransportError {
    /// No complete response before the deadline
    Timeout(Duration),
    /// The cancel token was signalled while waiting
    Cancelled,
    /// The client has exited or its stdin is closed
    Closed,
    /// I/O error on the client's pipes
    Io(std::io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout(after) => {
                write!(f, "no response from client after {}ms", after.as_millis())
            },
            TransportError::Cancelled => write!(f, "cancelled"),
            TransportError::Closed => write!(f, "client process has exited"),
            TransportError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// One block of client output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Lines printed, without line terminators
    pub lines: Vec<String>,
    /// True when the output ended because the client exited
    pub closed: bool,
}

/// Request/response channel to one client instance.
pub trait Transport: Send {
    /// Send one command line.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the client is gone.
    fn send(&mut self, command: &str) -> TransportResult<()>;

    /// Wait for the next complete response block.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] when `cancel` fires and
    /// [`TransportError::Timeout`] when the deadline passes.
    fn read_response(&mut self, cancel: Option<&CancelToken>) -> TransportResult<Response>;

    /// Stop the client and release its resources. Idempotent.
    fn terminate(&mut self);

    /// Send a command and wait for its response.
    ///
    /// # Errors
    ///
    /// See [`Transport::send`] and [`Transport::read_response`].
    fn exchange(
        &mut self,
        command: &str,
        cancel: Option<&CancelToken>,
    ) -> TransportResult<Response> {
        self.send(command)?;
        self.read_response(cancel)
    }
}

#[derive(Debug)]
enum Output {
    Line(String),
    Prompt,
    Eof,
}

/// A running `yaz-client` process.
#[derive(Debug)]
pub struct YazTransport {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    output: Receiver<Output>,
    reader: Option<thread::JoinHandle<()>>,
    timeout: Duration,
    exited: bool,
}

impl YazTransport {
    /// Start the client against `host:port/database`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the program cannot be started.
    pub fn spawn(program: &str, target: &str, timeout: Duration) -> std::io::Result<Self> {
        let mut child = Command::new(program)
            .arg(target)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "client stdout not captured",
            ));
        };

        let (sender, output) = unbounded();
        let reader = thread::spawn(move || reader_task(stdout, &sender));
        log::debug!("Started {program} {target} (pid {})", child.id());

        Ok(YazTransport {
            child: Some(child),
            stdin,
            output,
            reader: Some(reader),
            timeout,
            exited: false,
        })
    }
}

impl Transport for YazTransport {
    fn send(&mut self, command: &str) -> TransportResult<()> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        log::trace!("> {command}");
        let write = |stdin: &mut ChildStdin| -> std::io::Result<()> {
            stdin.write_all(command.as_bytes())?;
            stdin.write_all(b"\n")?;
            stdin.flush()
        };
        write(stdin).map_err(|err| match err.kind() {
            std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(err),
        })
    }

    fn read_response(&mut self, cancel: Option<&CancelToken>) -> TransportResult<Response> {
        if self.exited {
            return Err(TransportError::Closed);
        }
        let cancelled = match cancel {
            Some(token) if token.is_cancelled() => {
                self.terminate();
                return Err(TransportError::Cancelled);
            },
            Some(token) => token.receiver().clone(),
            None => never(),
        };

        let output = self.output.clone();
        let deadline = Instant::now() + self.timeout;
        let mut response = Response::default();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            select! {
                recv(output) -> msg => match msg {
                    Ok(Output::Line(line)) => {
                        log::trace!("< {line}");
                        response.lines.push(line);
                    },
                    Ok(Output::Prompt) => return Ok(response),
                    Ok(Output::Eof) | Err(_) => {
                        self.exited = true;
                        response.closed = true;
                        return Ok(response);
                    },
                },
                recv(cancelled) -> _ => {
                    self.terminate();
                    return Err(TransportError::Cancelled);
                },
                default(remaining) => return Err(TransportError::Timeout(self.timeout)),
            }
        }
    }

    fn terminate(&mut self) {
        // Closing stdin lets a healthy client exit on its own.
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("Client process {} terminated", child.id());
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.exited = true;
    }
}

impl Drop for YazTransport {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Reader task: splits stdout into lines and prompt boundaries.
fn reader_task<R: Read>(mut stdout: R, sender: &Sender<Output>) {
    let mut buffer = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match stdout.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buffer[..n]);

        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&raw).into_owned();
            while line.ends_with(['\n', '\r']) {
                line.pop();
            }
            // A prompt not seen at the end of a read precedes the next line.
            if let Some(rest) = line.strip_prefix("Z> ") {
                let rest = rest.to_string();
                if sender.send(Output::Prompt).is_err() {
                    return;
                }
                line = rest;
                if line.is_empty() {
                    continue;
                }
            }
            if sender.send(Output::Line(line)).is_err() {
                return;
            }
        }

        if pending.ends_with(PROMPT) {
            let head = &pending[..pending.len() - PROMPT.len()];
            if !head.is_empty() {
                let line = String::from_utf8_lossy(head).into_owned();
                let _ = sender.send(Output::Line(line));
            }
            pending.clear();
            if sender.send(Output::Prompt).is_err() {
                return;
            }
        }
    }

    if !pending.is_empty() {
        let _ = sender.send(Output::Line(String::from_utf8_lossy(&pending).into_owned()));
    }
    let _ = sender.send(Output::Eof);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(input: &[u8]) -> Vec<String> {
        let (tx, rx) = unbounded();
        reader_task(input, &tx);
        rx.try_iter()
            .map(|o| match o {
                Output::Line(l) => format!("L:{l}"),
                Output::Prompt => "PROMPT".to_string(),
                Output::Eof => "EOF".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_reader_splits_lines_and_prompts() {
        let out = drain(b"Connecting...OK.\r\nConnection accepted by v3 target.\nZ> Sent searchRequest.\nNumber of hits: 2, setno 1\nZ> ");
        assert_eq!(
            out,
            vec![
                "L:Connecting...OK.",
                "L:Connection accepted by v3 target.",
                "PROMPT",
                "L:Sent searchRequest.",
                "L:Number of hits: 2, setno 1",
                "PROMPT",
                "EOF",
            ]
        );
    }

    #[test]
    fn test_reader_flushes_partial_line_at_eof() {
        assert_eq!(drain(b"bye"), vec!["L:bye", "EOF"]);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout(Duration::from_millis(250));
        assert_eq!(format!("{err}"), "no response from client after 250ms");
        assert_eq!(format!("{}", TransportError::Closed), "client process has exited");
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let result = YazTransport::spawn(
            "/nonexistent/yaz-client",
            "localhost:210/DB",
            Duration::from_millis(100),
        );
        assert!(result.is_err());
    }
}
