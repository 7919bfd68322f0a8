use std::io::{self, BufRead, BufReader};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread;
use std::time::Duration;

use crate::interject::AbortListener;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

enum ConsoleEvent {
    Line(String),
    Eof,
    Failed(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    Eof,
    Aborted,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Submission {
    Text(String),
    Terminate,
}

/// Line reader running on its own thread. It reads only when asked, so
/// nothing typed during generation is consumed early, and hands each line
/// back over a single-slot channel.
pub struct ConsoleReader {
    requests: Sender<()>,
    lines: Receiver<ConsoleEvent>,
    outstanding: bool,
}

impl ConsoleReader {
    pub fn stdin() -> io::Result<Self> {
        Self::spawn(BufReader::new(io::stdin()))
    }

    pub fn spawn<R: BufRead + Send + 'static>(source: R) -> io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<()>();
        let (line_tx, line_rx) = mpsc::sync_channel::<ConsoleEvent>(1);

        thread::Builder::new()
            .name("console_reader".to_string())
            .spawn(move || read_on_request(source, request_rx, line_tx))?;

        Ok(Self {
            requests: request_tx,
            lines: line_rx,
            outstanding: false,
        })
    }

    /// Blocks until a line arrives or `abort` fires. A line requested by an
    /// aborted call is delivered to the next call.
    pub fn next_line(&mut self, abort: &AbortListener) -> io::Result<LineRead> {
        if !self.outstanding {
            if self.requests.send(()).is_err() {
                return Ok(LineRead::Eof);
            }
            self.outstanding = true;
        }

        loop {
            if abort.aborted() {
                return Ok(LineRead::Aborted);
            }
            match self.lines.recv_timeout(POLL_INTERVAL) {
                Ok(ConsoleEvent::Line(line)) => {
                    self.outstanding = false;
                    return Ok(LineRead::Line(line));
                }
                Ok(ConsoleEvent::Eof) | Err(RecvTimeoutError::Disconnected) => {
                    self.outstanding = false;
                    return Ok(LineRead::Eof);
                }
                Ok(ConsoleEvent::Failed(msg)) => {
                    self.outstanding = false;
                    return Err(io::Error::other(msg));
                }
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }
    }
}

fn read_on_request<R: BufRead>(mut source: R, requests: Receiver<()>, lines: SyncSender<ConsoleEvent>) {
    while requests.recv().is_ok() {
        let mut line = String::new();
        let event = match source.read_line(&mut line) {
            Ok(0) => ConsoleEvent::Eof,
            Ok(_) => ConsoleEvent::Line(line),
            Err(e) => ConsoleEvent::Failed(e.to_string()),
        };
        let last = !matches!(event, ConsoleEvent::Line(_));
        if lines.send(event).is_err() || last {
            return;
        }
    }
}

/// Reads lines until one ends without a `\` continuation. The backslash is
/// dropped, the newline it escaped is kept.
pub fn read_submission(
    console: &mut ConsoleReader,
    abort: &AbortListener,
    mut text: String,
) -> io::Result<Submission> {
    loop {
        let line = match console.next_line(abort)? {
            LineRead::Line(line) => line,
            LineRead::Eof | LineRead::Aborted => return Ok(Submission::Terminate),
        };

        let line = match line.strip_suffix("\r\n") {
            Some(body) => format!("{}\n", body),
            None => line,
        };

        match line.strip_suffix("\\\n") {
            Some(body) => {
                text.push_str(body);
                text.push('\n');
            }
            None => {
                text.push_str(&line);
                return Ok(Submission::Text(text));
            }
        }
    }
}
