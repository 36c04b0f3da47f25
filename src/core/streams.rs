//! Output reassembly - turns raw writes on a task's two streams into whole,
//! timestamped lines

use super::task::{LogLine, Stream, Task};
use crate::report::{Reporter, Reporters};
use chrono::{DateTime, Utc};
use std::io;
use std::sync::{Arc, Mutex};

/// Current non-newline-terminated line of one stream
#[derive(Default)]
struct Tail {
    bytes: Vec<u8>,
    time: Option<DateTime<Utc>>,
}

/// Per-task line assembler for stdout and stderr.
///
/// A write to one stream first flushes the pending tail of the other one,
/// so the two streams interleave in write order.
pub(crate) struct Multiplexer {
    task: Arc<Task>,
    reporters: Reporters,
    stdout: Tail,
    stderr: Tail,
}

impl Multiplexer {
    pub(crate) fn new(task: Arc<Task>, reporters: Reporters) -> Self {
        Self {
            task,
            reporters,
            stdout: Tail::default(),
            stderr: Tail::default(),
        }
    }

    pub(crate) fn write(&mut self, stream: Stream, time: DateTime<Utc>, input: &[u8]) {
        self.flush(stream.other());

        for chunk in input.split_inclusive(|&b| b == b'\n') {
            if chunk.ends_with(b"\n") {
                let tail = self.tail(stream);
                let (line_time, bytes) = match tail.time.take() {
                    Some(tail_time) => {
                        let mut bytes = std::mem::take(&mut tail.bytes);
                        bytes.extend_from_slice(chunk);
                        (tail_time, bytes)
                    }
                    None => (time, chunk.to_vec()),
                };
                self.emit(stream, line_time, &bytes);
            } else {
                // Partial line, only ever the last chunk
                let tail = self.tail(stream);
                if tail.time.is_none() {
                    tail.time = Some(time);
                }
                tail.bytes.extend_from_slice(chunk);
            }
        }
    }

    /// Emit the pending tail of `stream`, if any, as a complete line
    pub(crate) fn flush(&mut self, stream: Stream) {
        let tail = self.tail(stream);
        if let Some(time) = tail.time.take() {
            let mut bytes = std::mem::take(&mut tail.bytes);
            bytes.push(b'\n');
            self.emit(stream, time, &bytes);
        }
    }

    pub(crate) fn flush_all(&mut self) {
        self.flush(Stream::Stdout);
        self.flush(Stream::Stderr);
    }

    fn tail(&mut self, stream: Stream) -> &mut Tail {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    fn emit(&self, stream: Stream, time: DateTime<Utc>, bytes: &[u8]) {
        let line = LogLine {
            stream,
            line: String::from_utf8_lossy(bytes).into_owned(),
        };
        self.task.store_line(line.clone());
        self.reporters.output_line(&self.task, time, &line);
    }
}

/// Writer for one stream of the current task
#[derive(Clone)]
pub struct TaskWriter {
    target: Target,
    stream: Stream,
}

#[derive(Clone)]
enum Target {
    Task(Arc<Mutex<Multiplexer>>),
    Process,
}

impl TaskWriter {
    pub(crate) fn task(mux: Arc<Mutex<Multiplexer>>, stream: Stream) -> Self {
        Self {
            target: Target::Task(mux),
            stream,
        }
    }

    /// Writer that goes straight to the process stream
    pub(crate) fn process(stream: Stream) -> Self {
        Self {
            target: Target::Process,
            stream,
        }
    }
}

impl io::Write for TaskWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.target {
            Target::Task(mux) => {
                let now = Utc::now();
                mux.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .write(self.stream, now, buf);
                Ok(buf.len())
            }
            Target::Process => match self.stream {
                Stream::Stdout => io::stdout().write(buf),
                Stream::Stderr => io::stderr().write(buf),
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.target {
            // Pending tails stay buffered until a newline, a write to the
            // other stream, or the end of the task
            Target::Task(_) => Ok(()),
            Target::Process => match self.stream {
                Stream::Stdout => io::stdout().flush(),
                Stream::Stderr => io::stderr().flush(),
            },
        }
    }
}
