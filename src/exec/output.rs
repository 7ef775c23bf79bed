/// Bounded collection of child stdout/stderr.
///
/// Each stream is drained on its own thread so a chatty child can never
/// block on a full pipe while the runner is polling for exit.
use crate::config::types::OutputIntegrity;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

/// Per-stream byte limits.
#[derive(Debug, Clone)]
pub struct OutputLimits {
    pub stdout_limit: usize,
    pub stderr_limit: usize,
    /// How long to wait for EOF once the child is gone
    pub collection_timeout: Duration,
}

impl Default for OutputLimits {
    fn default() -> Self {
        OutputLimits {
            stdout_limit: 8 * 1024 * 1024,
            stderr_limit: 2 * 1024 * 1024,
            collection_timeout: Duration::from_secs(2),
        }
    }
}

/// Collected streams.
#[derive(Debug, Clone, Default)]
pub struct CollectedOutput {
    pub stdout: String,
    pub stderr: String,
    pub integrity: OutputIntegrity,
}

type StreamResult = (Vec<u8>, OutputIntegrity);

/// Reader threads started right after spawn.
pub struct OutputCollector {
    stdout_rx: Option<Receiver<StreamResult>>,
    stderr_rx: Option<Receiver<StreamResult>>,
    collection_timeout: Duration,
}

impl OutputCollector {
    pub fn start<O, E>(stdout: Option<O>, stderr: Option<E>, limits: &OutputLimits) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        OutputCollector {
            stdout_rx: stdout.map(|stream| spawn_reader(stream, limits.stdout_limit)),
            stderr_rx: stderr.map(|stream| spawn_reader(stream, limits.stderr_limit)),
            collection_timeout: limits.collection_timeout,
        }
    }

    /// Wait for both readers. Call after the child has been reaped.
    ///
    /// A descendant that escaped the process group can keep a pipe open;
    /// such a stream is cut off at the collection timeout and reported as
    /// truncated.
    pub fn finish(self) -> CollectedOutput {
        let deadline = Instant::now() + self.collection_timeout;
        let (stdout, stdout_integrity) = receive(self.stdout_rx, deadline);
        let (stderr, stderr_integrity) = receive(self.stderr_rx, deadline);

        CollectedOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            integrity: combine(stdout_integrity, stderr_integrity),
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        let mut integrity = OutputIntegrity::Complete;

        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if out.len() + n > limit {
                        let remaining = limit.saturating_sub(out.len());
                        out.extend_from_slice(&buf[..remaining]);
                        integrity = OutputIntegrity::TruncatedByJudgeLimit;
                        // Keep draining so the child never blocks on a full pipe.
                        while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    integrity = OutputIntegrity::ReadError;
                    break;
                }
            }
        }

        let _ = tx.send((out, integrity));
    });
    rx
}

fn receive(rx: Option<Receiver<StreamResult>>, deadline: Instant) -> StreamResult {
    let Some(rx) = rx else {
        return (Vec::new(), OutputIntegrity::Complete);
    };
    let wait = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(wait) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("output stream still open after child exit; abandoning reader");
            (Vec::new(), OutputIntegrity::TruncatedByJudgeLimit)
        }
        Err(RecvTimeoutError::Disconnected) => (Vec::new(), OutputIntegrity::ReadError),
    }
}

fn combine(stdout: OutputIntegrity, stderr: OutputIntegrity) -> OutputIntegrity {
    if stdout == OutputIntegrity::ReadError || stderr == OutputIntegrity::ReadError {
        OutputIntegrity::ReadError
    } else if stdout == OutputIntegrity::TruncatedByJudgeLimit
        || stderr == OutputIntegrity::TruncatedByJudgeLimit
    {
        OutputIntegrity::TruncatedByJudgeLimit
    } else {
        OutputIntegrity::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn limits(stdout_limit: usize, stderr_limit: usize) -> OutputLimits {
        OutputLimits {
            stdout_limit,
            stderr_limit,
            collection_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn collects_both_streams() {
        let collector = OutputCollector::start(
            Some(Cursor::new(b"{\"ok\": true}\n".to_vec())),
            Some(Cursor::new(b"warning\n".to_vec())),
            &limits(1024, 1024),
        );
        let output = collector.finish();
        assert_eq!(output.stdout, "{\"ok\": true}\n");
        assert_eq!(output.stderr, "warning\n");
        assert_eq!(output.integrity, OutputIntegrity::Complete);
    }

    #[test]
    fn stream_over_limit_is_truncated() {
        let collector = OutputCollector::start(
            Some(Cursor::new(vec![b'x'; 10_000])),
            None::<Cursor<Vec<u8>>>,
            &limits(100, 100),
        );
        let output = collector.finish();
        assert_eq!(output.stdout.len(), 100);
        assert_eq!(output.integrity, OutputIntegrity::TruncatedByJudgeLimit);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let collector = OutputCollector::start(
            Some(Cursor::new(vec![0xff, b'a'])),
            None::<Cursor<Vec<u8>>>,
            &limits(100, 100),
        );
        assert_eq!(collector.finish().stdout, "\u{fffd}a");
    }

    #[test]
    fn read_error_wins_over_truncation() {
        assert_eq!(
            combine(OutputIntegrity::TruncatedByJudgeLimit, OutputIntegrity::ReadError),
            OutputIntegrity::ReadError
        );
        assert_eq!(
            combine(OutputIntegrity::Complete, OutputIntegrity::Complete),
            OutputIntegrity::Complete
        );
    }
}
