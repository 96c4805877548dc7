//! Child process plumbing for one UCI engine.
//!
//! Owns the spawned binary and its pipes. Stdout is pumped by a dedicated
//! reader thread into an mpsc channel so reads never block the protocol
//! loop; stdin sits behind its own mutex so a cooperative `stop` can be
//! written while a search loop is draining the channel.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct UciProcess {
    name: String,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    rx: Mutex<Receiver<String>>,
}

impl UciProcess {
    /// Spawn the engine binary with piped streams and start the stdout
    /// reader thread.
    pub fn spawn(
        name: &str,
        path: &Path,
        envs: &[(String, String)],
    ) -> std::io::Result<Self> {
        let mut cmd = Command::new(path);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout not piped"))?;

        let (tx, rx) = mpsc::channel();
        let reader_name = name.to_string();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(Result::ok) {
                log::trace!("[{reader_name}] << {line}");
                if tx.send(line).is_err() {
                    break;
                }
            }
            // Reader exits on EOF; the closed channel is how the session
            // observes an unexpected process death.
        });

        Ok(UciProcess {
            name: name.to_string(),
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            rx: Mutex::new(rx),
        })
    }

    /// Write one protocol line.
    pub fn send(&self, cmd: &str) -> std::io::Result<()> {
        log::trace!("[{}] >> {cmd}", self.name);
        let mut stdin = lock(&self.stdin);
        stdin.write_all(cmd.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    /// Next output line, or `Err(Timeout)` after `timeout`, or
    /// `Err(Disconnected)` once the process has closed its stdout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        lock(&self.rx).recv_timeout(timeout)
    }

    /// Discard everything currently buffered, returning the drained lines.
    pub fn drain(&self) -> Vec<String> {
        let rx = lock(&self.rx);
        let mut drained = Vec::new();
        while let Ok(line) = rx.try_recv() {
            drained.push(line);
        }
        drained
    }

    /// Whether the process is still running.
    pub fn is_alive(&self) -> bool {
        matches!(lock(&self.child).try_wait(), Ok(None))
    }

    /// Force-terminate the process and reap it.
    pub fn kill(&self) {
        let mut child = lock(&self.child);
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for UciProcess {
    fn drop(&mut self) {
        // Graceful quit first, then make sure no zombie is left behind.
        let _ = self.send("quit");
        thread::sleep(Duration::from_millis(10));
        self.kill();
    }
}
