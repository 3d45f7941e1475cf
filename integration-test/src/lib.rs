//! Test driver for ldifconv integration tests.
//!
//! Spawns `ldifconv` with:
//! - stdin: a pipe fed with the test input, then closed
//! - stdout and stderr: pipes, captured for assertions

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

/// A running ldifconv process.
pub struct TestSession {
    child: Child,
    /// Captured stdout, populated by background thread.
    stdout_capture: Arc<Mutex<Vec<u8>>>,
    /// Captured stderr, populated by background thread.
    stderr_capture: Arc<Mutex<Vec<u8>>>,
    _stdout_thread: thread::JoinHandle<()>,
    _stderr_thread: thread::JoinHandle<()>,
}

fn drain<R: Read + Send + 'static>(
    mut pipe: R,
    capture: Arc<Mutex<Vec<u8>>>,
    what: &'static str,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    capture
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(&buf[..n]);
                }
                Err(e) => {
                    eprintln!("{what} drain error: {e}");
                    break;
                }
            }
        }
    })
}

impl TestSession {
    /// Spawn ldifconv and feed it `input` on stdin.
    ///
    /// `binary` is the path to the ldifconv binary.
    /// `args` are the command-line arguments.
    /// `env` are additional environment variables to set.
    pub fn spawn(
        binary: &str,
        args: &[&str],
        env: &[(&str, &str)],
        input: &[u8],
    ) -> std::io::Result<TestSession> {
        let mut cmd = Command::new(binary);
        cmd.args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stdout_capture = Arc::new(Mutex::new(Vec::new()));
        let stderr_capture = Arc::new(Mutex::new(Vec::new()));
        let stdout_thread = match child.stdout.take() {
            Some(pipe) => drain(pipe, Arc::clone(&stdout_capture), "stdout"),
            None => thread::spawn(|| {}),
        };
        let stderr_thread = match child.stderr.take() {
            Some(pipe) => drain(pipe, Arc::clone(&stderr_capture), "stderr"),
            None => thread::spawn(|| {}),
        };

        // Dropping stdin closes it so the child sees end of input.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }

        Ok(TestSession {
            child,
            stdout_capture,
            stderr_capture,
            _stdout_thread: stdout_thread,
            _stderr_thread: stderr_thread,
        })
    }

    /// Wait for the child to exit and assert the exit code.
    pub fn wait_exit(mut self, expected_code: i32) -> SessionOutput {
        let status = self.child.wait().expect("failed to wait for child");
        let code = status.code().unwrap_or(-1);

        let _ = self._stdout_thread.join();
        let _ = self._stderr_thread.join();

        let stdout = String::from_utf8_lossy(&self.stdout_capture.lock().unwrap()).to_string();
        let stderr = String::from_utf8_lossy(&self.stderr_capture.lock().unwrap()).to_string();

        assert_eq!(
            code, expected_code,
            "expected exit code {expected_code}, got {code}\nstdout:\n{stdout}\nstderr:\n{stderr}"
        );

        SessionOutput { stdout, stderr }
    }
}

/// Output captured from a completed session.
pub struct SessionOutput {
    pub stdout: String,
    pub stderr: String,
}
