//! Locating and running the external media tools (`ffmpeg`, `ffprobe`).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, Command, ExitStatus};
use std::thread::JoinHandle;

use crate::config::ToolsConfig;

/// Diagnostics longer than this keep only their tail.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

impl ToolPaths {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ffprobe: cfg.ffprobe.clone(),
        }
    }

    /// Names of configured tools that cannot be found.
    pub fn missing(&self) -> Vec<String> {
        [&self.ffmpeg, &self.ffprobe]
            .into_iter()
            .filter(|p| !command_exists(p))
            .map(|p| p.display().to_string())
            .collect()
    }

    pub fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-nostdin", "-v", "error"]);
        cmd
    }
}

/// True if `program` is an existing file path or resolves on `PATH`.
pub fn command_exists(program: &Path) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", program.display()))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Read a child's stderr to the end on its own thread so the child never
/// blocks on a full pipe.
pub(crate) fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let mut reader = stderr;
        if let Err(e) = reader.read_to_end(&mut buf) {
            return format!("<failed to read stderr: {e}>");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

pub(crate) fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| {
            h.join()
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
        })
        .map(|s| tail(s.trim(), MAX_DIAGNOSTIC_BYTES).to_string())
        .unwrap_or_default()
}

/// "exit status 1", "terminated by signal 9", ...
pub(crate) fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return format!("terminated by signal {}", sig);
        }
    }
    "terminated abnormally".to_string()
}

/// Last `max` bytes of `s`, cut on a char boundary.
pub(crate) fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
