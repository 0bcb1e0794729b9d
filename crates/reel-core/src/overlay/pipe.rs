//! ffmpeg child processes streaming raw RGB frames in and out.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::thread::JoinHandle;

use crate::tools::{self, ToolPaths};

use super::info::FrameRate;

/// Exit status and captured diagnostics of a finished child.
pub struct Finished {
    pub success: bool,
    pub status: String,
    pub stderr: String,
}

fn finish_child(mut child: Child, stderr: Option<JoinHandle<String>>) -> io::Result<Finished> {
    let status = child.wait()?;
    Ok(Finished {
        success: status.success(),
        status: tools::describe_status(status),
        stderr: tools::join_stderr(stderr),
    })
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// `ffmpeg -i input ... -f rawvideo -pix_fmt rgb24 pipe:1`, optionally scaled.
pub struct FrameDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl FrameDecoder {
    pub fn spawn(
        tools: &ToolPaths,
        input: &Path,
        scale_to: Option<(u32, u32)>,
    ) -> io::Result<Self> {
        let mut cmd = tools.ffmpeg_command();
        cmd.arg("-i").arg(input).args(["-map", "0:v:0", "-an", "-sn"]);
        if let Some((w, h)) = scale_to {
            cmd.arg("-vf").arg(format!("scale={}:{}:flags=bicubic", w, h));
        }
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "decoder stdout not captured"))?;
        let stderr = child.stderr.take().map(tools::drain_stderr);
        tracing::debug!(pid = child.id(), input = %input.display(), "frame decoder started");
        Ok(Self {
            child,
            stdout: BufReader::with_capacity(1 << 20, stdout),
            stderr,
        })
    }

    /// Fill `buf` with the next frame. `Ok(false)` at a clean end of stream;
    /// a stream ending mid-frame is `UnexpectedEof`.
    pub fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("decoder stopped after {} of {} frame bytes", filled, buf.len()),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub fn finish(self) -> io::Result<Finished> {
        drop(self.stdout);
        finish_child(self.child, self.stderr)
    }

    pub fn kill(mut self) {
        kill_child(&mut self.child);
    }
}

/// `ffmpeg -f rawvideo ... -i pipe:0 -an -c:v libx264 output`.
pub struct FrameEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
}

impl FrameEncoder {
    pub fn spawn(
        tools: &ToolPaths,
        output: &Path,
        (width, height): (u32, u32),
        rate: FrameRate,
    ) -> io::Result<Self> {
        let mut cmd = tools.ffmpeg_command();
        cmd.args(["-y", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(rate.to_arg())
            .args(["-i", "pipe:0", "-an"])
            // Single-threaded x264 so identical input gives identical output.
            .args([
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "20", "-pix_fmt", "yuv420p",
                "-threads", "1",
            ])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "encoder stdin not captured"))?;
        let stderr = child.stderr.take().map(tools::drain_stderr);
        tracing::debug!(pid = child.id(), output = %output.display(), width, height, "frame encoder started");
        Ok(Self {
            child,
            stdin: Some(BufWriter::with_capacity(1 << 20, stdin)),
            stderr,
        })
    }

    pub fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(w) => w.write_all(frame),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder input closed")),
        }
    }

    /// Close the input and wait for the encoder to flush the container.
    pub fn finish(mut self) -> io::Result<Finished> {
        if let Some(mut w) = self.stdin.take() {
            // A flush error means the encoder already exited; its status says why.
            let _ = w.flush();
        }
        finish_child(self.child, self.stderr)
    }

    pub fn kill(mut self) {
        self.stdin.take();
        kill_child(&mut self.child);
    }
}
