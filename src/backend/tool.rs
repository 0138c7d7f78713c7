use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::debug;

use crate::error::{ConvError, Result};

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// External tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<OsString>,
    pub description: String,
    success_codes: Vec<i32>,
}

impl ToolCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            success_codes: vec![0],
        }
    }

    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    /// Add a path argument
    pub fn path<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().as_os_str())
    }

    /// Treat an extra exit code as success (qpdf exits 3 on warnings)
    pub fn accept_exit_code(mut self, code: i32) -> Self {
        self.success_codes.push(code);
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ConvError {
        ConvError::Tool {
            tool: self.binary_path.clone(),
            message: format!("Failed to execute '{}': {}", self.binary_path, e),
        }
    }

    fn check_status(&self, code: Option<i32>, stderr: &str) -> Result<()> {
        match code {
            Some(code) if self.success_codes.contains(&code) => Ok(()),
            _ => Err(ConvError::Tool {
                tool: self.binary_path.clone(),
                message: format!(
                    "{} failed (exit code {}): {}",
                    self.description,
                    code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()),
                    stderr_tail(stderr)
                ),
            }),
        }
    }

    /// Run to completion, capturing output
    pub fn execute(&self) -> Result<Output> {
        debug!("Executing {}: {} {:?}", self.description, self.binary_path, self.args);

        let output = self.command().output().map_err(|e| self.spawn_error(e))?;
        self.check_status(output.status.code(), &String::from_utf8_lossy(&output.stderr))?;
        Ok(output)
    }

    /// Run while feeding each stdout line to `on_line`.
    ///
    /// stderr is spooled to an anonymous temp file so a chatty tool can't
    /// block on a full pipe while stdout is being read.
    pub fn execute_streaming(&self, mut on_line: impl FnMut(&str)) -> Result<()> {
        debug!("Executing {}: {} {:?}", self.description, self.binary_path, self.args);

        let mut stderr_file: File = tempfile::tempfile()?;
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Tools echo file names verbatim, which need not be UTF-8.
        let read_result = match child.stdout.take() {
            Some(stdout) => read_lines_lossy(stdout, &mut on_line),
            None => Ok(()),
        };

        let status = child.wait()?;
        read_result?;

        let mut stderr = String::new();
        stderr_file.seek(SeekFrom::Start(0))?;
        stderr_file.read_to_string(&mut stderr)?;

        self.check_status(status.code(), &stderr)
    }
}

fn read_lines_lossy(reader: impl Read, on_line: &mut impl FnMut(&str)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        on_line(String::from_utf8_lossy(&buf).trim());
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_args() {
        let cmd = ToolCommand::new("gs", "PDF merge")
            .arg("-sDEVICE=pdfwrite")
            .args(["-o", "out.pdf"])
            .path(Path::new("a.pdf"));

        let args: Vec<&OsStr> = cmd.args.iter().map(|a| a.as_os_str()).collect();
        assert_eq!(args, vec!["-sDEVICE=pdfwrite", "-o", "out.pdf", "a.pdf"]);
    }

    #[test]
    fn test_missing_binary_is_a_tool_error() {
        let result =
            ToolCommand::new("fileconv-definitely-not-installed", "Missing tool").execute();
        match result {
            Err(ConvError::Tool { tool, .. }) => {
                assert_eq!(tool, "fileconv-definitely-not-installed")
            }
            other => panic!("expected tool error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&text);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[test]
    fn test_lossy_lines_keep_non_utf8_output() {
        let mut seen = Vec::new();
        let output: &[u8] = b"50% caf\xe9.epub\r\n100%";
        read_lines_lossy(output, &mut |line: &str| seen.push(line.to_string())).unwrap();
        assert_eq!(seen, vec!["50% caf\u{fffd}.epub", "100%"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_streaming_survives_non_utf8_stdout() {
        let mut seen = Vec::new();
        ToolCommand::new("sh", "Latin-1 echo")
            .arg("-c")
            .arg("printf '50%% caf\\351.epub\\n'; exit 0")
            .execute_streaming(|line| seen.push(line.to_string()))
            .unwrap();
        assert_eq!(seen, vec!["50% caf\u{fffd}.epub"]);
    }

    #[test]
    fn test_accepted_exit_codes() {
        let cmd = ToolCommand::new("qpdf", "PDF optimize").accept_exit_code(3);
        assert!(cmd.check_status(Some(0), "").is_ok());
        assert!(cmd.check_status(Some(3), "warning").is_ok());
        assert!(cmd.check_status(Some(2), "error").is_err());
        assert!(cmd.check_status(None, "killed").is_err());
    }
}
