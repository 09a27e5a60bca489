use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::MediaError;

/// Lines of stderr kept as the failure diagnostic
const DIAGNOSTIC_LINES: usize = 5;
/// Hard cap on the diagnostic, in characters
const DIAGNOSTIC_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Runs an external tool to completion under a time limit.
///
/// The child is killed if the limit expires or the calling future is dropped.
/// A nonzero exit becomes `ConversionFailed` with the tail of stderr.
pub async fn run_tool<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    limit: Duration,
) -> Result<ToolOutput, MediaError> {
    let name = program.display().to_string();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!("Running {}", name);

    let output = match tokio::time::timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!("{} not found on this system", name);
            return Err(MediaError::ConversionFailed(format!("{} not found", name)));
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to start {}: {}", name, e);
            return Err(MediaError::ConversionFailed(format!(
                "could not start {}",
                name
            )));
        }
        Err(_) => {
            tracing::warn!("{} exceeded {:?}, killed", name, limit);
            return Err(MediaError::Timeout(limit));
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        tracing::warn!("{} exited with {}: {}", name, code, stderr.trim());
        return Err(MediaError::ConversionFailed(stderr_tail(&stderr)));
    }

    Ok(ToolOutput {
        stdout: output.stdout,
        stderr,
    })
}

/// Last few non-empty lines of a tool's stderr, trimmed to a readable size
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return "unknown error".to_string();
    }

    let tail = lines[lines.len().saturating_sub(DIAGNOSTIC_LINES)..].join("\n");
    let count = tail.chars().count();
    if count > DIAGNOSTIC_CHARS {
        tail.chars().skip(count - DIAGNOSTIC_CHARS).collect()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail() {
        assert_eq!(stderr_tail(""), "unknown error");
        assert_eq!(stderr_tail("a\n\nb\n"), "a\nb");

        let many: String = (0..20).map(|i| format!("line {}\n", i)).collect();
        assert_eq!(
            stderr_tail(&many),
            "line 15\nline 16\nline 17\nline 18\nline 19"
        );

        let long = "x".repeat(2000);
        assert_eq!(stderr_tail(&long).len(), DIAGNOSTIC_CHARS);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let result = run_tool(
            Path::new("/nonexistent/ffmpeg-xyz"),
            &["-version"],
            Duration::from_secs(5),
        )
        .await;
        match result {
            Err(MediaError::ConversionFailed(msg)) => assert!(msg.contains("not found")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_captures_stdout() {
        let out = run_tool(Path::new("sh"), &["-c", "echo hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let result = run_tool(
            Path::new("sh"),
            &["-c", "echo 'Invalid data found when processing input' >&2; exit 1"],
            Duration::from_secs(5),
        )
        .await;
        match result {
            Err(MediaError::ConversionFailed(msg)) => {
                assert_eq!(msg, "Invalid data found when processing input")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = std::time::Instant::now();
        let result = run_tool(
            Path::new("sh"),
            &["-c", "sleep 10"],
            Duration::from_millis(200),
        )
        .await;
        assert!(matches!(result, Err(MediaError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
