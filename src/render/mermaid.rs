use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{RenderError, RenderJob, RenderOutput, Renderer};

/// Runs the mermaid-cli executable (`mmdc`) as a subprocess.
///
/// The child is killed if the render future is dropped or the timeout elapses.
#[derive(Debug, Clone)]
pub struct MermaidCli {
    executable: PathBuf,
    timeout: Duration,
}

impl MermaidCli {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn args(job: &RenderJob) -> Vec<&OsStr> {
        let mut args = vec![
            OsStr::new("-i"),
            job.input.as_os_str(),
            OsStr::new("-o"),
            job.output.as_os_str(),
        ];
        if let Some(config) = &job.config {
            args.push(OsStr::new("-p"));
            args.push(config.as_os_str());
        }
        args
    }
}

#[async_trait]
impl Renderer for MermaidCli {
    async fn render(&self, job: &RenderJob) -> Result<RenderOutput, RenderError> {
        match tokio::fs::metadata(&self.executable).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::RendererMissing(self.executable.clone()));
            }
            Err(e) => {
                return Err(RenderError::Io {
                    context: format!(
                        "could not stat renderer executable [{}]",
                        self.executable.display()
                    ),
                    source: e,
                });
            }
        }

        tracing::debug!(
            executable = %self.executable.display(),
            input = %job.input.display(),
            output = %job.output.display(),
            "Invoking renderer"
        );

        let mut cmd = Command::new(&self.executable);
        cmd.args(Self::args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))?
            .map_err(|e| RenderError::Io {
                context: format!(
                    "failed when executing renderer [{}]",
                    self.executable.display()
                ),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        tracing::debug!(stdout = %stdout, stderr = %stderr, "Renderer finished");
        Ok(RenderOutput { stdout, stderr })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::*;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn job(dir: &TempDir) -> RenderJob {
        let input = dir.path().join("in.mmd");
        std::fs::write(&input, "graph TB; A-->B").unwrap();
        RenderJob {
            input,
            output: dir.path().join("out.svg"),
            config: None,
        }
    }

    #[test]
    fn args_include_config_only_when_set() {
        let mut job = RenderJob {
            input: PathBuf::from("/in/a.mmd"),
            output: PathBuf::from("/out/a.svg"),
            config: None,
        };
        assert_eq!(MermaidCli::args(&job), ["-i", "/in/a.mmd", "-o", "/out/a.svg"]);

        job.config = Some(PathBuf::from("/etc/puppeteer.json"));
        assert_eq!(
            MermaidCli::args(&job),
            ["-i", "/in/a.mmd", "-o", "/out/a.svg", "-p", "/etc/puppeteer.json"]
        );
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let dir = TempDir::new().unwrap();
        let cli = MermaidCli::new(dir.path().join("mmdc"), Duration::from_secs(5));

        let err = cli.render(&job(&dir)).await.unwrap_err();
        assert!(matches!(err, RenderError::RendererMissing(_)));
    }

    #[tokio::test]
    async fn successful_render_writes_output() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "mmdc",
            r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
echo "<svg/>" > "$out"
echo rendered"#,
        );
        let cli = MermaidCli::new(script, Duration::from_secs(5));
        let job = job(&dir);

        let output = cli.render(&job).await.unwrap();
        assert_eq!(output.stdout.trim(), "rendered");
        assert_eq!(std::fs::read_to_string(&job.output).unwrap().trim(), "<svg/>");
    }

    #[tokio::test]
    async fn non_zero_exit_captures_diagnostics() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "mmdc", "echo 'Parse error on line 1' >&2\nexit 3");
        let cli = MermaidCli::new(script, Duration::from_secs(5));

        match cli.render(&job(&dir)).await.unwrap_err() {
            RenderError::Failed { stderr, status, .. } => {
                assert!(stderr.contains("Parse error on line 1"));
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_renderer_times_out() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "mmdc", "sleep 10");
        let cli = MermaidCli::new(script, Duration::from_millis(200));

        let err = cli.render(&job(&dir)).await.unwrap_err();
        assert!(matches!(err, RenderError::Timeout(_)));
    }
}
