//! Configuration resolution.
//!
//! A configuration is either a `.toml` file holding the options, or an
//! executable module. Executable modules are untrusted user code, so they run
//! in their own child process and answer with exactly one JSON message on
//! stdout:
//!
//! ```text
//! {"cfg": {"sourceGlob": "reports/**/*.json", "outputDir": "bundle"}}
//! {"error": "something went wrong"}
//! ```

use crate::errors::ConfigError;
use crate::models::{Options, Request};
use serde::Deserialize;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Default time a configuration module gets to answer.
pub const DEFAULT_CONFIG_TIMEOUT: Duration = Duration::from_secs(30);

/// The one message a configuration process may send.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkerMessage {
    Resolved { cfg: Options },
    Failed { error: String },
}

/// Compute the options a run should use.
///
/// Direct requests pass through unchanged; configuration requests are
/// resolved into a fresh value.
pub async fn resolve_effective_options(
    request: &Request,
    timeout: Duration,
) -> Result<Options, ConfigError> {
    match request {
        Request::Direct(options) => Ok(options.clone()),
        Request::Config(path) => resolve_config(path, timeout).await,
    }
}

/// Resolve a configuration file into options.
pub async fn resolve_config(path: &Path, timeout: Duration) -> Result<Options, ConfigError> {
    let module = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| load_error(path, e.to_string()))?;

    info!("Loading config from: {}", module.display());

    if is_static(&module) {
        load_static(&module).await
    } else {
        run_isolated(&module, timeout).await
    }
}

fn is_static(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn load_error(path: &Path, reason: impl Into<String>) -> ConfigError {
    ConfigError::ModuleLoad {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse a static `.toml` configuration in-process.
async fn load_static(path: &Path) -> Result<Options, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| load_error(path, e.to_string()))?;

    toml::from_str(&content).map_err(|e| load_error(path, e.to_string()))
}

/// How long stderr may keep draining once the module has been killed.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// What the module left on stdout.
enum Reply {
    /// One complete JSON value, read before stdout closed.
    Message(String),
    /// Stdout closed without a complete value; the module has exited.
    Closed { output: String, status: ExitStatus },
}

/// Run an executable configuration module in a child process and wait for
/// its single message.
///
/// The module leads its own process group, and the whole group is killed
/// once the message arrives or the timeout expires.
async fn run_isolated(module: &Path, timeout: Duration) -> Result<Options, ConfigError> {
    let mut command = Command::new(module);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|e| spawn_error(module, e))?;
    let pid = child.id();
    debug!("Config process started (pid {:?})", pid);

    let stdout = child.stdout.take().ok_or_else(|| {
        ConfigError::Isolation(io::Error::new(
            io::ErrorKind::Other,
            "config stdout was not captured",
        ))
    })?;
    let mut stderr_task = tokio::spawn(drain(child.stderr.take()));

    let reply = tokio::time::timeout(timeout, await_reply(&mut child, stdout)).await;
    terminate(&mut child, pid).await;

    let stderr = match tokio::time::timeout(STDERR_GRACE, &mut stderr_task).await {
        Ok(Ok(text)) => text,
        _ => {
            stderr_task.abort();
            String::new()
        }
    };
    if !stderr.trim().is_empty() {
        debug!("Config stderr: {}", stderr.trim());
    }

    let reply = match reply {
        Ok(result) => result?,
        Err(_) => {
            warn!("Config {} timed out after {:?}", module.display(), timeout);
            return Err(ConfigError::Timeout {
                path: module.to_path_buf(),
                seconds: timeout.as_secs(),
            });
        }
    };

    let output = match reply {
        Reply::Message(message) => message,
        Reply::Closed { status, .. } if !status.success() => {
            let detail = match stderr.trim() {
                "" => format!("exited with {}", status),
                s => s.to_string(),
            };
            return Err(ConfigError::Execution(format!(
                "Configuration {} failed: {}",
                module.display(),
                detail
            )));
        }
        Reply::Closed { output, .. } => output,
    };

    match parse_message(&output)? {
        WorkerMessage::Resolved { cfg } => {
            debug!("Resolved config: {:?}", cfg);
            Ok(cfg)
        }
        WorkerMessage::Failed { error } => Err(ConfigError::Execution(error)),
    }
}

/// Read stdout line by line until it holds one complete JSON value.
/// Without one, wait for the module to exit.
async fn await_reply(child: &mut Child, stdout: ChildStdout) -> Result<Reply, ConfigError> {
    let mut lines = BufReader::new(stdout).lines();
    let mut output = String::new();

    while let Some(line) = lines.next_line().await.map_err(ConfigError::Isolation)? {
        output.push_str(&line);
        output.push('\n');
        if serde_json::from_str::<serde_json::Value>(output.trim()).is_ok() {
            return Ok(Reply::Message(output));
        }
    }

    let status = child.wait().await.map_err(ConfigError::Isolation)?;
    Ok(Reply::Closed { output, status })
}

async fn drain(stderr: Option<ChildStderr>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stderr) = stderr {
        if let Err(e) = stderr.read_to_end(&mut buf).await {
            debug!("Failed to read config stderr: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill the module and everything it started, then reap it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // A negative pid addresses the group; ESRCH once it is empty.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    // Fails only when the child was already reaped.
    let _ = child.start_kill();
    if let Err(e) = child.wait().await {
        debug!("Failed to reap config process: {}", e);
    }
}

fn spawn_error(module: &Path, err: io::Error) -> ConfigError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            load_error(module, err.to_string())
        }
        _ => ConfigError::Isolation(err),
    }
}

/// Parse the child's stdout as exactly one message.
fn parse_message(stdout: &str) -> Result<WorkerMessage, ConfigError> {
    let body = stdout.trim();
    if body.is_empty() {
        return Err(ConfigError::Protocol("no message received".to_string()));
    }

    serde_json::from_str(body).map_err(|e| ConfigError::Protocol(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    /// Write an executable shell script config module.
    #[cfg(unix)]
    pub(crate) fn write_module(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_parse_success_message() {
        let msg = parse_message(r#"{"cfg":{"sourceGlob":"r/*.json","outputDir":"out"}}"#);
        match assert_ok!(msg) {
            WorkerMessage::Resolved { cfg } => {
                assert_eq!(cfg, Options::new("r/*.json", "out"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(matches!(parse_message("  \n"), Err(ConfigError::Protocol(_))));
        assert!(matches!(
            parse_message("hello world"),
            Err(ConfigError::Protocol(_))
        ));
        assert!(matches!(
            parse_message("{\"error\":\"a\"}\n{\"error\":\"b\"}"),
            Err(ConfigError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_request_passes_through() {
        let options = Options::new("reports/*.json", "bundle");
        let request = Request::Direct(options.clone());

        let resolved = resolve_effective_options(&request, DEFAULT_CONFIG_TIMEOUT).await;
        assert_eq!(assert_ok!(resolved), options);
    }

    #[tokio::test]
    async fn test_missing_module_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.sh");

        let err = assert_err!(resolve_config(&missing, DEFAULT_CONFIG_TIMEOUT).await);
        assert!(matches!(err, ConfigError::ModuleLoad { .. }));
        assert!(err.to_string().starts_with("Failed to load"));
    }

    #[tokio::test]
    async fn test_static_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("aggregator.toml");
        std::fs::write(
            &path,
            "sourceGlob = \"reports/**/*.json\"\noutputDir = \"bundle\"\nincludeHtml = true\n",
        )
        .unwrap();

        let options = assert_ok!(resolve_config(&path, DEFAULT_CONFIG_TIMEOUT).await);
        assert_eq!(options.source_glob, "reports/**/*.json");
        assert_eq!(options.output_dir, PathBuf::from("bundle"));
        assert!(options.include_html);
    }

    #[tokio::test]
    async fn test_invalid_static_config_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("aggregator.toml");
        std::fs::write(&path, "outputDir = \"bundle\"\n").unwrap();

        let err = assert_err!(resolve_config(&path, DEFAULT_CONFIG_TIMEOUT).await);
        assert!(matches!(err, ConfigError::ModuleLoad { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_module_resolves_options() {
        let temp_dir = TempDir::new().unwrap();
        let module = write_module(
            temp_dir.path(),
            "config.sh",
            r#"echo '{"cfg":{"sourceGlob":"X","outputDir":"Y","open":true}}'"#,
        );

        let options = assert_ok!(resolve_config(&module, DEFAULT_CONFIG_TIMEOUT).await);
        assert_eq!(options.source_glob, "X");
        assert_eq!(options.output_dir, PathBuf::from("Y"));
        assert!(options.open);
        assert!(!options.include_html);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_module_error_message() {
        let temp_dir = TempDir::new().unwrap();
        let module = write_module(
            temp_dir.path(),
            "config.sh",
            r#"echo '{"error":"config exploded"}'"#,
        );

        let err = assert_err!(resolve_config(&module, DEFAULT_CONFIG_TIMEOUT).await);
        assert!(matches!(err, ConfigError::Execution(ref m) if m == "config exploded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_module_nonzero_exit_is_execution_error() {
        let temp_dir = TempDir::new().unwrap();
        let module = write_module(temp_dir.path(), "config.sh", "echo 'bad things' >&2\nexit 3");

        let err = assert_err!(resolve_config(&module, DEFAULT_CONFIG_TIMEOUT).await);
        match err {
            ConfigError::Execution(msg) => assert!(msg.contains("bad things")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_module_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.mjs");
        std::fs::write(&path, "export default () => ({})").unwrap();

        let err = assert_err!(resolve_config(&path, DEFAULT_CONFIG_TIMEOUT).await);
        assert!(matches!(err, ConfigError::ModuleLoad { .. }));
    }

    #[cfg(target_os = "linux")]
    fn is_alive(pid: libc::pid_t) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        // Zombies still answer signal 0.
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_background_process_does_not_block_answer() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("background.pid");
        let module = write_module(
            temp_dir.path(),
            "config.sh",
            &format!(
                "sleep 30 &\necho $! > '{}'\necho '{{\"cfg\":{{\"sourceGlob\":\"X\",\"outputDir\":\"Y\"}}}}'",
                pid_file.display()
            ),
        );

        let started = std::time::Instant::now();
        let options = assert_ok!(resolve_config(&module, Duration::from_secs(5)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(options, Options::new("X", "Y"));

        let pid: libc::pid_t = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = is_alive(pid);
        for _ in 0..100 {
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            alive = is_alive(pid);
        }
        assert!(!alive, "background process {} outlived resolution", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_module_that_keeps_running_after_answering() {
        let temp_dir = TempDir::new().unwrap();
        let module = write_module(
            temp_dir.path(),
            "config.sh",
            "echo '{\"cfg\":{\"sourceGlob\":\"X\",\n\"outputDir\":\"Y\"}}'\nexec sleep 30",
        );

        let options = assert_ok!(resolve_config(&module, Duration::from_secs(5)).await);
        assert_eq!(options.source_glob, "X");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_module_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let module = write_module(temp_dir.path(), "config.sh", "exec sleep 30");

        let err = assert_err!(resolve_config(&module, Duration::from_millis(200)).await);
        assert!(matches!(err, ConfigError::Timeout { .. }));
    }
}
