//! Script execution: AppleScript/JXA through the host scripting bridge,
//! shell through `/bin/bash -c`, all behind a preflight denylist.
//!
//! The denylist is defensive-only, not a sandbox. Shell timeouts are
//! enforced by killing the child when the wall-clock timer fires; the timer
//! is authoritative, so children that ignore catchable signals cannot
//! stretch their deadline.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::PlatformError;
use crate::platform::ScriptHostLanguage;
use crate::platform::SystemOperations;

use macos_use_proto::macosusesdk::v1::ExecuteScriptRequest;
use macos_use_proto::macosusesdk::v1::ScriptLanguage;
use macos_use_proto::macosusesdk::v1::ScriptResult;
use macos_use_proto::macosusesdk::v1::ValidateScriptResponse;

/// Case-insensitive substring rejects, checked before any work.
const DENYLIST: [&str; 2] = ["rm -rf /", "sudo"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-stream ceiling on captured script output. `ScriptResult` travels in
/// a unary response, so the bound exists to keep stdout+stderr comfortably
/// inside the default 4 MiB gRPC message limit; 256 KiB per stream is
/// generous for automation scripts that print extracted data. Anything past
/// the ceiling is discarded (the read continues to EOF) and the truncation
/// is logged.
const OUTPUT_CEILING_BYTES: usize = 256 * 1024;

const SHELL: &str = "/bin/bash";

pub struct ScriptExecutor {
    system: Arc<dyn SystemOperations>,
}

impl ScriptExecutor {
    pub fn new(system: Arc<dyn SystemOperations>) -> Self {
        Self { system }
    }

    pub async fn execute(&self, request: ExecuteScriptRequest) -> Result<ScriptResult> {
        preflight(&request.source)?;

        match request.language() {
            ScriptLanguage::Applescript => {
                self.execute_hosted(ScriptHostLanguage::AppleScript, &request)
                    .await
            }
            ScriptLanguage::Jxa => {
                self.execute_hosted(ScriptHostLanguage::Jxa, &request).await
            }
            ScriptLanguage::Shell => execute_shell(&request).await,
            ScriptLanguage::Unspecified => Err(AutomationError::invalid_argument(
                reason::INVALID_ENUM_VALUE,
                "language must be specified",
            )),
        }
    }

    /// Compile-only validation. Shell scripts are syntactically accepted
    /// iff non-empty; hosted languages go through the real compiler.
    pub async fn validate(
        &self,
        language: ScriptLanguage,
        source: &str,
    ) -> Result<ValidateScriptResponse> {
        preflight(source)?;

        let hosted = match language {
            ScriptLanguage::Applescript => ScriptHostLanguage::AppleScript,
            ScriptLanguage::Jxa => ScriptHostLanguage::Jxa,
            ScriptLanguage::Shell => {
                return Ok(ValidateScriptResponse {
                    valid: true,
                    message: String::new(),
                });
            }
            ScriptLanguage::Unspecified => {
                return Err(AutomationError::invalid_argument(
                    reason::INVALID_ENUM_VALUE,
                    "language must be specified",
                ));
            }
        };
        match self.system.compile_script(hosted, source).await {
            Ok(()) => Ok(ValidateScriptResponse {
                valid: true,
                message: String::new(),
            }),
            Err(PlatformError::Failure { message, .. }) => Ok(ValidateScriptResponse {
                valid: false,
                message,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn execute_hosted(
        &self,
        language: ScriptHostLanguage,
        request: &ExecuteScriptRequest,
    ) -> Result<ScriptResult> {
        let start = Instant::now();

        if let Err(err) = self.system.compile_script(language, &request.source).await {
            return match err {
                PlatformError::Failure { message, code } => Ok(ScriptResult {
                    success: false,
                    output: String::new(),
                    error: message,
                    exit_code: code,
                    duration: start.elapsed().as_secs_f64(),
                    timed_out: false,
                }),
                other => Err(other.into()),
            };
        }

        if request.compile_only {
            return Ok(ScriptResult {
                success: true,
                output: "Script compiled successfully".to_string(),
                error: String::new(),
                exit_code: 0,
                duration: start.elapsed().as_secs_f64(),
                timed_out: false,
            });
        }

        match self.system.run_script(language, &request.source).await {
            Ok(output) => Ok(ScriptResult {
                success: true,
                output: output.output,
                error: String::new(),
                exit_code: 0,
                duration: start.elapsed().as_secs_f64(),
                timed_out: false,
            }),
            Err(PlatformError::Failure { message, code }) => Ok(ScriptResult {
                success: false,
                output: String::new(),
                error: message,
                exit_code: code,
                duration: start.elapsed().as_secs_f64(),
                timed_out: false,
            }),
            Err(other) => Err(other.into()),
        }
    }
}

fn preflight(source: &str) -> Result<()> {
    if source.is_empty() {
        return Err(AutomationError::required_field("source"));
    }
    let lowered = source.to_lowercase();
    for banned in DENYLIST {
        if lowered.contains(banned) {
            return Err(AutomationError::permission_denied(
                reason::SECURITY_VIOLATION,
                format!("script contains banned fragment {banned:?}"),
            ));
        }
    }
    Ok(())
}

async fn execute_shell(request: &ExecuteScriptRequest) -> Result<ScriptResult> {
    let start = Instant::now();
    let timeout = if request.timeout > 0.0 {
        Duration::from_secs_f64(request.timeout)
    } else {
        DEFAULT_TIMEOUT
    };

    let mut command = Command::new(SHELL);
    command.arg("-c").arg(&request.source);
    if !request.working_directory.is_empty() {
        command.current_dir(&request.working_directory);
    }
    // The child inherits the process environment with the request's map
    // overlaid; an explicit PATH wins over both.
    for (key, value) in &request.environment {
        command.env(key, value);
    }
    if !request.path.is_empty() {
        command.env("PATH", &request.path);
    }
    command
        .stdin(if request.stdin.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|err| AutomationError::internal(reason::PLATFORM_FAILURE, err.to_string()))?;

    if !request.stdin.is_empty()
        && let Some(mut stdin) = child.stdin.take()
    {
        let payload = request.stdin.clone();
        // Close the pipe once written so the child sees EOF.
        tokio::spawn(async move {
            let _ = stdin.write_all(payload.as_bytes()).await;
        });
    }

    let stdout = child.stdout.take().ok_or_else(|| {
        AutomationError::internal(reason::PLATFORM_FAILURE, "stdout pipe not captured")
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        AutomationError::internal(reason::PLATFORM_FAILURE, "stderr pipe not captured")
    })?;
    let stdout_handle = tokio::spawn(capture_stream(stdout));
    let stderr_handle = tokio::spawn(capture_stream(stderr));

    let mut timed_out = false;
    let exit_code = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status.code().unwrap_or(-1),
        Ok(Err(err)) => {
            return Err(AutomationError::internal(
                reason::PLATFORM_FAILURE,
                err.to_string(),
            ));
        }
        Err(_) => {
            // Deadline hit: the kill is uncatchable, so the timer alone
            // decides the timed-out outcome.
            timed_out = true;
            let _ = child.start_kill();
            let _ = child.wait().await;
            -1
        }
    };

    let stdout = stream_output("stdout", stdout_handle.await)?;
    let stderr = stream_output("stderr", stderr_handle.await)?;
    let duration = start.elapsed().as_secs_f64();

    Ok(ScriptResult {
        success: !timed_out && exit_code == 0,
        output: stdout,
        error: if timed_out {
            format!("command timed out after {:.1}s", timeout.as_secs_f64())
        } else {
            stderr
        },
        exit_code,
        duration,
        timed_out,
    })
}

struct CapturedStream {
    bytes: Vec<u8>,
    truncated: bool,
}

fn stream_output(
    stream: &str,
    joined: std::result::Result<std::io::Result<CapturedStream>, tokio::task::JoinError>,
) -> Result<String> {
    match joined {
        Ok(Ok(captured)) => {
            if captured.truncated {
                debug!("script {stream} truncated to {OUTPUT_CEILING_BYTES} bytes");
            }
            Ok(String::from_utf8_lossy(&captured.bytes).into_owned())
        }
        Ok(Err(err)) => Err(AutomationError::internal(
            reason::PLATFORM_FAILURE,
            err.to_string(),
        )),
        Err(err) => Err(AutomationError::internal(
            reason::PLATFORM_FAILURE,
            err.to_string(),
        )),
    }
}

/// Collects one output stream up to [`OUTPUT_CEILING_BYTES`], then keeps
/// draining to EOF so the child never stalls on a full pipe once the
/// ceiling is reached.
async fn capture_stream<R: AsyncRead + Unpin>(mut stream: R) -> std::io::Result<CapturedStream> {
    let mut captured = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 4096];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        let room = OUTPUT_CEILING_BYTES - captured.len();
        if room == 0 {
            truncated = true;
            continue;
        }
        let keep = read.min(room);
        captured.extend_from_slice(&chunk[..keep]);
        if keep < read {
            truncated = true;
        }
    }
    Ok(CapturedStream {
        bytes: captured,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn shell_request(source: &str) -> ExecuteScriptRequest {
        ExecuteScriptRequest {
            language: ScriptLanguage::Shell as i32,
            source: source.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn denylist_matches_case_insensitively() {
        assert!(preflight("echo ok").is_ok());
        for banned in ["sudo reboot", "SUDO reboot", "rm -rf / --no-preserve-root"] {
            let err = preflight(banned).unwrap_err();
            assert_eq!(err.reason(), reason::SECURITY_VIOLATION);
            assert_eq!(err.code(), tonic::Code::PermissionDenied);
        }
    }

    #[tokio::test]
    async fn shell_captures_stdout_and_exit_code() {
        let result = execute_shell(&shell_request("printf hello; exit 3"))
            .await
            .unwrap();
        assert_eq!(result.output, "hello");
        assert_eq!(result.exit_code, 3);
        assert!(!result.success);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn shell_output_stops_at_the_ceiling() {
        let result = execute_shell(&shell_request("head -c 400000 /dev/zero"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output.len(), OUTPUT_CEILING_BYTES);
    }

    #[tokio::test]
    async fn shell_env_overlay_and_stdin() {
        let result = execute_shell(&ExecuteScriptRequest {
            language: ScriptLanguage::Shell as i32,
            source: "read line; printf '%s-%s' \"$line\" \"$GREETING\"".to_string(),
            environment: [("GREETING".to_string(), "hi".to_string())].into(),
            stdin: "input\n".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(result.output, "input-hi");
        assert!(result.success);
    }

    #[tokio::test]
    async fn shell_timeout_kills_the_child() {
        let started = Instant::now();
        let result = execute_shell(&ExecuteScriptRequest {
            language: ScriptLanguage::Shell as i32,
            source: "sleep 30".to_string(),
            timeout: 0.3,
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn shell_working_directory_applies() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute_shell(&ExecuteScriptRequest {
            language: ScriptLanguage::Shell as i32,
            source: "pwd".to_string(),
            working_directory: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(result.success);
        assert!(result.output.trim_end().ends_with(
            dir.path().file_name().unwrap().to_str().unwrap()
        ));
    }
}
