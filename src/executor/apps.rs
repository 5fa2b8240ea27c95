use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::safety::unsafe_app_name_char;

/// Application lifecycle and focus.
#[async_trait]
pub trait AppController: Send + Sync {
    /// Whether an application with this name is running.
    async fn find(&self, name: &str) -> DeskPilotResult<bool>;
    /// Brings a running application to the foreground.
    async fn activate(&self, name: &str) -> DeskPilotResult<bool>;
    async fn launch(&self, name: &str) -> DeskPilotResult<bool>;
    async fn close(&self, name: &str) -> DeskPilotResult<bool>;
}

/// Drives applications through the platform's own command-line tools.
#[derive(Debug, Default, Clone)]
pub struct SystemAppController;

async fn run(program: &str, args: &[&str]) -> DeskPilotResult<bool> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DeskPilotError::App(format!("{program}: {e}")))?;
    if !output.status.success() {
        tracing::debug!(
            program,
            status = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "app command returned non-zero"
        );
    }
    Ok(output.status.success())
}

/// Trimmed `name`, refused when it could be read as script or shell syntax.
fn checked_name(name: &str) -> DeskPilotResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DeskPilotError::App("empty app name".into()));
    }
    if let Some(found) = unsafe_app_name_char(trimmed) {
        return Err(DeskPilotError::App(format!(
            "refusing app name {trimmed:?}: contains {found:?}"
        )));
    }
    Ok(trimmed)
}

/// osascript arguments that run `tell application <name> to <verb>` with the
/// name passed through `argv` instead of spliced into the script.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript_args(verb: &str, name: &str) -> Vec<String> {
    vec![
        "-e".into(),
        "on run argv".into(),
        "-e".into(),
        format!("tell application (item 1 of argv) to {verb}"),
        "-e".into(),
        "end run".into(),
        name.into(),
    ]
}

/// Single-quoted PowerShell literal; embedded quotes are doubled.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Process-name form used by `pgrep`/`pkill`/`tasklist`.
fn process_name(name: &str) -> String {
    let trimmed = name.trim();
    #[cfg(target_os = "windows")]
    {
        if trimmed.to_lowercase().ends_with(".exe") {
            trimmed.to_string()
        } else {
            format!("{trimmed}.exe")
        }
    }
    #[cfg(not(target_os = "windows"))]
    {
        trimmed.to_lowercase()
    }
}

#[async_trait]
impl AppController for SystemAppController {
    async fn find(&self, name: &str) -> DeskPilotResult<bool> {
        let proc = process_name(checked_name(name)?);
        #[cfg(target_os = "windows")]
        {
            let filter = format!("IMAGENAME eq {proc}");
            let output = Command::new("tasklist")
                .args(["/FI", filter.as_str(), "/NH"])
                .output()
                .await
                .map_err(|e| DeskPilotError::App(format!("tasklist: {e}")))?;
            Ok(String::from_utf8_lossy(&output.stdout)
                .to_lowercase()
                .contains(&proc.to_lowercase()))
        }
        #[cfg(not(target_os = "windows"))]
        {
            run("pgrep", &["-if", proc.as_str()]).await
        }
    }

    async fn activate(&self, name: &str) -> DeskPilotResult<bool> {
        let name = checked_name(name)?;
        #[cfg(target_os = "macos")]
        {
            let args = applescript_args("activate", name);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            run("osascript", &args).await
        }
        #[cfg(target_os = "windows")]
        {
            let script = format!(
                "(New-Object -ComObject WScript.Shell).AppActivate({})",
                powershell_quote(name)
            );
            run("powershell", &["-NoProfile", "-Command", script.as_str()]).await
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            run("wmctrl", &["-a", name]).await
        }
    }

    async fn launch(&self, name: &str) -> DeskPilotResult<bool> {
        let name = checked_name(name)?;
        tracing::info!(app = name, "launching application");
        #[cfg(target_os = "macos")]
        {
            run("open", &["-a", name]).await
        }
        #[cfg(target_os = "windows")]
        {
            let script = format!("Start-Process -FilePath {}", powershell_quote(name));
            run("powershell", &["-NoProfile", "-Command", script.as_str()]).await
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            // Detached: the launched app outlives this process.
            Command::new(name.to_lowercase())
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
                .map(|_| true)
                .map_err(|e| DeskPilotError::App(format!("launch {name}: {e}")))
        }
    }

    async fn close(&self, name: &str) -> DeskPilotResult<bool> {
        let name = checked_name(name)?;
        let proc = process_name(name);
        tracing::info!(app = %proc, "closing application");
        #[cfg(target_os = "macos")]
        {
            let args = applescript_args("quit", name);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            run("osascript", &args).await
        }
        #[cfg(target_os = "windows")]
        {
            run("taskkill", &["/IM", proc.as_str()]).await
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            run("pkill", &["-i", proc.as_str()]).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn process_name_is_lowercased() {
        assert_eq!(process_name("  Firefox "), "firefox");
    }

    #[test]
    fn app_name_travels_as_an_argument() {
        let name = "Google Chrome";
        let args = applescript_args("activate", name);
        assert_eq!(args.last().map(String::as_str), Some(name));
        assert!(args.iter().take(args.len() - 1).all(|a| !a.contains(name)));
        assert_eq!(powershell_quote("O'Brien App"), "'O''Brien App'");
    }

    #[tokio::test]
    async fn unsafe_names_never_reach_a_command() {
        let apps = SystemAppController;
        for name in ["Finder\" to quit", "calc & notepad", "  ", "-n"] {
            assert!(matches!(apps.activate(name).await, Err(DeskPilotError::App(_))), "{name:?}");
            assert!(matches!(apps.launch(name).await, Err(DeskPilotError::App(_))), "{name:?}");
            assert!(matches!(apps.close(name).await, Err(DeskPilotError::App(_))), "{name:?}");
            assert!(matches!(apps.find(name).await, Err(DeskPilotError::App(_))), "{name:?}");
        }
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test]
    async fn missing_program_is_an_app_error() {
        let err = run("deskpilot-no-such-binary", &[]).await.unwrap_err();
        assert!(matches!(err, DeskPilotError::App(_)));
    }
}
