//! Post-shutdown auxiliary script launcher. Strictly best-effort: every
//! failure is logged and swallowed, the supervisor's kill path never waits
//! on it, and the launched process outlives the supervisor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::RestartScriptConfig;

/// Shutdown context the trigger decision is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownContext<'a> {
    pub announcement: Option<&'a str>,
    pub reason: &'a str,
    pub is_restarting: bool,
}

/// Fully resolved launch, produced by [`plan_launch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub script_path: PathBuf,
    pub command_line: String,
    pub working_directory: Option<PathBuf>,
    pub delay_ms: u64,
}

fn strip_outer_quotes(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn build_command_line(script_path: &Path, extra_args: &str) -> String {
    let path_str = script_path.display().to_string();
    let quoted = if path_str.chars().any(char::is_whitespace) {
        format!("\"{path_str}\"")
    } else {
        path_str
    };
    let trimmed = extra_args.trim();
    if trimmed.is_empty() {
        quoted
    } else {
        format!("{quoted} {trimmed}")
    }
}

/// Decides whether the configured script should run for this shutdown, and
/// with what command line and working directory. Pure; platform and
/// file-existence checks happen at launch time.
pub fn plan_launch(
    cfg: &RestartScriptConfig,
    data_path: Option<&Path>,
    ctx: &ShutdownContext<'_>,
) -> Option<LaunchPlan> {
    if !cfg.enabled {
        return None;
    }

    let script_path = PathBuf::from(strip_outer_quotes(&cfg.script_path));
    if script_path.as_os_str().is_empty() {
        tracing::warn!("restart script is enabled but the script path is empty");
        return None;
    }
    if !script_path.is_absolute() {
        tracing::warn!(
            path = %script_path.display(),
            "restart script path must be absolute"
        );
        return None;
    }

    let pattern = cfg.message_pattern.trim().to_lowercase();
    if !pattern.is_empty() {
        let mut sources: Vec<&str> = Vec::new();
        if let Some(announcement) = ctx.announcement {
            sources.push(announcement);
        }
        sources.push(ctx.reason);
        if ctx.is_restarting {
            sources.push("restart");
        }
        let matched = sources
            .iter()
            .any(|text| text.to_lowercase().contains(&pattern));
        if !matched {
            tracing::debug!("restart script skipped: shutdown context did not match the pattern");
            return None;
        }
    } else if !ctx.is_restarting {
        tracing::debug!("restart script skipped: pattern is blank and this is not a restart");
        return None;
    }

    let raw_cwd = strip_outer_quotes(&cfg.working_directory);
    let working_directory = if !raw_cwd.is_empty() {
        let cwd = PathBuf::from(raw_cwd);
        if cwd.is_absolute() {
            Some(cwd)
        } else {
            Some(match data_path {
                Some(base) => base.join(cwd),
                None => cwd,
            })
        }
    } else {
        data_path.map(Path::to_path_buf)
    };

    Some(LaunchPlan {
        command_line: build_command_line(&script_path, &cfg.args),
        script_path,
        working_directory,
        delay_ms: cfg.delay_ms,
    })
}

fn is_platform_supported() -> bool {
    cfg!(windows)
}

/// Evaluates the trigger and, when it matches, schedules the script as a
/// detached fire-and-forget process. Returns immediately.
pub fn maybe_launch(cfg: &RestartScriptConfig, data_path: Option<&Path>, ctx: &ShutdownContext<'_>) {
    if !cfg.enabled {
        return;
    }
    if !is_platform_supported() {
        tracing::warn!("restart script is enabled but only supported on Windows hosts, skipping");
        return;
    }
    let Some(plan) = plan_launch(cfg, data_path, ctx) else {
        return;
    };
    let is_restarting = ctx.is_restarting;
    tokio::spawn(async move {
        if plan.delay_ms > 0 {
            tracing::debug!(delay_ms = plan.delay_ms, "restart script scheduled");
            tokio::time::sleep(Duration::from_millis(plan.delay_ms)).await;
        }
        run_script(plan, is_restarting).await;
    });
}

async fn run_script(plan: LaunchPlan, is_restarting: bool) {
    if tokio::fs::metadata(&plan.script_path).await.is_err() {
        tracing::warn!(path = %plan.script_path.display(), "restart script not found");
        return;
    }

    let mut cmd = launch_command(&plan);
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    if let Some(cwd) = &plan.working_directory {
        cmd.current_dir(cwd);
    }

    match cmd.spawn() {
        Ok(child) => {
            // Dropping the handle leaves the script running on its own.
            drop(child);
            let trigger = if is_restarting { "restart" } else { "shutdown" };
            tracing::info!(
                path = %plan.script_path.display(),
                trigger,
                "launched restart script"
            );
        }
        Err(err) => {
            tracing::error!(
                path = %plan.script_path.display(),
                error = %err,
                "failed to launch restart script"
            );
        }
    }
}

#[cfg(windows)]
fn launch_command(plan: &LaunchPlan) -> tokio::process::Command {
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    let mut cmd = tokio::process::Command::new("cmd.exe");
    cmd.arg("/c").arg(&plan.command_line);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(windows))]
fn launch_command(plan: &LaunchPlan) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(&plan.command_line);
    cmd
}
