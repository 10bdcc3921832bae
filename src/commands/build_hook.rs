// ============================================================================
// 构建完成通知：把外部构建工具抽象为“注册一个完成回调”的能力
// 负责：已完成构建的直接通知、运行构建命令后通知
// ============================================================================

use std::process::{Command, Stdio};

use crate::commands::orchestrator::CycleOutcome;
use crate::models::dtos::BuildStatus;
use crate::utils::error::AppResult;

/// 构建完成回调；返回 Err 表示致命错误
pub type BuildDoneCallback = Box<dyn FnMut(&BuildStatus) -> AppResult<CycleOutcome> + Send>;

/// 能够在构建完成时回调的外部构建工具
pub trait BuildCompletionSource {
    fn register(&mut self, callback: BuildDoneCallback);
}

/// 依次触发所有回调，遇到致命错误立即返回
fn fire(callbacks: &mut [BuildDoneCallback], status: &BuildStatus) -> AppResult<Vec<CycleOutcome>> {
    callbacks.iter_mut().map(|cb| cb(status)).collect()
}

/// 状态已知的构建（例如由命令行参数给出）
pub struct FinishedBuild {
    status: BuildStatus,
    callbacks: Vec<BuildDoneCallback>,
}

impl FinishedBuild {
    pub fn new(status: BuildStatus) -> Self {
        Self {
            status,
            callbacks: Vec::new(),
        }
    }

    /// 通知所有已注册的回调
    pub fn finish(mut self) -> AppResult<Vec<CycleOutcome>> {
        fire(&mut self.callbacks, &self.status)
    }
}

impl BuildCompletionSource for FinishedBuild {
    fn register(&mut self, callback: BuildDoneCallback) {
        self.callbacks.push(callback);
    }
}

/// 运行一条构建命令，结束后按退出码通知
///
/// 标准输出直接继承；标准错误被捕获，失败时作为构建错误上报。
pub struct CommandBuild {
    program: String,
    args: Vec<String>,
    callbacks: Vec<BuildDoneCallback>,
}

impl CommandBuild {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            callbacks: Vec::new(),
        }
    }

    /// 执行构建命令并返回其完成状态
    pub fn execute(&self) -> BuildStatus {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());

        log::info!("运行构建命令：{} {}", self.program, self.args.join(" "));
        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                return BuildStatus::failed(vec![format!("无法启动构建命令 {}: {}", self.program, e)]);
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                log::warn!("{}", line);
            }
            return BuildStatus::succeeded();
        }

        let mut errors: Vec<String> = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if errors.is_empty() {
            errors.push(format!("构建命令退出：{}", output.status));
        }
        BuildStatus::failed(errors)
    }

    /// 运行构建并通知所有已注册的回调
    pub fn run(mut self) -> AppResult<Vec<CycleOutcome>> {
        let status = self.execute();
        fire(&mut self.callbacks, &status)
    }
}

impl BuildCompletionSource for CommandBuild {
    fn register(&mut self, callback: BuildDoneCallback) {
        self.callbacks.push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AppError;
    use std::sync::{Arc, Mutex};

    fn recording_callback(seen: Arc<Mutex<Vec<BuildStatus>>>) -> BuildDoneCallback {
        Box::new(move |status: &BuildStatus| {
            seen.lock().unwrap().push(status.clone());
            Ok(CycleOutcome::Skipped)
        })
    }

    #[test]
    fn test_finished_build_notifies_every_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut build = FinishedBuild::new(BuildStatus::succeeded());
        build.register(recording_callback(seen.clone()));
        build.register(recording_callback(seen.clone()));

        let outcomes = build.finish().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(!seen.lock().unwrap()[0].had_errors);
    }

    #[test]
    fn test_fatal_callback_error_propagates() {
        let mut build = FinishedBuild::new(BuildStatus::succeeded());
        build.register(Box::new(|_: &BuildStatus| Err(AppError::Authentication("bad".into()))));

        assert!(matches!(build.finish(), Err(AppError::Authentication(_))));
    }

    #[test]
    fn test_missing_program_reports_failed_build() {
        let build = CommandBuild::new("definitely-not-a-real-build-tool-xyz", vec![]);
        let status = build.execute();
        assert!(status.had_errors);
        assert!(status.errors[0].contains("definitely-not-a-real-build-tool-xyz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exit_code_drives_status() {
        let ok = CommandBuild::new("sh", vec!["-c".into(), "exit 0".into()]).execute();
        assert!(!ok.had_errors);

        let failed = CommandBuild::new("sh", vec!["-c".into(), "echo 'Module not found' >&2; exit 3".into()]).execute();
        assert!(failed.had_errors);
        assert_eq!(failed.errors, vec!["Module not found".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_build_run_fires_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut build = CommandBuild::new("sh", vec!["-c".into(), "exit 1".into()]);
        build.register(recording_callback(seen.clone()));

        build.run().unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen[0].had_errors);
        assert!(seen[0].errors[0].contains("exit"));
    }
}
