//! SSH远端执行器
//!
//! 每条命令以 `ssh {host} "{script} {command}"` 的形式执行一次，返回 stdout + stderr。
//! 连接复用交给 ssh 客户端自身的配置（ControlMaster），这里不维护任何连接状态。

use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use tokio::process::Command;

use crate::connectors::traits::RemoteExecutor;
use crate::types::{EngineError, Result};

/// ssh 自身失败（连接、认证）时的退出码
const SSH_FAILURE_EXIT: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    run_script: String,
    timeout_secs: u64,
}

impl SshExecutor {
    pub fn new(host: impl Into<String>, run_script: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            host: host.into(),
            run_script: run_script.into(),
            timeout_secs,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn remote_line(&self, command: &str) -> String {
        format!("{} {}", self.run_script, command)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, command: &str) -> Result<String> {
        debug!("ssh {} -> {}", self.host, command);
        let child = Command::new("ssh")
            .arg(&self.host)
            .arg(self.remote_line(command))
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), child)
            .await
            .map_err(|_| {
                warn!("远端命令超时 ({}s): {}", self.timeout_secs, command);
                EngineError::Timeout(self.timeout_secs)
            })?
            .map_err(|e| EngineError::RemoteExecution(format!("无法启动ssh: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.code() == Some(SSH_FAILURE_EXIT) {
            return Err(EngineError::RemoteExecution(format!(
                "ssh {} 连接失败: {}",
                self.host,
                stderr.trim()
            )));
        }

        // 远端脚本把错误信息打印在输出中，交给调用方按命令语义判断
        Ok(format!("{stdout}{stderr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_line_prefixes_run_script() {
        let executor = SshExecutor::new("tixian", "./run.sh", 30);
        assert_eq!(executor.remote_line("balance bybit"), "./run.sh balance bybit");
        assert_eq!(executor.host(), "tixian");
    }
}
