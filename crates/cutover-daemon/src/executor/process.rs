//! Subprocess implementation of the deployment tool executor

use super::{CommandExecutor, ExecutionResult};
use crate::config::ExecutorConfig;
use crate::error::{ExecutionError, FailureReason, Operation};
use async_trait::async_trait;
use cutover_types::InfraStack;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs the deployment tool as a child process, one invocation per call
#[derive(Debug, Clone)]
pub struct DeployToolExecutor {
    program: String,
    region: String,
    timeout: Option<Duration>,
    template_dir: Option<PathBuf>,
}

impl DeployToolExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            program: config.program.clone(),
            region: config.region.clone(),
            timeout: config.command_timeout_secs.map(Duration::from_secs),
            template_dir: config.template_dir.clone(),
        }
    }

    /// Leading arguments shared by every invocation of `operation`
    fn base_args(&self, operation: Operation, json: bool) -> Vec<String> {
        let mut args = vec![
            operation.subcommand().to_string(),
            "--region".to_string(),
            self.region.clone(),
        ];
        if json {
            args.push("-o".to_string());
            args.push("json".to_string());
        }
        args
    }

    /// Run the tool and return its standard output
    async fn run(&self, operation: Operation, args: Vec<String>) -> ExecutionResult<String> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        tracing::debug!(command = %command_line, "Running deployment tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            tracing::error!(command = %command_line, error = %e, "Failed to start deployment tool");
            ExecutionError::new(operation, FailureReason::SPAWN, e.to_string())
        })?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(
                        command = %command_line,
                        timeout_secs = limit.as_secs(),
                        "Deployment tool timed out"
                    );
                    return Err(ExecutionError::new(
                        operation,
                        FailureReason::TIMEOUT,
                        format!("no result after {}s", limit.as_secs()),
                    ));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ExecutionError::new(operation, FailureReason::SPAWN, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stderr.trim().is_empty() {
            stdout
        } else {
            format!("{}\n{}", stdout, stderr)
        };
        let reason = match output.status.code() {
            Some(code) => FailureReason::ExitCode(code),
            None => FailureReason::SIGNAL,
        };

        tracing::error!(
            command = %command_line,
            reason = %reason,
            output = %combined.trim(),
            "Deployment tool failed"
        );
        Err(ExecutionError::new(operation, reason, combined))
    }

    /// Run the tool and parse its standard output as JSON
    async fn run_json<T: DeserializeOwned>(
        &self,
        operation: Operation,
        args: Vec<String>,
    ) -> ExecutionResult<T> {
        let stdout = self.run(operation, args).await?;
        serde_json::from_str(&stdout).map_err(|e| {
            tracing::error!(
                operation = %operation,
                error = %e,
                output = %stdout.trim(),
                "Deployment tool returned invalid JSON"
            );
            ExecutionError::new(operation, FailureReason::INVALID_JSON, &stdout)
        })
    }
}

#[async_trait]
impl CommandExecutor for DeployToolExecutor {
    async fn create(
        &self,
        template: &str,
        version: &str,
        image_version: &str,
        parameters: &[String],
        disable_rollback: bool,
        tags: &BTreeMap<String, String>,
    ) -> ExecutionResult<()> {
        let template_error =
            |e: std::io::Error| ExecutionError::new(Operation::Create, FailureReason::TEMPLATE, e.to_string());

        // The file is removed when `template_file` drops, after the tool exits
        let mut template_file = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("cutover-").suffix(".yaml");
            match &self.template_dir {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            }
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to write stack template");
            template_error(e)
        })?;
        template_file
            .write_all(template.as_bytes())
            .and_then(|_| template_file.flush())
            .map_err(template_error)?;

        let mut args = self.base_args(Operation::Create, false);
        args.push("--force".to_string());
        if disable_rollback {
            args.push("--disable-rollback".to_string());
        }
        for (key, value) in tags {
            args.push("--tag".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(template_file.path().to_string_lossy().into_owned());
        args.push(version.to_string());
        args.push(image_version.to_string());
        args.extend(parameters.iter().cloned());

        self.run(Operation::Create, args).await?;
        Ok(())
    }

    async fn list(&self) -> ExecutionResult<Vec<InfraStack>> {
        let args = self.base_args(Operation::List, true);
        self.run_json(Operation::List, args).await
    }

    async fn remove(&self, stack_name: &str, version: &str) -> ExecutionResult<()> {
        let mut args = self.base_args(Operation::Delete, false);
        args.push(stack_name.to_string());
        args.push(version.to_string());
        self.run(Operation::Delete, args).await?;
        Ok(())
    }

    async fn traffic_get(&self, stack_name: &str) -> ExecutionResult<Vec<Value>> {
        let mut args = self.base_args(Operation::TrafficGet, true);
        args.push(stack_name.to_string());
        self.run_json(Operation::TrafficGet, args).await
    }

    async fn traffic_set(
        &self,
        stack_name: &str,
        version: &str,
        percentage: u8,
    ) -> ExecutionResult<Vec<Value>> {
        let mut args = self.base_args(Operation::TrafficSet, true);
        args.push(stack_name.to_string());
        args.push(version.to_string());
        args.push(percentage.to_string());
        self.run_json(Operation::TrafficSet, args).await
    }

    async fn domains(&self, stack_name: &str) -> ExecutionResult<Vec<Value>> {
        let mut args = self.base_args(Operation::Domains, true);
        args.push(stack_name.to_string());
        self.run_json(Operation::Domains, args).await
    }

    async fn patch_image(
        &self,
        stack_name: &str,
        version: &str,
        image: &str,
    ) -> ExecutionResult<()> {
        let mut args = self.base_args(Operation::Patch, false);
        args.push(stack_name.to_string());
        args.push(version.to_string());
        args.push(format!("--image={}", image));
        self.run(Operation::Patch, args).await?;
        Ok(())
    }

    async fn respawn_instances(&self, stack_name: &str, version: &str) -> ExecutionResult<()> {
        let mut args = self.base_args(Operation::Respawn, false);
        args.push(stack_name.to_string());
        args.push(version.to_string());
        self.run(Operation::Respawn, args).await?;
        Ok(())
    }
}
