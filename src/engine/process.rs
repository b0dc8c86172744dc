//! Computed-function engine backed by child processes.
//!
//! The entry point names an executable inside the configured function
//! directory. The input body is written to its stdin, its stdout becomes the
//! output body, and parameters are exported as `FILTER_PARAM_<NAME>`.
//!
//! A non-zero exit status surfaces as an error at the end of the output
//! stream. The child is killed if the output stream is dropped early.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use futures_util::{future, stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::io::ReaderStream;

use crate::engine::ComputedFunctionEngine;
use crate::filter::error::BoxError;
use crate::filter::spec::FilterSpec;
use crate::filter::target::FilterTarget;

/// Prefix of the environment variables carrying filter parameters.
pub const PARAM_ENV_PREFIX: &str = "FILTER_PARAM_";

/// Runs computed functions as local executables.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    function_dir: PathBuf,
}

impl ProcessEngine {
    pub fn new(function_dir: impl Into<PathBuf>) -> Self {
        Self {
            function_dir: function_dir.into(),
        }
    }

    /// Resolve an entry point to an executable path. Entry points are plain
    /// file names; anything that could escape the function directory is refused.
    fn resolve(&self, entry_point: &str) -> Result<PathBuf, BoxError> {
        if entry_point.is_empty()
            || entry_point.contains('/')
            || entry_point.contains('\\')
            || entry_point == "."
            || entry_point == ".."
        {
            return Err(format!("invalid computed function entry point {:?}", entry_point).into());
        }
        Ok(self.function_dir.join(entry_point))
    }
}

/// Environment variable name for a filter parameter.
pub fn param_env_name(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", PARAM_ENV_PREFIX, normalized)
}

fn param_env_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ComputedFunctionEngine for ProcessEngine {
    async fn run(
        &self,
        _target: &mut FilterTarget<'_>,
        spec: &FilterSpec,
        input: Body,
    ) -> Result<Body, BoxError> {
        let program = self.resolve(&spec.entry_point)?;

        let mut command = Command::new(&program);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (name, value) in &spec.parameters {
            command.env(param_env_name(name), param_env_value(value));
        }

        let mut child = command.spawn()?;
        let mut stdin = child.stdin.take().ok_or("child stdin was not captured")?;
        let stdout = child.stdout.take().ok_or("child stdout was not captured")?;

        tracing::debug!(program = ?program, "Computed function started");

        tokio::spawn(async move {
            let mut data = input.into_data_stream();
            while let Some(chunk) = data.next().await {
                let written = match chunk {
                    Ok(bytes) => stdin.write_all(&bytes).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "Input body failed, closing function stdin");
                        break;
                    }
                };
                if written.is_err() {
                    // The function stopped reading; its exit status tells the rest.
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        let exit = stream::once(async move { child.wait().await }).filter_map(|status| {
            future::ready(match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err::<Bytes, _>(io::Error::other(format!(
                    "computed function exited with {}",
                    status
                )))),
                Err(e) => Some(Err(e)),
            })
        });

        Ok(Body::from_stream(ReaderStream::new(stdout).chain(exit)))
    }
}
