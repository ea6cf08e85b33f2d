//! JSON-over-stdio child process calls.
//!
//! A request is serialized to the child's stdin, stdin is closed, and the
//! child's stdout is parsed as a single JSON document once it exits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors from a JSON command call.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("i/o error talking to {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("could not encode request: {0}")]
    Encode(serde_json::Error),

    #[error("{program} returned malformed JSON: {source}")]
    Decode {
        program: String,
        source: serde_json::Error,
    },
}

/// An external command speaking JSON on stdin/stdout.
#[derive(Debug, Clone)]
pub struct JsonCommand {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl JsonCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command once with `request` on stdin.
    ///
    /// The child is killed if the returned future is dropped.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, CommandError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request).map_err(CommandError::Encode)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(|source| self.io(source))?;
            stdin.shutdown().await.map_err(|source| self.io(source))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| self.io(source))?;

        if !output.status.success() {
            return Err(CommandError::Exit {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|source| CommandError::Decode {
            program: self.program.clone(),
            source,
        })
    }

    fn io(&self, source: std::io::Error) -> CommandError {
        CommandError::Io {
            program: self.program.clone(),
            source,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_round_trips_json_through_cat() {
        let cmd = JsonCommand::new("cat", vec![]);
        let reply: Value = cmd.call(&json!({"op": "ping", "n": 3})).await.unwrap();
        assert_eq!(reply["n"], 3);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let cmd = JsonCommand::new("sh", vec!["-c".into(), "echo boom >&2; exit 3".into()]);
        let err = cmd.call::<_, Value>(&json!({})).await.unwrap_err();
        match err {
            CommandError::Exit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let cmd = JsonCommand::new("crucible-no-such-program", vec![]);
        let err = cmd.call::<_, Value>(&json!({})).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
