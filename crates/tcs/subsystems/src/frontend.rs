//! Request front-end boundary
//!
//! Translates inbound requests into command sets and terminal statuses into
//! responses. Transport is someone else's problem.

use serde::Deserialize;
use serde_json::{json, Value};
use tcs_runtime::ComponentHandle;
use tcs_types::{
    Command, CommandSet, CommandStatus, ConfigKey, OutcomeResult, Parameters, RunId, SubmitError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("Malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Two-way translation between a transport's messages and command sets
pub trait RequestTranslator {
    type Request;
    type Response;

    fn to_command_set(&self, request: &Self::Request) -> Result<CommandSet, FrontendError>;

    fn to_response(&self, run_id: RunId, status: &CommandStatus) -> Self::Response;
}

/// Submit `request` to `assembly` and wait for the terminal status
pub async fn serve<T: RequestTranslator>(
    translator: &T,
    assembly: &ComponentHandle,
    request: &T::Request,
) -> Result<T::Response, FrontendError> {
    let set = translator.to_command_set(request)?;
    let submission = assembly.submit(set).await?;
    let run_id = submission.run_id;
    let status = submission.completion().await?;
    Ok(translator.to_response(run_id, &status))
}

#[derive(Deserialize)]
struct WireCommand {
    #[serde(rename = "configKey", alias = "config_key")]
    config_key: ConfigKey,
    #[serde(default)]
    parameters: Parameters,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireRequest {
    Set {
        #[serde(default)]
        label: Option<String>,
        commands: Vec<WireCommand>,
    },
    Single(WireCommand),
}

/// JSON translator
///
/// Accepts either one command `{"configKey": .., "parameters": {..}}` or a set
/// `{"label": .., "commands": [..]}`.
#[derive(Debug, Clone, Default)]
pub struct JsonTranslator;

impl RequestTranslator for JsonTranslator {
    type Request = Value;
    type Response = Value;

    fn to_command_set(&self, request: &Value) -> Result<CommandSet, FrontendError> {
        let wire: WireRequest = serde_json::from_value(request.clone())?;
        let (label, commands) = match wire {
            WireRequest::Set { label, commands } => (label, commands),
            WireRequest::Single(command) => (None, vec![command]),
        };

        let set = CommandSet {
            label: label.unwrap_or_else(|| "request".to_string()),
            commands: commands
                .into_iter()
                .map(|c| Command {
                    config_key: c.config_key,
                    parameters: c.parameters,
                })
                .collect(),
        };
        Ok(set)
    }

    fn to_response(&self, run_id: RunId, status: &CommandStatus) -> Value {
        match status {
            CommandStatus::Rejected(reason) => json!({
                "runId": run_id.to_string(),
                "status": "rejected",
                "reason": reason.to_string(),
            }),
            CommandStatus::Accepted => json!({
                "runId": run_id.to_string(),
                "status": "accepted",
            }),
            CommandStatus::Completed(report) => {
                let commands: Vec<Value> = report
                    .per_command
                    .iter()
                    .map(|outcome| {
                        let mut entry = json!({
                            "index": outcome.index,
                            "configKey": outcome.config_key.as_str(),
                        });
                        let (result, detail) = match &outcome.result {
                            OutcomeResult::Completed(state) => (
                                "completed",
                                serde_json::to_value(&state.fields).unwrap_or(Value::Null),
                            ),
                            OutcomeResult::Failed(e) => ("failed", Value::String(e.to_string())),
                            OutcomeResult::TimedOut => ("timedOut", Value::Null),
                            OutcomeResult::Abandoned => ("abandoned", Value::Null),
                        };
                        entry["result"] = Value::String(result.to_string());
                        if !detail.is_null() {
                            entry["detail"] = detail;
                        }
                        entry
                    })
                    .collect();
                json!({
                    "runId": run_id.to_string(),
                    "status": "completed",
                    "allCompleted": report.is_all_completed(),
                    "commands": commands,
                })
            }
        }
    }
}
