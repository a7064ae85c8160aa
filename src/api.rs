//! Typed wrappers over the service's action set.
//!
//! Row types tolerate missing or null fields (and numbers sent as strings)
//! so a sparse server reply still renders. Any `ok:false` reply, or an
//! `ok:true` reply missing the expected collection, becomes
//! [`ClientError::Application`] carrying the server message or the
//! action's fallback text.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ClientError, ClientResult};
use crate::transport::{Envelope, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Login,
    GetCredits,
    GetUsers,
    GetPrograms,
    GetFunctions,
    UserStatistics,
    ChargeCredits,
    UploadFile,
    SetProgramToUser,
    GetProgramFunctions,
    SetWorkFunction,
    GetProgramInputVariables,
    GetDegreeProgram,
    GetProgramInstructions,
    GetHistoryInstruction,
    RunProgram,
    GetRunStatistic,
    ExpandProgram,
    CollapseProgram,
    GetHighlightOptions,
    SendMessage,
    GetMessages,
    Logout,
    RemoveUser,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::GetCredits => "getCredits",
            Action::GetUsers => "getUsers",
            Action::GetPrograms => "getPrograms",
            Action::GetFunctions => "getFunctions",
            Action::UserStatistics => "userStatistics",
            Action::ChargeCredits => "chargeCredits",
            Action::UploadFile => "uploadFile",
            Action::SetProgramToUser => "setProgramToUser",
            Action::GetProgramFunctions => "getProgramFunctions",
            // The service spells this action without the "r".
            Action::SetWorkFunction => "setWokFunctionUser",
            Action::GetProgramInputVariables => "getProgramInputVariables",
            Action::GetDegreeProgram => "getDegreeProgram",
            Action::GetProgramInstructions => "getProgramInstructions",
            Action::GetHistoryInstruction => "getHistoryInstruction",
            Action::RunProgram => "runProgram",
            Action::GetRunStatistic => "getRunStatistic",
            Action::ExpandProgram => "expandProgram",
            Action::CollapseProgram => "collapseProgram",
            Action::GetHighlightOptions => "getHighlightOptions",
            Action::SendMessage => "sendMessage",
            Action::GetMessages => "getMessages",
            Action::Logout => "logout",
            Action::RemoveUser => "removeUser",
        }
    }

    /// Status text when the service gives no message of its own.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Action::Login => "Login failed",
            Action::GetCredits => "No credits field in response",
            Action::GetUsers => "Failed to load users.",
            Action::GetPrograms => "Failed to load programs.",
            Action::GetFunctions | Action::GetProgramFunctions => "Failed to load functions.",
            Action::UserStatistics | Action::GetRunStatistic => "Failed to load statistics.",
            Action::ChargeCredits => "Failed to charge credits.",
            Action::UploadFile => "Upload failed",
            Action::SetProgramToUser | Action::SetWorkFunction => "Operation failed",
            Action::GetProgramInputVariables => "Failed to load input variables.",
            Action::GetDegreeProgram => "Failed to load degree range.",
            Action::GetProgramInstructions => "Failed to load instructions.",
            Action::GetHistoryInstruction => "Failed to load instruction history.",
            Action::RunProgram => "Unknown error",
            Action::ExpandProgram => "Failed to expand program",
            Action::CollapseProgram => "Failed to collapse program",
            Action::GetHighlightOptions => "Failed to load highlight options",
            Action::SendMessage => "Failed to send message",
            Action::GetMessages => "Failed to load messages.",
            Action::Logout => "Logout failed",
            Action::RemoveUser => "Failed to remove user",
        }
    }
}

mod lenient {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Name to value; entries that are null or not numeric are skipped.
    pub fn int_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, i64>, D::Error> {
        let raw = Option::<BTreeMap<String, Value>>::deserialize(d)?.unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }?;
                Some((name, value))
            })
            .collect())
    }

    pub fn int_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        Ok(int(d)?.unwrap_or(0))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    #[serde(default, deserialize_with = "lenient::text")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub uploaded_programs: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub uploaded_functions: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub credit_balance: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub spent_credits: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub executions: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRow {
    #[serde(default, deserialize_with = "lenient::int")]
    pub number: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub num_instructions: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub max_cost: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub num_exec: Option<i64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub aver_cost: Option<f64>,
}

impl ProgramRow {
    /// Worst-case cost plus average cost of past runs.
    pub fn execution_cost(&self) -> f64 {
        self.max_cost.unwrap_or(0) as f64 + self.aver_cost.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRow {
    #[serde(default, deserialize_with = "lenient::int")]
    pub number: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub program_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub num_instructions: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub max_cost: Option<i64>,
}

impl FunctionRow {
    pub fn execution_cost(&self) -> f64 {
        self.max_cost.unwrap_or(0) as f64
    }
}

/// One past execution in a user's statistics table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecStatRow {
    #[serde(default, deserialize_with = "lenient::int")]
    pub number: Option<i64>,
    #[serde(default, rename = "type", deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub arch: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub degree: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub result: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub cycles: Option<i64>,
}

/// An instruction of the active program; also the shape of history rows.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstructionRow {
    #[serde(default, deserialize_with = "lenient::int")]
    pub number: Option<i64>,
    #[serde(default, rename = "type", deserialize_with = "lenient::text")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub arch: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub instruction: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub cycle: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatRow {
    #[serde(default, deserialize_with = "lenient::int")]
    pub degree: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub input_vars: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub result: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub cycles: Option<i64>,
}

/// Variable bindings after one executed instruction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    #[serde(default, deserialize_with = "lenient::int_or_zero")]
    pub step: i64,
    #[serde(default, deserialize_with = "lenient::int_map")]
    pub variables: BTreeMap<String, i64>,
    #[serde(default, deserialize_with = "lenient::int_or_zero")]
    pub step_cost: i64,
}

/// One line of the shared chat.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "lenient::text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest<'a> {
    pub username: &'a str,
    pub input_variables: &'a [i64],
    pub is_debug_mode: bool,
    pub degree: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReply {
    pub steps: Vec<ExecutionStep>,
    pub message: Option<String>,
}

/// Action-level client. Cheap to clone; all clones share one transport.
#[derive(Clone)]
pub struct Api {
    transport: Arc<dyn Transport>,
}

impl Api {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn request(&self, action: Action, data: Value) -> ClientResult<Envelope> {
        let env = self.transport.call(action.as_str(), data).await?;
        if !env.ok {
            return Err(ClientError::application(
                action.as_str(),
                env.message,
                action.fallback_message(),
            ));
        }
        Ok(env)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        action: Action,
        data: Value,
        field: &str,
    ) -> ClientResult<Vec<T>> {
        let env = self.request(action, data).await?;
        match env.field(field) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| serde_json::from_value(item.clone()))
                .collect::<Result<Vec<T>, _>>()
                .map_err(|e| ClientError::application(action.as_str(), Some(e.to_string()), "")),
            _ => Err(ClientError::application(
                action.as_str(),
                env.message,
                action.fallback_message(),
            )),
        }
    }

    pub async fn login(&self, username: &str) -> ClientResult<Option<String>> {
        let env = self.request(Action::Login, json!({ "username": username })).await?;
        Ok(env.message)
    }

    pub async fn credits(&self, username: &str) -> ClientResult<i64> {
        let env = self.request(Action::GetCredits, json!({ "username": username })).await?;
        env.field("credits").and_then(Value::as_i64).ok_or_else(|| {
            ClientError::application(
                Action::GetCredits.as_str(),
                None,
                Action::GetCredits.fallback_message(),
            )
        })
    }

    pub async fn users(&self) -> ClientResult<Vec<UserRow>> {
        self.list(Action::GetUsers, json!({}), "users").await
    }

    pub async fn programs(&self) -> ClientResult<Vec<ProgramRow>> {
        self.list(Action::GetPrograms, json!({}), "programs").await
    }

    pub async fn functions(&self) -> ClientResult<Vec<FunctionRow>> {
        self.list(Action::GetFunctions, json!({}), "functions").await
    }

    pub async fn user_statistics(&self, username: &str) -> ClientResult<Vec<ExecStatRow>> {
        self.list(Action::UserStatistics, json!({ "username": username }), "execStatistics")
            .await
    }

    /// Returns the new balance when the service reports one.
    pub async fn charge_credits(&self, username: &str, amount: i64) -> ClientResult<Option<i64>> {
        let env = self
            .transport
            .call(Action::ChargeCredits.as_str(), json!({ "username": username, "amount": amount }))
            .await?;
        if !env.ok {
            // The dashboard shows a fixed message here, not the server's.
            return Err(ClientError::application(
                Action::ChargeCredits.as_str(),
                None,
                Action::ChargeCredits.fallback_message(),
            ));
        }
        Ok(env.field("newBalance").and_then(Value::as_i64))
    }

    pub async fn upload_file(
        &self,
        username: &str,
        filename: &str,
        file_data_b64: &str,
    ) -> ClientResult<Option<String>> {
        let env = self
            .request(
                Action::UploadFile,
                json!({ "username": username, "filename": filename, "fileData": file_data_b64 }),
            )
            .await?;
        Ok(env.message)
    }

    pub async fn set_program_to_user(
        &self,
        username: &str,
        program_name: &str,
        is_program: bool,
    ) -> ClientResult<Option<String>> {
        let data = json!({
            "username": username,
            "programName": program_name,
            "isProgram": is_program,
        });
        let env = self.request(Action::SetProgramToUser, data).await?;
        Ok(env.message)
    }

    pub async fn program_functions(
        &self,
        username: &str,
        program_name: &str,
    ) -> ClientResult<Vec<String>> {
        self.list(
            Action::GetProgramFunctions,
            json!({ "username": username, "programName": program_name }),
            "functions",
        )
        .await
    }

    pub async fn set_work_function(
        &self,
        username: &str,
        func_name: &str,
    ) -> ClientResult<Option<String>> {
        let data = json!({ "username": username, "funcName": func_name });
        let env = self.request(Action::SetWorkFunction, data).await?;
        Ok(env.message)
    }

    pub async fn input_variables(&self, username: &str) -> ClientResult<Vec<String>> {
        let data = json!({ "username": username });
        self.list(Action::GetProgramInputVariables, data, "inputVariables").await
    }

    /// Maximum expansion degree of the active program.
    pub async fn max_degree(&self, username: &str) -> ClientResult<u32> {
        let env = self.request(Action::GetDegreeProgram, json!({ "username": username })).await?;
        env.field("degree")
            .and_then(Value::as_u64)
            .map(|d| d as u32)
            .ok_or_else(|| {
                ClientError::application(
                    Action::GetDegreeProgram.as_str(),
                    env.message.clone(),
                    Action::GetDegreeProgram.fallback_message(),
                )
            })
    }

    pub async fn instructions(&self, username: &str) -> ClientResult<Vec<InstructionRow>> {
        self.list(Action::GetProgramInstructions, json!({ "username": username }), "instructions")
            .await
    }

    pub async fn instruction_history(
        &self,
        username: &str,
        instruction_number: i64,
    ) -> ClientResult<Vec<InstructionRow>> {
        self.list(
            Action::GetHistoryInstruction,
            json!({ "username": username, "instructionNumber": instruction_number }),
            "historyInstruction",
        )
        .await
    }

    pub async fn run_program(&self, req: &RunRequest<'_>) -> ClientResult<RunReply> {
        let data = serde_json::to_value(req)
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let env = self.request(Action::RunProgram, data).await?;
        let steps = match env.field("runListMap") {
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                ClientError::application(Action::RunProgram.as_str(), Some(e.to_string()), "")
            })?,
            None => Vec::new(),
        };
        Ok(RunReply { steps, message: env.message })
    }

    pub async fn run_statistics(&self, username: &str) -> ClientResult<Vec<RunStatRow>> {
        self.list(Action::GetRunStatistic, json!({ "username": username }), "runStatistics")
            .await
    }

    pub async fn expand(&self, username: &str) -> ClientResult<Option<String>> {
        // Each request expands by exactly one degree.
        let env = self
            .request(Action::ExpandProgram, json!({ "username": username, "degree": 1 }))
            .await?;
        Ok(env.message)
    }

    pub async fn collapse(&self, username: &str) -> ClientResult<Option<String>> {
        let env = self.request(Action::CollapseProgram, json!({ "username": username })).await?;
        Ok(env.message)
    }

    pub async fn highlight_options(&self, username: &str) -> ClientResult<Vec<String>> {
        self.list(Action::GetHighlightOptions, json!({ "username": username }), "highlightOptions")
            .await
    }

    pub async fn send_message(
        &self,
        username: &str,
        message: &str,
    ) -> ClientResult<Option<String>> {
        let data = json!({ "username": username, "message": message });
        let env = self.request(Action::SendMessage, data).await?;
        Ok(env.message)
    }

    pub async fn messages(&self) -> ClientResult<Vec<ChatMessage>> {
        self.list(Action::GetMessages, json!({}), "messages").await
    }

    pub async fn logout(&self, username: &str) -> ClientResult<Option<String>> {
        let env = self.request(Action::Logout, json!({ "username": username })).await?;
        Ok(env.message)
    }

    /// Drop the user from the connected list when the page closes.
    pub async fn remove_user(&self, username: &str) -> ClientResult<()> {
        self.request(Action::RemoveUser, json!({ "username": username })).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    fn api_with(t: &Arc<ScriptedTransport>) -> Api {
        Api::new(t.clone())
    }

    #[test]
    fn test_rows_tolerate_missing_and_odd_fields() {
        let p: ProgramRow = serde_json::from_value(json!({
            "name": "P1", "maxCost": "10", "averCost": 5.5, "numExec": null
        }))
        .unwrap();
        assert_eq!(p.name.as_deref(), Some("P1"));
        assert_eq!(p.max_cost, Some(10));
        assert_eq!(p.num_exec, None);
        assert_eq!(p.execution_cost(), 15.5);

        let i: InstructionRow = serde_json::from_value(json!({"number": 3, "type": "B"})).unwrap();
        assert_eq!(i.kind.as_deref(), Some("B"));
        assert!(i.label.is_none());
    }

    #[test]
    fn test_step_variables_skip_nulls() {
        let step: ExecutionStep = serde_json::from_value(json!({
            "step": "3", "variables": {"y": null, "x1": "4", "z1": 2}, "stepCost": null
        }))
        .unwrap();
        assert_eq!(step.step, 3);
        assert_eq!(step.step_cost, 0);
        assert_eq!(step.variables.len(), 2);
        assert_eq!(step.variables.get("x1"), Some(&4));
        assert!(!step.variables.contains_key("y"));
    }

    #[tokio::test]
    async fn test_chat_payloads() {
        let t = Arc::new(ScriptedTransport::new());
        t.reply("sendMessage", Envelope::ok(json!({})));
        t.reply("getMessages", Envelope::ok(json!({"messages": [
            {"username": "bob", "message": "hi", "timestamp": "12:00"}
        ]})));
        let api = api_with(&t);
        api.send_message("ann", "hello").await.unwrap();
        let messages = api.messages().await.unwrap();
        assert_eq!(messages[0].username.as_deref(), Some("bob"));
        assert_eq!(t.calls()[0].data, json!({"username": "ann", "message": "hello"}));
        assert_eq!(t.calls()[1].data, json!({}));
    }

    #[tokio::test]
    async fn test_ok_false_uses_server_message() {
        let t = Arc::new(ScriptedTransport::new());
        t.reply("getPrograms", Envelope::fail("session expired"));
        let err = api_with(&t).programs().await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Application {
                action: "getPrograms".into(),
                message: "session expired".into()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_collection_uses_fallback() {
        let t = Arc::new(ScriptedTransport::new());
        t.reply("getUsers", Envelope::ok(json!({})));
        let err = api_with(&t).users().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to load users.");
    }

    #[tokio::test]
    async fn test_run_request_payload_shape() {
        let t = Arc::new(ScriptedTransport::new());
        t.reply("runProgram", Envelope::ok(json!({"runListMap": [
            {"step": 0, "variables": {"y": 0, "x1": 4}, "stepCost": 1}
        ]})));
        let req =
            RunRequest { username: "ann", input_variables: &[4], is_debug_mode: false, degree: 2 };
        let reply = api_with(&t).run_program(&req).await.unwrap();
        assert_eq!(reply.steps.len(), 1);
        assert_eq!(reply.steps[0].variables.get("x1"), Some(&4));
        assert_eq!(
            t.calls()[0].data,
            json!({"username": "ann", "inputVariables": [4], "isDebugMode": false, "degree": 2})
        );
    }

    #[tokio::test]
    async fn test_expand_payload_is_fixed() {
        let t = Arc::new(ScriptedTransport::new());
        t.reply("expandProgram", Envelope::ok(json!({})));
        api_with(&t).expand("ann").await.unwrap();
        assert_eq!(t.calls()[0].data, json!({"username": "ann", "degree": 1}));
    }

    #[tokio::test]
    async fn test_charge_failure_hides_server_message() {
        let t = Arc::new(ScriptedTransport::new());
        t.reply("chargeCredits", Envelope::fail("db locked"));
        let err = api_with(&t).charge_credits("ann", 5).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to charge credits.");
    }
}
