//! Execute page controller.
//!
//! Unlike the dashboard, everything here is ordered: an operation sends
//! its action, then runs a fixed list of [`Stage`]s one after another.
//! The first failing stage ends the pipeline and leaves a status behind;
//! later stages never see a half-updated page.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::api::{Action, Api, ExecutionStep, InstructionRow, RunRequest, RunStatRow};
use crate::debugger::Debugger;
use crate::error::{ClientError, ClientResult};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::session::ExecuteLaunch;
use crate::status::{Severity, StatusBoard};
use crate::views::{self, project, render, variable_rows, RenderedTable, VariableRow};

pub const EMPTY_INPUTS_PROMPT: &str =
    "Some parameter fields are empty.\nEmpty fields will be treated as 0.\nDo you want to continue?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    ProgramBound,
    InstructionsLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Instructions,
    Highlights,
    InputVariables,
    /// Fetch the maximum degree and set the current one.
    DegreeRange(u32),
    Functions,
    RunStatistics,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Instructions => "instructions",
            Stage::Highlights => "highlights",
            Stage::InputVariables => "input_variables",
            Stage::DegreeRange(_) => "degree_range",
            Stage::Functions => "functions",
            Stage::RunStatistics => "run_statistics",
        }
    }
}

const BIND_STAGES: [Stage; 6] = [
    Stage::Instructions,
    Stage::Highlights,
    Stage::InputVariables,
    Stage::DegreeRange(0),
    Stage::Functions,
    Stage::RunStatistics,
];

const FUNCTION_STAGES: [Stage; 5] = [
    Stage::Instructions,
    Stage::Highlights,
    Stage::InputVariables,
    Stage::DegreeRange(0),
    Stage::RunStatistics,
];

pub struct ExecuteSession {
    api: Api,
    launch: ExecuteLaunch,
    status: Arc<StatusBoard>,
    state: WorkflowState,
    credits: i64,

    instructions: Option<ClientResult<Vec<InstructionRow>>>,
    highlight_options: Vec<String>,
    highlight: String,
    input_names: Vec<String>,
    inputs: Vec<String>,
    degree: u32,
    max_degree: u32,
    functions: Vec<String>,
    active_function: Option<String>,

    selected_instruction: Option<i64>,
    history: Option<ClientResult<Vec<InstructionRow>>>,
    run_statistics: Option<ClientResult<Vec<RunStatRow>>>,

    steps: Vec<ExecutionStep>,
    debugger: Debugger,
    breakpoints: BTreeSet<i64>,
}

impl ExecuteSession {
    pub fn new(api: Api, launch: ExecuteLaunch, status: Arc<StatusBoard>) -> Self {
        let credits = launch.available_credit;
        Self {
            api,
            launch,
            status,
            state: WorkflowState::Idle,
            credits,
            instructions: None,
            highlight_options: Vec::new(),
            highlight: "none".to_string(),
            input_names: Vec::new(),
            inputs: Vec::new(),
            degree: 0,
            max_degree: 0,
            functions: Vec::new(),
            active_function: None,
            selected_instruction: None,
            history: None,
            run_statistics: None,
            steps: Vec::new(),
            debugger: Debugger::default(),
            breakpoints: BTreeSet::new(),
        }
    }

    fn username(&self) -> &str {
        &self.launch.username
    }

    fn info(&self, message: Option<String>) {
        if let Some(message) = message.filter(|m| !m.is_empty()) {
            self.status.show(&message, Severity::Info);
        }
    }

    fn reject(&self, title: &str, message: &str) -> ClientError {
        self.status.alert(title, message, Severity::Error);
        ClientError::Validation(message.to_string())
    }

    // ---------------------------------------------------------------------
    // Pipeline
    // ---------------------------------------------------------------------

    async fn run_stage(&mut self, stage: Stage) -> ClientResult<()> {
        let user = self.username().to_string();
        let result = match stage {
            Stage::Instructions => {
                let result = self.api.instructions(&user).await;
                let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                self.instructions = Some(result);
                if outcome.is_ok() {
                    self.state = WorkflowState::InstructionsLoaded;
                }
                outcome
            }
            Stage::Highlights => {
                // A token from before an expand may not exist any more.
                self.highlight = "none".to_string();
                self.highlight_options.clear();
                self.api.highlight_options(&user).await.map(|options| {
                    if let Some(first) = options.first() {
                        self.highlight = first.clone();
                    }
                    self.highlight_options = options;
                })
            }
            Stage::InputVariables => self.api.input_variables(&user).await.map(|names| {
                self.inputs = vec![String::new(); names.len()];
                self.input_names = names;
            }),
            Stage::DegreeRange(degree) => self.api.max_degree(&user).await.map(|max| {
                self.max_degree = max;
                self.degree = degree;
            }),
            Stage::Functions => self
                .api
                .program_functions(&user, &self.launch.program_name)
                .await
                .map(|functions| {
                    self.active_function = functions.first().cloned();
                    self.functions = functions;
                }),
            Stage::RunStatistics => {
                let result = self.api.run_statistics(&user).await;
                let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                self.run_statistics = Some(result);
                outcome
            }
        };
        if let Err(err) = &result {
            log(
                Level::Warn,
                Domain::Workflow,
                "stage_failed",
                obj(&[
                    ("username", v_str(&user)),
                    ("stage", v_str(stage.name())),
                    ("msg", v_str(&err.to_string())),
                ]),
            );
        }
        result
    }

    /// Await each stage in order; stop at the first failure.
    pub async fn run_pipeline(&mut self, operation: &str, stages: &[Stage]) -> ClientResult<()> {
        let started = Instant::now();
        for (index, stage) in stages.iter().enumerate() {
            if let Err(err) = self.run_stage(*stage).await {
                self.status.report(&err);
                log(
                    Level::Warn,
                    Domain::Workflow,
                    "pipeline_aborted",
                    obj(&[
                        ("action", v_str(operation)),
                        ("stage", v_str(stage.name())),
                        ("skipped", json!(stages.len() - index - 1)),
                    ]),
                );
                return Err(err);
            }
        }
        log(
            Level::Debug,
            Domain::Workflow,
            "pipeline_done",
            obj(&[
                ("action", v_str(operation)),
                ("stages", json!(stages.len())),
                ("elapsed_ms", v_num(started.elapsed().as_secs_f64() * 1000.0)),
            ]),
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Page load: bind the launched program, then load everything about it.
    pub async fn bind(&mut self) -> ClientResult<()> {
        let user = self.username().to_string();
        let bound = self
            .api
            .set_program_to_user(&user, &self.launch.program_name, self.launch.is_program)
            .await;
        match bound {
            Ok(message) => {
                self.state = WorkflowState::ProgramBound;
                self.status.show(
                    message
                        .filter(|m| !m.is_empty())
                        .as_deref()
                        .unwrap_or("Program updated successfully"),
                    Severity::Info,
                );
            }
            Err(err) => {
                self.status.report(&err);
                return Err(err);
            }
        }
        self.breakpoints.clear();
        self.run_pipeline("bind", &BIND_STAGES).await?;
        self.status.show(&format!("Loaded program: {}", self.launch.program_name), Severity::Info);
        Ok(())
    }

    pub async fn select_function(&mut self, name: &str) -> ClientResult<()> {
        if name.is_empty() {
            return Ok(());
        }
        self.clear_history();
        self.debugger.reset();
        self.breakpoints.clear();
        self.steps.clear();

        let user = self.username().to_string();
        match self.api.set_work_function(&user, name).await {
            Ok(message) => {
                self.active_function = Some(name.to_string());
                // A new work function always starts unexpanded.
                self.degree = 0;
                self.info(message);
            }
            Err(err) => {
                self.status.report(&err);
                return Err(err);
            }
        }
        self.run_pipeline("select_function", &FUNCTION_STAGES).await
    }

    pub async fn expand(&mut self) -> ClientResult<()> {
        self.ensure_not_debugging()?;
        if self.degree >= self.max_degree {
            let msg = format!("Max degree is {}", self.max_degree);
            return Err(self.reject("Invalid degree", &msg));
        }
        self.clear_history();
        let user = self.username().to_string();
        match self.api.expand(&user).await {
            Ok(message) => self.info(message),
            Err(err) => {
                self.status.report(&err);
                return Err(err);
            }
        }
        self.breakpoints.clear();
        // The service is now at the next degree whatever the reloads do.
        self.degree += 1;
        let stages = [Stage::Instructions, Stage::Highlights, Stage::DegreeRange(self.degree)];
        self.run_pipeline("expand", &stages).await
    }

    pub async fn collapse(&mut self) -> ClientResult<()> {
        self.ensure_not_debugging()?;
        if self.degree == 0 {
            return Err(self.reject("Invalid degree", "Min degree is 0"));
        }
        self.clear_history();
        let user = self.username().to_string();
        match self.api.collapse(&user).await {
            Ok(message) => self.info(message),
            Err(err) => {
                self.status.report(&err);
                return Err(err);
            }
        }
        self.breakpoints.clear();
        self.degree -= 1;
        let stages = [Stage::Instructions, Stage::Highlights, Stage::DegreeRange(self.degree)];
        self.run_pipeline("collapse", &stages).await
    }

    /// Choosing a highlight re-fetches the instruction table.
    pub async fn set_highlight(&mut self, token: &str) -> ClientResult<()> {
        self.highlight = token.to_string();
        self.run_pipeline("highlight", &[Stage::Instructions]).await
    }

    pub async fn select_instruction(&mut self, number: i64) -> ClientResult<()> {
        self.selected_instruction = Some(number);
        let user = self.username().to_string();
        let result = self.api.instruction_history(&user, number).await;
        if let Err(err) = &result {
            self.status.report(err);
        }
        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        self.history = Some(result);
        outcome
    }

    pub fn set_input(&mut self, index: usize, value: &str) -> ClientResult<()> {
        let slot = self
            .inputs
            .get_mut(index)
            .ok_or_else(|| ClientError::Validation(format!("No input field {}", index)))?;
        *slot = value.to_string();
        Ok(())
    }

    /// Fill fields in declaration order; extra values are ignored.
    pub fn set_inputs(&mut self, values: &[&str]) {
        for (slot, value) in self.inputs.iter_mut().zip(values) {
            *slot = value.to_string();
        }
    }

    pub fn toggle_breakpoint(&mut self, number: i64) -> bool {
        if !self.breakpoints.remove(&number) {
            self.breakpoints.insert(number);
            return true;
        }
        false
    }

    // ---------------------------------------------------------------------
    // Run and debug
    // ---------------------------------------------------------------------

    /// Run to completion and show the final variable bindings. Statistics
    /// and credits are refreshed whatever the outcome.
    pub async fn run(&mut self) -> ClientResult<Vec<VariableRow>> {
        let outcome = self.execute(false).await;
        if let Ok(()) = &outcome {
            self.debugger.reset();
        }
        let _ = self.run_pipeline("run", &[Stage::RunStatistics]).await;
        self.refresh_credits().await;
        outcome.map(|()| self.steps.last().map(variable_rows).unwrap_or_default())
    }

    /// Run in debug mode and stop on the first step.
    pub async fn debug(&mut self) -> ClientResult<()> {
        self.execute(true).await?;
        self.refresh_credits().await;
        self.debugger.start();
        self.step_over().await;
        Ok(())
    }

    pub async fn step_over(&mut self) -> Option<usize> {
        if !self.debugger.is_active() {
            return None;
        }
        let shown = self.debugger.step_over(self.steps.len());
        if !self.debugger.is_active() {
            self.finish_debug().await;
        }
        shown
    }

    pub async fn step_back(&mut self) -> Option<usize> {
        let shown = self.debugger.step_back(self.steps.len());
        if shown.is_some() && !self.debugger.is_active() {
            self.finish_debug().await;
        }
        shown
    }

    /// Step until the end or until the instruction just reached carries a
    /// breakpoint.
    pub async fn resume(&mut self) {
        while self.debugger.is_active() {
            let Some(index) = self.step_over().await else {
                break;
            };
            if !self.debugger.is_active() {
                break;
            }
            if let Some(row) = self.breakpoint_row(index) {
                let label = row.label.clone().unwrap_or_default();
                self.status.show(&format!("Paused at breakpoint: {}", label), Severity::Info);
                break;
            }
        }
    }

    pub fn stop_debug(&mut self) {
        if self.debugger.is_active() {
            self.debugger.stop();
            log(
                Level::Info,
                Domain::Workflow,
                "debug_stopped",
                obj(&[("username", v_str(self.username()))]),
            );
        }
    }

    fn breakpoint_row(&self, step_index: usize) -> Option<&InstructionRow> {
        let step = self.steps.get(step_index)?;
        let rows = match &self.instructions {
            Some(Ok(rows)) => rows,
            _ => return None,
        };
        let position = usize::try_from(step.step).ok()?;
        let row = rows.get(position)?;
        let number = row.number.unwrap_or(position as i64 + 1);
        self.breakpoints.contains(&number).then_some(row)
    }

    async fn finish_debug(&mut self) {
        let _ = self.run_pipeline("debug_finished", &[Stage::RunStatistics]).await;
        self.status.show("Debug finished.", Severity::Info);
    }

    async fn execute(&mut self, debug_mode: bool) -> ClientResult<()> {
        self.ensure_not_debugging()?;
        if self.state == WorkflowState::Idle {
            let err = ClientError::Validation("No program loaded.".to_string());
            self.status.report(&err);
            return Err(err);
        }
        let inputs = self.collect_inputs()?;

        let user = self.username().to_string();
        let request = RunRequest {
            username: &user,
            input_variables: &inputs,
            is_debug_mode: debug_mode,
            degree: self.degree,
        };
        log(
            Level::Info,
            Domain::Workflow,
            "run",
            obj(&[
                ("username", v_str(&user)),
                ("degree", json!(self.degree)),
                ("inputs", json!(inputs)),
                ("debug", json!(debug_mode)),
            ]),
        );
        match self.api.run_program(&request).await {
            Ok(reply) if reply.steps.is_empty() => {
                self.steps.clear();
                let err = ClientError::application(
                    Action::RunProgram.as_str(),
                    reply.message,
                    "No execution steps returned.",
                );
                self.status.report(&err);
                Err(err)
            }
            Ok(reply) => {
                self.steps = reply.steps;
                self.info(reply.message);
                Ok(())
            }
            Err(err) => {
                let message = match &err {
                    ClientError::Transport(e) => format!("Server error: {}", e),
                    other => other.to_string(),
                };
                self.status.alert("Run Failed", &message, Severity::Error);
                Err(err)
            }
        }
    }

    /// Parse the input fields. Empty fields become 0 once confirmed.
    fn collect_inputs(&mut self) -> ClientResult<Vec<i64>> {
        for (name, value) in self.input_names.iter().zip(&self.inputs) {
            let value = value.trim();
            if !value.is_empty() && value.parse::<i64>().is_err() {
                let err = ClientError::Validation(format!("Invalid value for {}: {}", name, value));
                self.status.report(&err);
                return Err(err);
            }
        }

        if self.inputs.iter().any(|v| v.trim().is_empty()) {
            if !self.status.confirm(EMPTY_INPUTS_PROMPT) {
                let err = ClientError::Validation("Run cancelled.".to_string());
                self.status.show(&err.to_string(), Severity::Warning);
                return Err(err);
            }
            for value in self.inputs.iter_mut().filter(|v| v.trim().is_empty()) {
                *value = "0".to_string();
            }
        }

        Ok(self.inputs.iter().map(|v| v.trim().parse().unwrap_or(0)).collect())
    }

    fn ensure_not_debugging(&self) -> ClientResult<()> {
        if self.debugger.is_active() {
            let err = ClientError::Validation("Stop debugging first.".to_string());
            self.status.report(&err);
            return Err(err);
        }
        Ok(())
    }

    fn clear_history(&mut self) {
        self.selected_instruction = None;
        self.history = None;
    }

    pub async fn refresh_credits(&mut self) {
        let user = self.username().to_string();
        match self.api.credits(&user).await {
            Ok(credits) => self.credits = credits,
            Err(err) => self.status.report(&err),
        }
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn launch(&self) -> &ExecuteLaunch {
        &self.launch
    }

    pub fn credits(&self) -> i64 {
        self.credits
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn max_degree(&self) -> u32 {
        self.max_degree
    }

    pub fn highlight(&self) -> &str {
        &self.highlight
    }

    pub fn highlight_options(&self) -> &[String] {
        &self.highlight_options
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    pub fn active_function(&self) -> Option<&str> {
        self.active_function.as_deref()
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn is_debugging(&self) -> bool {
        self.debugger.is_active()
    }

    pub fn breakpoints(&self) -> &BTreeSet<i64> {
        &self.breakpoints
    }

    /// Instruction position the debugger is on.
    pub fn debug_line(&self) -> Option<i64> {
        let index = self.debugger.shown()?;
        self.steps.get(index).map(|s| s.step)
    }

    pub fn instructions_table(&self) -> RenderedTable {
        let selected = self.selected_instruction.map(|n| n.to_string());
        let rows = self.instructions.as_ref();
        project(views::INSTRUCTIONS, rows, selected.as_deref(), Some(&self.highlight))
    }

    pub fn history_table(&self) -> RenderedTable {
        project(views::HISTORY, self.history.as_ref(), None, None)
    }

    pub fn run_history_table(&self) -> RenderedTable {
        project(views::RUN_HISTORY, self.run_statistics.as_ref(), None, None)
    }

    /// Variables of the step on screen: the final step after a run, the
    /// cursor step while debugging.
    pub fn run_results_table(&self) -> RenderedTable {
        let index = match self.debugger.shown() {
            Some(index) => Some(index),
            None => self.steps.len().checked_sub(1),
        };
        match index.and_then(|i| self.steps.get(i)) {
            Some(step) => render(views::RUN_RESULTS, &variable_rows(step), None, None),
            None => {
                RenderedTable::placeholder(views::RUN_RESULTS, views::RUN_RESULTS.empty_message)
            }
        }
    }
}
