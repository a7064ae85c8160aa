//! Dashboard page controller.
//!
//! Four polled views (connected users, programs, functions, statistics),
//! the chat while its pane is open, the mirrored credit balance and the
//! single selection live in one [`DashboardState`] behind a mutex. The
//! lock is only taken to issue a sequence number or apply a result, never
//! across a request.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::future::{join3, join4};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::api::{Api, ChatMessage, ExecStatRow, FunctionRow, ProgramRow, UserRow};
use crate::config::{Config, FreshnessPolicy};
use crate::error::{ClientError, ClientResult};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::poll::{PollHandle, PollScheduler, PollTarget, ViewSlot};
use crate::selection::{Selection, SelectionKind, SelectionStore};
use crate::session::{ExecuteLaunch, SessionContext};
use crate::status::{Severity, StatusBoard};
use crate::views::{self, format_amount, project, RenderedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardView {
    Users,
    Programs,
    Functions,
    Statistics,
    Chat,
}

#[derive(Debug)]
pub struct DashboardState {
    pub users: ViewSlot<UserRow>,
    pub programs: ViewSlot<ProgramRow>,
    pub functions: ViewSlot<FunctionRow>,
    pub statistics: ViewSlot<ExecStatRow>,
    pub chat: ViewSlot<ChatMessage>,
    pub chat_visible: bool,
    pub selection: SelectionStore,
    pub credits: Option<i64>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            users: ViewSlot::new("users"),
            programs: ViewSlot::new("programs"),
            functions: ViewSlot::new("functions"),
            statistics: ViewSlot::new("statistics"),
            chat: ViewSlot::new("chat"),
            chat_visible: false,
            selection: SelectionStore::new(),
            credits: None,
        }
    }
}

#[derive(Clone)]
pub struct Dashboard {
    api: Api,
    session: SessionContext,
    cfg: Config,
    status: Arc<StatusBoard>,
    state: Arc<Mutex<DashboardState>>,
}

impl Dashboard {
    pub fn new(api: Api, session: SessionContext, cfg: Config, status: Arc<StatusBoard>) -> Self {
        Self { api, session, cfg, status, state: Arc::new(Mutex::new(DashboardState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, DashboardState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn freshness(&self) -> FreshnessPolicy {
        self.cfg.freshness
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Load the balance, then poll until the handle is stopped.
    pub async fn open(&self) -> PollHandle {
        log(
            Level::Info,
            Domain::Dashboard,
            "open",
            obj(&[("username", v_str(self.session.username()))]),
        );
        self.refresh_credits().await;
        self.start_polling()
    }

    pub fn start_polling(&self) -> PollHandle {
        PollScheduler::new(self.clone(), self.cfg.poll_interval(), self.cfg.overlap).start()
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    pub fn selection(&self) -> Selection {
        self.state().selection.current().clone()
    }

    pub fn credits(&self) -> Option<i64> {
        self.state().credits
    }

    pub fn users_table(&self) -> RenderedTable {
        let st = self.state();
        project(views::USERS, st.users.value(), st.selection.key_for(SelectionKind::User), None)
    }

    pub fn programs_table(&self) -> RenderedTable {
        let st = self.state();
        let selected = st.selection.key_for(SelectionKind::Program);
        project(views::PROGRAMS, st.programs.value(), selected, None)
    }

    pub fn functions_table(&self) -> RenderedTable {
        let st = self.state();
        let selected = st.selection.key_for(SelectionKind::Function);
        project(views::FUNCTIONS, st.functions.value(), selected, None)
    }

    pub fn statistics_table(&self) -> RenderedTable {
        let st = self.state();
        project(views::STATISTICS, st.statistics.value(), None, None)
    }

    pub fn chat_table(&self) -> RenderedTable {
        project(views::CHAT, self.state().chat.value(), None, None)
    }

    pub fn chat_visible(&self) -> bool {
        self.state().chat_visible
    }

    /// Open or close the chat pane. Messages are only polled while open.
    pub fn set_chat_visible(&self, visible: bool) {
        self.state().chat_visible = visible;
    }

    /// Statistics follow the selected user, else the session user.
    pub fn statistics_user(&self) -> String {
        match self.state().selection.current() {
            Selection::User(name) => name.clone(),
            _ => self.session.username().to_string(),
        }
    }

    // ---------------------------------------------------------------------
    // Refreshes
    // ---------------------------------------------------------------------

    pub async fn refresh_credits(&self) {
        match self.api.credits(self.session.username()).await {
            Ok(credits) => self.state().credits = Some(credits),
            Err(err) => self.status.report(&err),
        }
    }

    pub async fn refresh_users(&self) {
        let seq = self.state().users.issue();
        let result = self.api.users().await;
        let policy = self.freshness();
        self.state().users.apply(seq, result, policy);
    }

    pub async fn refresh_programs(&self) {
        let seq = self.state().programs.issue();
        let result = self.api.programs().await;
        let policy = self.freshness();
        self.state().programs.apply(seq, result, policy);
    }

    pub async fn refresh_functions(&self) {
        let seq = self.state().functions.issue();
        let result = self.api.functions().await;
        let policy = self.freshness();
        self.state().functions.apply(seq, result, policy);
    }

    pub async fn refresh_statistics(&self) {
        let user = self.statistics_user();
        let seq = self.state().statistics.issue();
        let result = self.api.user_statistics(&user).await;
        let policy = self.freshness();
        self.state().statistics.apply(seq, result, policy);
    }

    pub async fn refresh_chat(&self) {
        let seq = self.state().chat.issue();
        let result = self.api.messages().await;
        if let Err(err) = &result {
            self.status.report(err);
        }
        let policy = self.freshness();
        self.state().chat.apply(seq, result, policy);
    }

    /// All four views concurrently; each failure stays in its own view.
    pub async fn refresh_all(&self) {
        join4(
            self.refresh_users(),
            self.refresh_programs(),
            self.refresh_functions(),
            self.refresh_statistics(),
        )
        .await;
    }

    // ---------------------------------------------------------------------
    // Row selection
    // ---------------------------------------------------------------------

    pub async fn select_user(&self, name: &str) {
        self.state().selection.select(SelectionKind::User, name, 0.0);
        self.refresh_statistics().await;
    }

    /// Back to the session user's own statistics.
    pub async fn unselect_user(&self) {
        {
            let mut st = self.state();
            if matches!(st.selection.current(), Selection::User(_)) {
                st.selection.clear();
            }
        }
        self.refresh_statistics().await;
    }

    pub fn select_program(&self, name: &str) -> ClientResult<()> {
        let mut st = self.state();
        let cost = st
            .programs
            .rows()
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .map(ProgramRow::execution_cost)
            .ok_or_else(|| ClientError::Validation(format!("Unknown program: {}", name)))?;
        st.selection.select(SelectionKind::Program, name, cost);
        Ok(())
    }

    pub fn select_function(&self, name: &str) -> ClientResult<()> {
        let mut st = self.state();
        let cost = st
            .functions
            .rows()
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(FunctionRow::execution_cost)
            .ok_or_else(|| ClientError::Validation(format!("Unknown function: {}", name)))?;
        st.selection.select(SelectionKind::Function, name, cost);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Actions
    // ---------------------------------------------------------------------

    pub async fn charge_credits(&self, amount_text: &str) -> ClientResult<Option<i64>> {
        let amount = match parse_amount(amount_text) {
            Ok(amount) => amount,
            Err(err) => {
                self.status.alert("Invalid amount", &err.to_string(), Severity::Warning);
                return Err(err);
            }
        };

        match self.api.charge_credits(self.session.username(), amount).await {
            Ok(balance) => {
                self.status.show("Credits charged successfully.", Severity::Info);
                log(
                    Level::Info,
                    Domain::Dashboard,
                    "charge",
                    obj(&[
                        ("username", v_str(self.session.username())),
                        ("amount", json!(amount)),
                        ("new_balance", json!(balance)),
                    ]),
                );
                if let Some(balance) = balance {
                    self.state().credits = Some(balance);
                }
                self.refresh_users().await;
                Ok(balance)
            }
            Err(err) => {
                let message = match &err {
                    ClientError::Transport(_) => "Server error while charging credits.".to_string(),
                    other => other.to_string(),
                };
                self.status.show(&message, Severity::Error);
                Err(err)
            }
        }
    }

    pub async fn upload_file(&self, path: &Path) -> ClientResult<()> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Err(err) = check_upload_name(&filename) {
            self.status.alert("Invalid file", &err.to_string(), Severity::Warning);
            return Err(err);
        }

        self.status.show("Loading file...", Severity::Info);
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = ClientError::Validation(format!("Failed to read or upload file: {}", e));
                self.status.show(&err.to_string(), Severity::Error);
                return Err(err);
            }
        };
        let digest = hex::encode(Sha256::digest(&bytes));
        let encoded = STANDARD.encode(&bytes);

        match self.api.upload_file(self.session.username(), &filename, &encoded).await {
            Ok(_) => {
                log(
                    Level::Info,
                    Domain::Dashboard,
                    "upload",
                    obj(&[
                        ("username", v_str(self.session.username())),
                        ("filename", v_str(&filename)),
                        ("sha256", v_str(&digest)),
                        ("bytes", v_num(bytes.len() as f64)),
                    ]),
                );
                self.status.show("File uploaded successfully!", Severity::Info);
                join3(self.refresh_statistics(), self.refresh_programs(), self.refresh_functions())
                    .await;
                Ok(())
            }
            Err(err) => {
                self.status.show(&format!("Upload failed: {}", err), Severity::Error);
                Err(err)
            }
        }
    }

    /// Post to the shared chat. Blank text is not sent.
    pub async fn send_message(&self, text: &str) -> ClientResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        match self.api.send_message(self.session.username(), text).await {
            Ok(_) => {
                log(
                    Level::Debug,
                    Domain::Dashboard,
                    "chat_sent",
                    obj(&[
                        ("username", v_str(self.session.username())),
                        ("chars", json!(text.len())),
                    ]),
                );
                self.refresh_chat().await;
                Ok(())
            }
            Err(err) => {
                self.status.show(&format!("Failed to send message: {}", err), Severity::Error);
                Err(err)
            }
        }
    }

    pub async fn logout(&self) -> ClientResult<()> {
        match self.api.logout(self.session.username()).await {
            Ok(_) => {
                log(
                    Level::Info,
                    Domain::Dashboard,
                    "logout",
                    obj(&[("username", v_str(self.session.username()))]),
                );
                self.status.show("Logged out successfully", Severity::Info);
                Ok(())
            }
            Err(err) => {
                self.status.report(&err);
                Err(err)
            }
        }
    }

    /// Page teardown: take the session user off the connected list.
    pub async fn close(&self) -> ClientResult<()> {
        let result = self.api.remove_user(self.session.username()).await;
        match &result {
            Ok(()) => log(
                Level::Info,
                Domain::Dashboard,
                "closed",
                obj(&[("username", v_str(self.session.username()))]),
            ),
            Err(err) => self.status.report(err),
        }
        result
    }

    /// Gate for leaving to the execute page. Nothing is sent to the service.
    pub fn execute(&self) -> ClientResult<ExecuteLaunch> {
        let (selection, credits) = {
            let st = self.state();
            (st.selection.current().clone(), st.credits.unwrap_or(0))
        };

        let Some(target) = selection.target() else {
            let msg = "Please select a program or function to execute.";
            self.status.alert("No selection", msg, Severity::Warning);
            return Err(ClientError::Validation(msg.to_string()));
        };

        if target.cost > credits as f64 {
            self.status.alert(
                "Insufficient Credits",
                &format!(
                    "You do not have enough credits to execute {}.\nProgram Cost: {}\nYour Credits: {}",
                    target.name,
                    format_amount(target.cost),
                    credits
                ),
                Severity::Warning,
            );
            return Err(ClientError::Validation("Insufficient Credits".to_string()));
        }

        log(
            Level::Info,
            Domain::Dashboard,
            "execute",
            obj(&[
                ("username", v_str(self.session.username())),
                ("target", v_str(&target.name)),
                ("cost", v_num(target.cost)),
                ("credits", json!(credits)),
            ]),
        );
        Ok(ExecuteLaunch {
            username: self.session.username().to_string(),
            program_name: target.name.clone(),
            available_credit: credits,
            is_program: selection.is_program(),
        })
    }
}

#[async_trait]
impl PollTarget for Dashboard {
    type View = DashboardView;

    fn views(&self) -> Vec<DashboardView> {
        let mut views = vec![
            DashboardView::Users,
            DashboardView::Programs,
            DashboardView::Functions,
            DashboardView::Statistics,
        ];
        if self.chat_visible() {
            views.push(DashboardView::Chat);
        }
        views
    }

    async fn refresh(&self, view: DashboardView) {
        match view {
            DashboardView::Users => self.refresh_users().await,
            DashboardView::Programs => self.refresh_programs().await,
            DashboardView::Functions => self.refresh_functions().await,
            DashboardView::Statistics => self.refresh_statistics().await,
            DashboardView::Chat => self.refresh_chat().await,
        }
    }
}

/// Positive whole number of credits.
pub fn parse_amount(text: &str) -> ClientResult<i64> {
    let text = text.trim();
    if text.is_empty() {
        let msg = "Please enter the amount of credits to charge.";
        return Err(ClientError::Validation(msg.to_string()));
    }
    match text.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ClientError::Validation("Amount must be a positive number.".to_string())),
    }
}

pub fn check_upload_name(filename: &str) -> ClientResult<()> {
    if filename.is_empty() {
        return Err(ClientError::Validation("No file selected.".to_string()));
    }
    if !filename.ends_with(".xml") {
        let msg = "Invalid file type. Please select an XML file.";
        return Err(ClientError::Validation(msg.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 25 ").unwrap(), 25);
        assert_eq!(
            parse_amount("").unwrap_err().to_string(),
            "Please enter the amount of credits to charge."
        );
        for bad in ["0", "-3", "ten", "2.5"] {
            assert_eq!(
                parse_amount(bad).unwrap_err().to_string(),
                "Amount must be a positive number."
            );
        }
    }

    #[test]
    fn test_upload_name_must_be_xml() {
        assert!(check_upload_name("prog.xml").is_ok());
        assert!(check_upload_name("prog.txt").is_err());
        assert!(check_upload_name("").is_err());
    }
}
