//! Dashboard behavior against a scripted service.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use execdash::api::Api;
use execdash::config::{Config, FreshnessPolicy};
use execdash::dashboard::{Dashboard, DashboardView};
use execdash::error::TransportError;
use execdash::poll::PollTarget;
use execdash::selection::Selection;
use execdash::session::SessionContext;
use execdash::status::{RecordingInteraction, Severity, StatusBoard};
use execdash::transport::{Envelope, ScriptedTransport};
use execdash::views::{RenderedRow, CONNECTION_ERROR};
use serde_json::json;

struct Harness {
    transport: Arc<ScriptedTransport>,
    ui: Arc<RecordingInteraction>,
    dash: Dashboard,
}

fn harness_with(cfg: Config) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let ui = Arc::new(RecordingInteraction::answering(true));
    let status = Arc::new(StatusBoard::new(ui.clone()));
    let session = SessionContext::new("ann").unwrap();
    let dash = Dashboard::new(Api::new(transport.clone()), session, cfg, status);
    Harness { transport, ui, dash }
}

fn harness() -> Harness {
    harness_with(Config::default())
}

fn programs(names: &[&str]) -> Envelope {
    let rows: Vec<_> = names
        .iter()
        .map(|n| {
            json!({
                "name": n, "userName": "bob", "numInstructions": 4,
                "maxCost": 10, "numExec": 1, "averCost": 5
            })
        })
        .collect();
    Envelope::ok(json!({ "programs": rows }))
}

fn user_names(names: &[&str]) -> Envelope {
    let rows: Vec<_> = names.iter().map(|n| json!({"userName": n})).collect();
    Envelope::ok(json!({ "users": rows }))
}

#[tokio::test]
async fn empty_programs_show_single_placeholder() {
    let h = harness();
    h.transport.reply("getPrograms", Envelope::ok(json!({"programs": []})));
    h.dash.refresh_programs().await;
    assert_eq!(
        h.dash.programs_table().rows,
        vec![RenderedRow::Placeholder { message: "No programs available.".into(), colspan: 7 }]
    );
}

#[tokio::test]
async fn insufficient_credits_blocks_without_request() {
    let h = harness();
    h.transport.reply("getCredits", Envelope::ok(json!({"credits": 10})));
    h.transport.reply("getPrograms", programs(&["P1"]));
    h.dash.refresh_credits().await;
    h.dash.refresh_programs().await;
    h.dash.select_program("P1").unwrap();
    h.transport.clear_calls();

    assert!(h.dash.execute().is_err());
    assert!(h.transport.calls().is_empty());
    let alerts = h.ui.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].title, "Insufficient Credits");
    assert_eq!(
        alerts[0].message,
        "You do not have enough credits to execute P1.\nProgram Cost: 15\nYour Credits: 10"
    );
}

#[tokio::test]
async fn exact_balance_is_enough_to_execute() {
    let h = harness();
    h.transport.reply("getCredits", Envelope::ok(json!({"credits": 15})));
    h.transport.reply("getPrograms", programs(&["P1"]));
    h.dash.refresh_credits().await;
    h.dash.refresh_programs().await;
    h.dash.select_program("P1").unwrap();

    let launch = h.dash.execute().unwrap();
    assert_eq!(launch.program_name, "P1");
    assert_eq!(launch.available_credit, 15);
    assert!(launch.is_program);
    assert!(h.ui.alerts().is_empty());
}

#[tokio::test]
async fn execute_hands_over_launch_context() {
    let h = harness();
    h.transport.reply("getCredits", Envelope::ok(json!({"credits": 20})));
    h.transport.reply("getFunctions", Envelope::ok(json!({"functions": [
        {"name": "Minus", "programName": "P1", "maxCost": 7}
    ]})));
    h.dash.refresh_credits().await;
    h.dash.refresh_functions().await;
    h.dash.select_function("Minus").unwrap();

    let launch = h.dash.execute().unwrap();
    assert_eq!(launch.program_name, "Minus");
    assert_eq!(launch.available_credit, 20);
    assert!(!launch.is_program);
}

#[tokio::test]
async fn execute_needs_a_program_or_function() {
    let h = harness();
    h.transport.reply("getUsers", user_names(&["bob"]));
    h.dash.refresh_users().await;
    h.transport.always("userStatistics", Envelope::ok(json!({"execStatistics": []})));
    h.dash.select_user("bob").await;

    let err = h.dash.execute().unwrap_err();
    assert_eq!(err.to_string(), "Please select a program or function to execute.");
}

#[tokio::test]
async fn unknown_balance_counts_as_zero() {
    let h = harness();
    let functions = json!({"functions": [{"name": "Minus", "maxCost": 3}]});
    h.transport.reply("getFunctions", Envelope::ok(functions));
    h.dash.refresh_functions().await;
    h.dash.select_function("Minus").unwrap();
    assert!(h.dash.execute().is_err());
    assert!(h.ui.alerts()[0].message.ends_with("Your Credits: 0"));
}

#[tokio::test]
async fn reorder_keeps_selected_row() {
    let h = harness();
    h.transport.reply("getPrograms", programs(&["A", "B"]));
    h.transport.reply("getPrograms", programs(&["C", "B", "A"]));
    h.dash.refresh_programs().await;
    h.dash.select_program("B").unwrap();
    h.dash.refresh_programs().await;

    let table = h.dash.programs_table();
    assert_eq!(table.selected_key(), Some("B"));
    let flags: Vec<bool> = table.data_rows().map(|(_, selected, _)| selected).collect();
    assert_eq!(flags, vec![false, true, false]);
}

#[tokio::test]
async fn one_selection_across_tables() {
    let h = harness();
    h.transport.reply("getPrograms", programs(&["P1"]));
    let functions = json!({"functions": [{"name": "F1", "maxCost": 2}]});
    h.transport.reply("getFunctions", Envelope::ok(functions));
    h.transport.reply("getUsers", user_names(&["bob"]));
    h.transport.always("userStatistics", Envelope::ok(json!({"execStatistics": []})));
    h.dash.refresh_all().await;

    h.dash.select_user("bob").await;
    h.dash.select_program("P1").unwrap();
    assert!(matches!(h.dash.selection(), Selection::Program(_)));
    assert_eq!(h.dash.users_table().selected_key(), None);

    h.dash.select_function("F1").unwrap();
    assert_eq!(h.dash.programs_table().selected_key(), None);
    assert_eq!(h.dash.functions_table().selected_key(), Some("F1"));
}

#[tokio::test]
async fn statistics_follow_selected_user() {
    let h = harness();
    h.transport.always("userStatistics", Envelope::ok(json!({"execStatistics": [
        {"number": 1, "type": "Program", "name": "P1", "arch": "I", "degree": 0, "result": 3, "cycles": 9}
    ]})));
    h.dash.select_user("bob").await;
    h.dash.unselect_user().await;

    let users: Vec<_> =
        h.transport.calls().into_iter().map(|c| c.data["username"].clone()).collect();
    assert_eq!(users, vec![json!("bob"), json!("ann")]);
    assert_eq!(h.dash.selection(), Selection::None);
    assert_eq!(h.dash.statistics_table().data_rows().count(), 1);
}

#[tokio::test]
async fn failures_stay_in_their_view() {
    let h = harness();
    h.transport.fail("getUsers", TransportError::Status(502));
    h.transport.reply("getPrograms", Envelope::fail("Session expired"));
    h.transport.reply("getFunctions", Envelope::ok(json!({"functions": [{"name": "F1"}]})));
    h.transport.reply("userStatistics", Envelope::ok(json!({"execStatistics": []})));
    h.dash.refresh_all().await;

    assert_eq!(
        h.dash.users_table().rows,
        vec![RenderedRow::Placeholder { message: CONNECTION_ERROR.into(), colspan: 7 }]
    );
    assert_eq!(
        h.dash.programs_table().rows,
        vec![RenderedRow::Placeholder { message: "Session expired".into(), colspan: 7 }]
    );
    assert_eq!(h.dash.functions_table().data_rows().count(), 1);
    assert_eq!(
        h.dash.statistics_table().rows,
        vec![RenderedRow::Placeholder { message: "No statistics available.".into(), colspan: 7 }]
    );
}

#[tokio::test]
async fn last_arrival_shows_older_slow_reply() {
    let h = harness();
    h.transport.reply("getUsers", user_names(&["old"]));
    h.transport.reply("getUsers", user_names(&["new"]));
    h.transport.delay_next("getUsers", Duration::from_millis(100));

    tokio::join!(h.dash.refresh_users(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.dash.refresh_users().await;
    });

    assert_eq!(h.dash.users_table().data_rows().next().unwrap().0[1], "old");
}

#[tokio::test]
async fn newest_issued_drops_older_slow_reply() {
    let h = harness_with(Config { freshness: FreshnessPolicy::NewestIssued, ..Config::default() });
    h.transport.reply("getUsers", user_names(&["old"]));
    h.transport.reply("getUsers", user_names(&["new"]));
    h.transport.delay_next("getUsers", Duration::from_millis(100));

    tokio::join!(h.dash.refresh_users(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.dash.refresh_users().await;
    });

    assert_eq!(h.dash.users_table().data_rows().next().unwrap().0[1], "new");
}

#[tokio::test]
async fn charge_validates_before_sending() {
    let h = harness();
    assert!(h.dash.charge_credits("abc").await.is_err());
    assert!(h.dash.charge_credits("").await.is_err());
    assert_eq!(h.transport.count("chargeCredits"), 0);
    let messages: Vec<String> = h.ui.alerts().into_iter().map(|a| a.message).collect();
    assert_eq!(
        messages,
        vec!["Amount must be a positive number.", "Please enter the amount of credits to charge."]
    );
}

#[tokio::test]
async fn charge_mirrors_new_balance() {
    let h = harness();
    h.transport.reply("chargeCredits", Envelope::ok(json!({"newBalance": 60})));
    h.transport.reply("getUsers", user_names(&["ann"]));
    assert_eq!(h.dash.charge_credits("50").await.unwrap(), Some(60));
    assert_eq!(h.dash.credits(), Some(60));
    assert_eq!(h.transport.actions(), vec!["chargeCredits", "getUsers"]);
    assert_eq!(h.transport.calls()[0].data, json!({"username": "ann", "amount": 50}));
    let status = h.dash.status().current().unwrap();
    assert_eq!(status.message, "Credits charged successfully.");
    assert_eq!(status.severity, Severity::Info);
}

#[tokio::test]
async fn upload_sends_base64_then_refreshes() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minus.xml");
    std::fs::write(&path, "<S-Program name=\"Minus\"/>").unwrap();

    h.transport.reply("uploadFile", Envelope::ok(json!({})));
    h.transport.reply("userStatistics", Envelope::ok(json!({"execStatistics": []})));
    h.transport.reply("getPrograms", programs(&["Minus"]));
    h.transport.reply("getFunctions", Envelope::ok(json!({"functions": []})));
    h.dash.upload_file(&path).await.unwrap();

    let calls = h.transport.calls();
    assert_eq!(calls[0].data["filename"], json!("minus.xml"));
    assert_eq!(calls[0].data["fileData"], json!(STANDARD.encode("<S-Program name=\"Minus\"/>")));
    assert_eq!(
        h.transport.actions(),
        vec!["uploadFile", "userStatistics", "getPrograms", "getFunctions"]
    );
    assert_eq!(h.dash.status().current().unwrap().message, "File uploaded successfully!");
}

#[tokio::test]
async fn upload_rejects_non_xml() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minus.txt");
    std::fs::write(&path, "x").unwrap();
    assert!(h.dash.upload_file(&path).await.is_err());
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.ui.alerts().len(), 1);
}

#[tokio::test]
async fn polling_refreshes_every_view() {
    let h = harness_with(Config { poll_interval_ms: 20, ..Config::default() });
    h.transport.always("getCredits", Envelope::ok(json!({"credits": 5})));
    h.transport.always("getUsers", user_names(&["ann"]));
    h.transport.always("getPrograms", programs(&[]));
    h.transport.always("getFunctions", Envelope::ok(json!({"functions": []})));
    h.transport.always("userStatistics", Envelope::ok(json!({"execStatistics": []})));

    let mut poll = h.dash.open().await;
    tokio::time::sleep(Duration::from_millis(75)).await;
    poll.stop();

    assert_eq!(h.transport.actions()[0], "getCredits");
    for action in ["getUsers", "getPrograms", "getFunctions", "userStatistics"] {
        let polled = h.transport.count(action);
        assert!(polled >= 2, "{} polled {} times", action, polled);
    }
    assert_eq!(h.dash.credits(), Some(5));
    assert_eq!(h.dash.users_table().data_rows().count(), 1);
}

#[tokio::test]
async fn chat_is_polled_only_while_open() {
    let h = harness();
    assert!(!h.dash.views().contains(&DashboardView::Chat));
    h.dash.set_chat_visible(true);
    assert_eq!(h.dash.views().last(), Some(&DashboardView::Chat));

    h.transport.reply("getMessages", Envelope::ok(json!({"messages": [
        {"username": "bob", "message": "hi all", "timestamp": "10:02"}
    ]})));
    h.dash.refresh(DashboardView::Chat).await;
    let rows: Vec<Vec<String>> =
        h.dash.chat_table().data_rows().map(|(c, _, _)| c.to_vec()).collect();
    assert_eq!(rows, vec![vec!["bob".to_string(), "hi all".into(), "10:02".into()]]);

    h.dash.set_chat_visible(false);
    assert!(!h.dash.views().contains(&DashboardView::Chat));
}

#[tokio::test]
async fn send_message_posts_trimmed_text_then_reloads() {
    let h = harness();
    h.transport.reply("sendMessage", Envelope::ok(json!({})));
    h.transport.reply("getMessages", Envelope::ok(json!({"messages": [
        {"username": "ann", "message": "ready", "timestamp": "10:05"}
    ]})));

    h.dash.send_message("   ").await.unwrap();
    assert!(h.transport.calls().is_empty());

    h.dash.send_message("  ready ").await.unwrap();
    assert_eq!(h.transport.actions(), vec!["sendMessage", "getMessages"]);
    assert_eq!(h.transport.calls()[0].data, json!({"username": "ann", "message": "ready"}));
    assert_eq!(h.dash.chat_table().data_rows().count(), 1);
}

#[tokio::test]
async fn failed_send_shows_error_status() {
    let h = harness();
    h.transport.reply("sendMessage", Envelope::fail("Chat is closed"));
    assert!(h.dash.send_message("hello").await.is_err());
    let status = h.dash.status().current().unwrap();
    assert_eq!(status.message, "Failed to send message: Chat is closed");
    assert_eq!(status.severity, Severity::Error);
    assert_eq!(h.transport.count("getMessages"), 0);
}

#[tokio::test]
async fn logout_reports_outcome() {
    let h = harness();
    h.transport.reply("logout", Envelope::ok(json!({})));
    h.dash.logout().await.unwrap();
    assert_eq!(h.transport.calls()[0].data, json!({"username": "ann"}));
    assert_eq!(h.dash.status().current().unwrap().message, "Logged out successfully");

    h.transport.reply("logout", Envelope::fail("User not logged in"));
    assert!(h.dash.logout().await.is_err());
    let status = h.dash.status().current().unwrap();
    assert_eq!(status.message, "User not logged in");
    assert_eq!(status.severity, Severity::Warning);
}

#[tokio::test]
async fn close_removes_session_user() {
    let h = harness();
    h.transport.reply("removeUser", Envelope::ok(json!({})));
    h.dash.close().await.unwrap();
    assert_eq!(h.transport.actions(), vec!["removeUser"]);
    assert_eq!(h.transport.calls()[0].data, json!({"username": "ann"}));

    h.transport.fail("removeUser", TransportError::Network("connection refused".into()));
    assert!(h.dash.close().await.is_err());
    assert_eq!(h.dash.status().current().unwrap().severity, Severity::Error);
}
