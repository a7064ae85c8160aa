//! Headless execute page.
//!
//! Usage:
//!   execute <execute-page-url> [run|debug] [input ...]
//!
//! `debug` walks every step and prints the variables as it goes,
//! pausing on nothing. Set EXECDASH_ASSUME_YES=1 to accept the
//! empty-input prompt without asking.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use execdash::api::Api;
use execdash::config::Config;
use execdash::session::ExecuteLaunch;
use execdash::status::{ConsoleInteraction, StatusBoard};
use execdash::transport::HttpTransport;
use execdash::workflow::ExecuteSession;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let page = args
        .first()
        .ok_or_else(|| anyhow!("usage: execute <execute-page-url> [run|debug] [input ...]"))?;
    let launch = ExecuteLaunch::from_url(page)?;
    let assume_yes = std::env::var("EXECDASH_ASSUME_YES").map(|v| v == "1").unwrap_or(false);

    let api = Api::new(Arc::new(HttpTransport::new(&cfg)?));
    let status = Arc::new(StatusBoard::new(Arc::new(ConsoleInteraction { assume_yes })));
    let mut session = ExecuteSession::new(api, launch, status.clone());

    session.bind().await?;
    print!("{}", session.instructions_table());
    println!("inputs: {}", session.input_names().join(", "));
    println!("degree: {}/{}", session.degree(), session.max_degree());

    let inputs: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();
    session.set_inputs(&inputs);

    match args.get(1).map(String::as_str).unwrap_or("run") {
        "run" => {
            session.run().await?;
            print!("{}", session.run_results_table());
        }
        "debug" => {
            session.debug().await?;
            print!("{}", session.run_results_table());
            while session.is_debugging() {
                session.step_over().await;
                if let Some(line) = session.debug_line() {
                    println!("-- instruction {}", line + 1);
                }
                print!("{}", session.run_results_table());
            }
        }
        other => bail!("unknown mode: {}", other),
    }
    print!("{}", session.run_history_table());
    println!("credits: {}", session.credits());
    if let Some(current) = status.current() {
        println!("status [{}]: {}", current.severity.as_str(), current.message);
    }
    Ok(())
}
