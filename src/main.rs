//! Headless dashboard.
//!
//! Usage:
//!   execdash <username | dashboard-url> [watch [secs]]
//!   execdash <username | dashboard-url> charge <amount>
//!   execdash <username | dashboard-url> upload <file.xml>
//!   execdash <username | dashboard-url> execute <program|function> <name>
//!   execdash <username | dashboard-url> chat [message...]
//!   execdash <username | dashboard-url> logout

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use execdash::api::Api;
use execdash::config::Config;
use execdash::dashboard::Dashboard;
use execdash::logging::{log, obj, v_str, Domain, Level};
use execdash::session::{login, SessionContext};
use execdash::status::{ConsoleInteraction, StatusBoard};
use execdash::transport::HttpTransport;
use tokio::time::{sleep, Duration};

fn print_tables(dash: &Dashboard) {
    let credits = dash.credits().map(|c| c.to_string()).unwrap_or_else(|| "?".into());
    println!("user: {}  credits: {}", dash.session().username(), credits);
    print!("{}", dash.users_table());
    print!("{}", dash.programs_table());
    print!("{}", dash.functions_table());
    print!("{}", dash.statistics_table());
    if dash.chat_visible() {
        print!("{}", dash.chat_table());
    }
    if let Some(status) = dash.status().current() {
        println!("status [{}]: {}", status.severity.as_str(), status.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let who = args
        .first()
        .ok_or_else(|| anyhow!("usage: execdash <username | dashboard-url> [command]"))?;

    let transport = HttpTransport::new(&cfg)?;
    let api = Api::new(Arc::new(transport));
    let session = if who.starts_with("http://") || who.starts_with("https://") {
        SessionContext::from_url(who)?
    } else {
        login(&api, who).await?
    };
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[("username", v_str(session.username())), ("api_url", v_str(&cfg.api_url))]),
    );

    let interaction = Arc::new(ConsoleInteraction { assume_yes: false });
    let status = Arc::new(StatusBoard::new(interaction));
    let dash = Dashboard::new(api, session, cfg.clone(), status);

    match args.get(1).map(String::as_str).unwrap_or("watch") {
        "watch" => {
            let secs: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);
            let mut poll = dash.open().await;
            for _ in 0..secs {
                sleep(Duration::from_secs(1)).await;
                print_tables(&dash);
            }
            poll.stop();
            // Leaving the page drops us from the connected list.
            let _ = dash.close().await;
        }
        "chat" => {
            dash.set_chat_visible(true);
            let message = args[2..].join(" ");
            if message.trim().is_empty() {
                dash.refresh_chat().await;
            } else {
                dash.send_message(&message).await?;
            }
            print!("{}", dash.chat_table());
        }
        "logout" => {
            dash.logout().await?;
        }
        "charge" => {
            let amount = args.get(2).map(String::as_str).unwrap_or("");
            dash.refresh_credits().await;
            dash.charge_credits(amount).await?;
            dash.refresh_all().await;
            print_tables(&dash);
        }
        "upload" => {
            let path = args.get(2).context("upload needs a file path")?;
            dash.upload_file(Path::new(path)).await?;
            print_tables(&dash);
        }
        "execute" => {
            let kind = args.get(2).context("execute needs program|function")?;
            let name = args.get(3).context("execute needs a name")?;
            dash.refresh_credits().await;
            dash.refresh_all().await;
            match kind.as_str() {
                "program" => dash.select_program(name)?,
                "function" => dash.select_function(name)?,
                other => bail!("unknown target kind: {}", other),
            }
            let launch = dash.execute()?;
            let page = url::Url::parse(&cfg.api_url)?.join("execute.html")?;
            println!("{}", launch.to_url(page.as_str())?);
        }
        other => bail!("unknown command: {}", other),
    }
    Ok(())
}
