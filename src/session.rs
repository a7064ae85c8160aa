//! Session identity and page-to-page navigation context.
//!
//! Pages hand state to each other through URL query parameters:
//! the dashboard gets `username`; the execute page gets `username`,
//! `programName`, `availableCredit` and `isProgram`.

use url::Url;

use crate::api::Api;
use crate::error::{ClientError, ClientResult};
use crate::logging::{log, obj, v_str, Domain, Level};

/// Immutable for the lifetime of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    username: String,
}

impl SessionContext {
    pub fn new(username: &str) -> ClientResult<Self> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::Validation("Username cannot be empty".to_string()));
        }
        Ok(Self { username: username.to_string() })
    }

    pub fn from_url(page_url: &str) -> ClientResult<Self> {
        let url = parse(page_url)?;
        match query_param(&url, "username") {
            Some(name) if !name.trim().is_empty() => Self::new(&name),
            _ => Err(ClientError::Validation("No username provided in URL".to_string())),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn dashboard_url(&self, base: &str) -> ClientResult<String> {
        let mut url = parse(base)?;
        url.query_pairs_mut().clear().append_pair("username", &self.username);
        Ok(url.into())
    }
}

/// What the dashboard's execute action hands to the execute page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteLaunch {
    pub username: String,
    pub program_name: String,
    pub available_credit: i64,
    pub is_program: bool,
}

impl ExecuteLaunch {
    pub fn from_url(page_url: &str) -> ClientResult<Self> {
        let url = parse(page_url)?;
        let session = SessionContext::from_url(page_url)?;
        let program_name = query_param(&url, "programName")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ClientError::Validation("No program name provided in URL".to_string()))?;
        let available_credit = query_param(&url, "availableCredit")
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(0);
        let is_program =
            matches!(query_param(&url, "isProgram").as_deref(), Some("true") | Some("1"));
        Ok(Self { username: session.username, program_name, available_credit, is_program })
    }

    pub fn to_url(&self, base: &str) -> ClientResult<String> {
        let mut url = parse(base)?;
        url.query_pairs_mut()
            .clear()
            .append_pair("username", &self.username)
            .append_pair("programName", &self.program_name)
            .append_pair("availableCredit", &self.available_credit.to_string())
            .append_pair("isProgram", if self.is_program { "true" } else { "false" });
        Ok(url.into())
    }

    pub fn session(&self) -> ClientResult<SessionContext> {
        SessionContext::new(&self.username)
    }
}

/// Validate the typed name, then register it with the service.
pub async fn login(api: &Api, username: &str) -> ClientResult<SessionContext> {
    let session = SessionContext::new(username)?;
    api.login(session.username()).await?;
    log(Level::Info, Domain::System, "login", obj(&[("username", v_str(session.username()))]));
    Ok(session)
}

fn parse(s: &str) -> ClientResult<Url> {
    Url::parse(s).map_err(|e| ClientError::Validation(format!("invalid page URL {}: {}", s, e)))
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_username_is_fatal() {
        let err = SessionContext::from_url("http://localhost:8080/dashboard.html").unwrap_err();
        assert_eq!(err, ClientError::Validation("No username provided in URL".into()));
        assert!(SessionContext::from_url("http://h/dashboard.html?username=").is_err());
    }

    #[test]
    fn test_username_from_query() {
        let s = SessionContext::from_url("http://h/dashboard.html?username=ann%20lee").unwrap();
        assert_eq!(s.username(), "ann lee");
    }

    #[test]
    fn test_execute_launch_through_url() {
        let launch = ExecuteLaunch {
            username: "ann".into(),
            program_name: "P 1".into(),
            available_credit: 40,
            is_program: false,
        };
        let url = launch.to_url("http://h/execute.html").unwrap();
        assert_eq!(ExecuteLaunch::from_url(&url).unwrap(), launch);
    }

    #[test]
    fn test_is_program_accepts_numeric_flag() {
        let l = ExecuteLaunch::from_url(
            "http://h/e?username=a&programName=p&isProgram=1&availableCredit=x",
        )
        .unwrap();
        assert!(l.is_program);
        assert_eq!(l.available_credit, 0);
    }

    #[test]
    fn test_empty_login_rejected_before_network() {
        assert_eq!(
            SessionContext::new("   ").unwrap_err(),
            ClientError::Validation("Username cannot be empty".into())
        );
    }
}
