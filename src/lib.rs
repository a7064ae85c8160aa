pub mod api;
pub mod config;
pub mod dashboard;
pub mod debugger;
pub mod error;
pub mod logging;
pub mod poll;
pub mod selection;
pub mod session;
pub mod status;
pub mod transport;
pub mod views;
pub mod workflow;
