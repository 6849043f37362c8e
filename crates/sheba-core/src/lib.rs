//! Session and authentication core for the Sheba admin console.

pub mod api;
pub mod backend;
pub mod config;
pub mod guard;
pub mod logging;
pub mod login_form;
pub mod session;
