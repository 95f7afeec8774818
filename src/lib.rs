pub mod agent;
pub mod builder;
pub mod commands;
pub mod doctor;
pub mod error;
pub mod exit_codes;
pub mod keys;
pub mod paths;
pub mod permissions;
pub mod profiles;
pub mod prompt;
pub mod ssh_config;
pub mod state;
pub mod switch;
pub mod tools;
pub mod ui;
pub mod validator;

#[cfg(test)]
pub mod test_utils;
