pub mod config;
pub mod discovery;
pub mod process;
pub mod report;
pub mod runner;
pub mod script;
