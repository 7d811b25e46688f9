// Workflow Automation Engine
//
// Trigger-driven automation for agent sessions: workflows pair one trigger
// with an ordered list of actions and run through the engine facade.

pub mod actions;
pub mod command_filter;
pub mod engine;
pub mod executor;
pub mod history;
pub mod store;
pub mod triggers;
