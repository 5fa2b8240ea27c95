pub mod context;
pub mod engine;
pub mod event_bus;
pub mod history;
pub mod loop_control;
pub mod state;
