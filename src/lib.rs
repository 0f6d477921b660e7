pub mod agent;
pub mod audit;
pub mod bridge_config;
pub mod config;
pub mod context;
pub mod docs;
pub mod drift;
pub mod errors;
pub mod handoff;
pub mod ledger;
pub mod logging;
pub mod supervisor;
pub mod tracker;
pub mod ui;
pub mod util;
