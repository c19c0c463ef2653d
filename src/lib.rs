pub mod cli;
pub mod dedup;
pub mod domain;
pub mod expand;
pub mod extract;
pub mod fetch;
pub mod input;
pub mod metrics;
pub mod options;
pub mod output;
pub mod queue;
pub mod resolve;
pub mod scheduler;
pub mod worker;
