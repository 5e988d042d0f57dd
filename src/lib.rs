pub mod auth;
pub mod cli;
pub mod commands;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod report;
pub mod util;
