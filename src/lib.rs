// Library exports for the poswatch supervisor

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logs;
pub mod process;
pub mod supervisor;
