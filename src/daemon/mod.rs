// Daemon module - single-instance guard

pub mod pid;

pub use pid::PidFile;
