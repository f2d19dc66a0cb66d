pub mod capture;
pub mod config;
pub mod live;
pub mod notify;
pub mod signal;
pub mod supervisor;
