//! CLI Commands

pub mod backdoor;
pub mod boot;
pub mod config;
pub mod marker;
