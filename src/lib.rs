pub mod agent;
pub mod backend;
pub mod config;
pub mod devices;
pub mod rules;
pub mod schedule;
pub mod scheduler;
pub mod server;
pub mod tools;
