pub mod commands;
pub mod db;
pub mod models;
pub mod report;
pub mod session;
pub mod view;
