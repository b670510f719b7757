pub mod assign;
pub mod dashboard;
pub mod delete;
pub mod export;
pub mod init;
pub mod list;
pub mod login;
pub mod master;
pub mod show;
pub mod submit;
pub mod update;
pub mod users;
