pub mod command;
pub mod reply;
