pub mod command;
pub mod file;
pub mod system;
