pub mod action;
pub mod fs;
