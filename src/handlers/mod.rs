pub mod commands;
pub mod keyboards;
pub mod media;
