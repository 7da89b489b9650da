pub mod antibot;
pub mod persistence;
