pub mod discover;
pub mod filter;
pub mod merge;
pub mod queries;
pub mod score;
pub mod search;
pub mod store;
pub mod verify;
