pub mod serp;
pub mod text;
