pub mod cost;
pub mod lead;
