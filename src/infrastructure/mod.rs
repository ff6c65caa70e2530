pub mod database;
pub mod engines;
