pub mod audit;
pub mod record;
pub mod user;
