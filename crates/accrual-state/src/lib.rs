pub mod accumulation;
pub mod bank;
pub mod db;
pub mod keys;
pub mod tables;

pub use db::{StateDb, Txn};
