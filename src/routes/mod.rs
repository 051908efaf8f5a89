pub mod health;
pub mod optimization;
pub mod stocks;
