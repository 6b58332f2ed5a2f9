pub mod flows;
pub mod health;
