pub mod alerts;
pub mod health;
pub mod resources;
