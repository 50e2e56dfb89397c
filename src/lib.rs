pub mod api;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod grid;
pub mod limits;
pub mod model;
pub mod observability;
pub mod week_key;
