#![deny(clippy::all)]

pub mod app;
pub mod commands;
pub mod line;
pub mod surface;

pub use app::run;
