mod app;
mod effects;
mod render;
mod rows;
mod settings;

pub use app::run_app;
