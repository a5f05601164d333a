pub mod canvas;
pub mod spectrum;
