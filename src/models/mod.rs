pub mod stock;
pub mod series;
pub mod screen;
