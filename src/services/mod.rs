pub mod fetcher;
pub mod universe;
