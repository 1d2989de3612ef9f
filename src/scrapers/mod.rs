pub mod base;
pub mod szse;
pub mod arrow_file;
