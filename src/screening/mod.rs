pub mod normalizer;
pub mod predicates;
pub mod screener;
