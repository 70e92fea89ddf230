pub mod browse;
pub mod build;
pub mod catalog;
