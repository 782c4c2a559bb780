pub mod dates;
pub mod fetcher;
pub mod parser;
pub mod types;
