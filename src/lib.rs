pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod imports;
pub mod printer;
pub mod process;
pub mod resolver;
pub mod serializer;
pub mod session;
