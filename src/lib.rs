#[macro_use] extern crate rocket;

pub mod config;
pub mod capture_time;
pub mod store;
pub mod query;
pub mod upload;
pub mod gallery;
pub mod db;
pub mod regions;

use std::io;
use std::path::PathBuf;
use rocket_db_pools::sqlx;


/// Generic error type used to uniformize errors across the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file error for \"{}\" : {}", .1.display(), .0)]
    FileError(io::Error, PathBuf),
    #[error("parser error : {0}")]
    TomlParserError(#[from] toml::de::Error),
    #[error("metadata error : {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("invalid capture time \"{0}\" : {1}")]
    TimeParseError(String, chrono::ParseError),
    #[error("database error : {0}")]
    DatabaseError(#[from] sqlx::Error),
}
