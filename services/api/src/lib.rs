pub mod adapters;
pub mod config;
pub mod error;
pub mod scanner;
pub mod web;
