//! Integration tests for Sumi-Frontier

mod common;
mod crawl_tests;
mod fetch_tests;
