//! Coloring Book Server
//!
//! Turns an ordered list of processed images into a printable coloring book
//! PDF. Requests are accepted as background jobs: images are resolved from
//! inline data, S3-compatible storage or plain HTTP, laid out one per page
//! behind a cover, and the finished document is stored for download.

pub mod book;
pub mod config;
pub mod error;
pub mod images;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod storage;
