//! Image references and their resolution to bytes
//!
//! A coloring page can arrive three ways: embedded as a data URI, as an object
//! in S3-compatible storage, or as a plain http(s) URL. References are
//! classified once at submission ([`ReferenceParser`]) and resolved one at a
//! time while a book is composed ([`ImageResolver`]).

mod fetch;
mod reference;
mod resolver;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{HttpFetcher, RemoteFetcher};
pub use reference::ReferenceParser;
pub use resolver::ImageResolver;
pub use types::{
    guess_content_type, FetchError, ImageRef, ImageRefError, ResolutionError, ResolvedImage,
};

