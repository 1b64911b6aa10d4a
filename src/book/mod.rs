//! Coloring book documents
//!
//! [`BookComposer`] turns image references into a paginated PDF and
//! [`ArtifactPublisher`] stores the result.

mod composer;
pub mod layout;
mod pdf;
mod publisher;

#[cfg(test)]
pub(crate) mod testing;

pub use composer::{BookComposer, ColoringBook, ComposeError, PageKind, DEFAULT_TITLE};
pub use layout::PageLayout;
pub use publisher::{ArtifactPublisher, PublishError, PublishedArtifact, PDF_CONTENT_TYPE};
