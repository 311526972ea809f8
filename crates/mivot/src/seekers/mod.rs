//! Seekers answer read-only questions about an annotation block and the
//! VOTable resource it annotates.

mod annotation;
mod resource;

pub use annotation::{AnnotationSeeker, DmtypeSummary, Scope};
pub use resource::ResourceSeeker;
