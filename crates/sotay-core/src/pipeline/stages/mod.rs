//! Concrete pipeline stages.
//!
//! Processing: `parse → clean → normalize → filter → fix-markdown → metadata`.
//! Indexing: `chunk → embed-index`.

mod chunk;
mod clean;
mod embed_index;
mod filter;
mod fix;
mod metadata;
mod normalize;
mod parse;

pub use chunk::ChunkStage;
pub use clean::CleanStage;
pub use embed_index::EmbedIndexStage;
pub use filter::{ContentFilter, FilterStage};
pub use fix::FixMarkdownStage;
pub use metadata::MetadataStage;
pub use normalize::NormalizeStage;
pub use parse::ParseStage;
