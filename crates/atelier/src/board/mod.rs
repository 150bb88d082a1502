//! Board items: where they come from, which image to analyze, and how a
//! bounded sample is drawn.

pub mod item;
pub mod sampling;
pub mod source;

pub use item::{BoardItem, ImageReferenceResolver, ImageVariant, ItemMedia, VariantResolver};
pub use sampling::sample;
pub use source::{collect_board_items, BoardPage, BoardSource, BoardSourceError, HttpBoardSource};
