//! # Chunk Packing
//!
//! Groups the ordered record stream of a source into chunks whose token
//! cost, as measured by a pluggable [`TokenCounter`], stays within a limit.
pub mod packer;
pub mod token;

pub use packer::pack;
pub use packer::Chunk;
pub use packer::ChunkPacker;
pub use packer::SheetBoundary;
pub use token::default_counter;
pub use token::EstimateCounter;
pub use token::FnCounter;
pub use token::TokenCounter;
