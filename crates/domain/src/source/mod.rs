//! Provider seams: where monitors get raw transfers and USD prices from.

mod traits;

pub use traits::*;
