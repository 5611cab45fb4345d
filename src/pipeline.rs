pub mod error;
pub mod normalize;
pub mod processor;
pub mod section;
pub mod table;

pub use self::error::ImportError;
pub use self::processor::*;
