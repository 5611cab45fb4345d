pub mod kind;
pub mod model;
pub mod render;

pub use self::kind::*;
pub use self::model::*;
