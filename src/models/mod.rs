pub mod resource;
pub mod taxonomy;

pub use resource::*;
pub use taxonomy::*;
