pub mod artifact;
pub mod conversion;
pub mod definition;
pub mod library;

pub use artifact::*;
pub use conversion::*;
pub use definition::*;
pub use library::*;
