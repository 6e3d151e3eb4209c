pub mod data_flow;
pub mod outcome;
pub mod port;
pub mod value;

pub use data_flow::*;
pub use outcome::*;
pub use port::DataPort;
pub(crate) use port::find_port;
pub use value::*;
