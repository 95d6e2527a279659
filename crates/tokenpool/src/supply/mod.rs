mod monitor;
mod policy;
mod request;
mod supplier;

pub use monitor::*;
pub use policy::*;
pub use request::*;
pub use supplier::*;
