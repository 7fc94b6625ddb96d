mod audit;
mod auditor;
mod base;
mod connection;

pub use audit::*;
pub use auditor::*;
pub use base::*;
pub use connection::*;
