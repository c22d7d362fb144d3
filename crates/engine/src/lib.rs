pub mod host;
pub mod path;
pub mod replay;
pub mod scheduler;
