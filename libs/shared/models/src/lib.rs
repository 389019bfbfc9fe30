pub mod gateway;
pub mod order;
pub mod patient;
pub mod schedule;

pub use gateway::*;
pub use order::*;
pub use patient::*;
pub use schedule::*;
