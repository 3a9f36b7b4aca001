/*
    Model subsystem - Data structures for every stored entity
*/

pub mod feedback;
pub mod message;
pub mod person;
pub mod records;
pub mod school;
pub mod types;
pub mod workflow;

pub use feedback::*;
pub use message::*;
pub use person::*;
pub use records::*;
pub use school::*;
pub use types::*;
pub use workflow::*;
