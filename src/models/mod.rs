pub mod administration;
pub mod coverage;
pub mod enums;
pub mod prescription;

pub use administration::*;
pub use coverage::*;
pub use prescription::*;
