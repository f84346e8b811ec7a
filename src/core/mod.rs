// Core domain layer: the data model shared by every other component.
pub mod models;
pub mod traits;

pub use models::*;
pub use traits::*;
