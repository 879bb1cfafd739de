pub mod entity;
pub mod project;
pub mod run;
pub mod workflow;

pub use entity::*;
pub use project::*;
pub use run::*;
pub use workflow::*;
