pub mod descriptor;
pub mod group;
pub mod kind;

pub use descriptor::{DataPair, TaskDescriptor, TaskDescriptorBuilder};
pub use group::{TaskGroup, group_tasks};
pub use kind::CommandKind;
