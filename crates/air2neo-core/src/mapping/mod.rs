//! Row → graph mutation mapping.

pub mod edge;
pub mod model;
pub mod naming;
pub mod node;

pub use edge::{EdgeMapping, map_edges};
pub use model::{EdgeRecord, NodeIdentity, NodeRecord};
pub use naming::RelationshipNaming;
pub use node::{map_node, property_value};
