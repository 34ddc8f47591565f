//! Cluster API resource types
//!
//! Typed views of the Cluster API resources the status watcher observes.
//! The watcher itself works on untyped objects; these types back the
//! structured path when an observed object is turned into an event target.

pub mod cluster;
pub mod references;

pub use cluster::*;
pub use references::*;
