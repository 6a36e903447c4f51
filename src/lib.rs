//! Stores typed resources as one file per view in a directory tree whose
//! paths encode each resource's type and identity, and reads them back by
//! walking that tree.
//!
//! ```ignore
//! let db = Db::new([item_type], DbConfig::default())?;
//! db.save(root, &torch, None, None)?;          // root/item/7/resource-default.json
//! for observation in db.each_resource(root) {
//!     println!("{:?}", observation?.materialize()?);
//! }
//! ```

pub mod codec;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod logging;
pub mod models;
pub mod observer;
pub mod paths;
pub mod planner;
pub mod routes;

pub use codec::{Codec, CodecRegistry, Encoded, JsonCodec, YamlCodec};
pub use config::{DbConfig, UnknownViewPolicy};
pub use db::{Db, DEFAULT_VIEW};
pub use dispatch::{Dispatch, Handler};
pub use errors::{StoreError, StoreResult};
pub use models::{Cardinality, Record, Relationship, Resource, ResourceType};
pub use observer::{Observation, Observer, Shape, Source, TreeWalk, WalkStats};
pub use paths::{basename_for, compose_path, filename_shape};
pub use planner::{Action, ActionSink, FsSink};
pub use routes::{LookupMode, RouteNode, RouteTable, Segment};
