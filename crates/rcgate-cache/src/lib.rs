//! In-memory mirrors of managed-client state.
//!
//! Each mirror is a data manager built from a source ([`ObjectSource`] or
//! [`MapSource`]) that knows how to fetch a snapshot, which URIs it owns and
//! how an update event changes its state. The [`StateRegistry`] drives every
//! manager from connection lifecycle events, and publishing managers report
//! view changes to a [`ChangeSink`] such as the [`ChangePublisher`].

mod error;
mod manager;
mod map;
mod object;
mod publisher;
mod registry;
mod source;

pub use error::{DeltaError, FetchError, PublishError};
pub use manager::DataManager;
pub use map::MapDataManager;
pub use object::ObjectDataManager;
pub use publisher::{
    ChangePublisher, ChangeSink, Outbound, PublishFormat, PublisherConfig, SessionHandle,
};
pub use registry::StateRegistry;
pub use source::{Delta, MapChange, MapSource, ObjectChange, ObjectSource};
