//! The mediahub pipeline: everything between "bytes arrived over HTTP" and
//! "a WebP derivative exists in the object store", minus the HTTP layer
//! itself (an external collaborator per spec §6a).

#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

pub mod cache;
pub mod converter;
pub mod error;
pub mod holder;
pub mod metadata_store;
pub mod object_store;
pub mod producer;
pub mod upload_usecase;
pub mod worker_pool;

pub use cache::{IdentifierCache, MetadataCache};
pub use error::EngineError;
pub use holder::{ClientHolder, RedisConn};
pub use metadata_store::{MetadataStore, NoopMetadataStore};
pub use object_store::{ObjectStore, ObjectStoreConfig, ObjectStoreHandle, SuccessHook};
pub use producer::StreamProducer;
pub use upload_usecase::UploadUseCase;
