//! The object-store gateway: presigned PUT issuance and authoritative
//! HEAD reads. Narrowed to a trait so commit/finalize logic can run against
//! an in-memory fake in tests, the same split used for `Store`.

mod s3;

/// In-memory fake, kept available outside `#[cfg(test)]` so integration
/// tests under `tests/` can use it too (see `store::mock`).
pub mod mock;

pub use s3::S3ObjectStore;

use async_trait::async_trait;

use crate::error::CoreResult;

pub const CONTENT_TYPE_GZIP: &str = "application/gzip";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Produces a URL that authorizes exactly one PUT of `content_length`
    /// bytes with `Content-Type: application/gzip` to `object_key`.
    async fn presign_put(&self, object_key: &str, content_length: i64) -> CoreResult<String>;

    /// Returns the authoritative byte length of `object_key`. Fails if the
    /// object does not exist.
    async fn head_size(&self, object_key: &str) -> CoreResult<i64>;
}
