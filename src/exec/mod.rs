//! Execution and memory fabric: cooperative scheduling, streams, pinned
//! staging, stream-scoped allocation, and the chunking policy.

pub mod copier;
pub mod copy;
pub mod device;
pub mod pinned;
pub mod resource;
pub mod scheduler;
pub mod split;
pub mod stream;

pub use copier::ToDeviceCopier;
pub use device::{DeviceVec, HostBuf};
pub use resource::AsyncDeviceResource;
pub use split::{split, IndexRange, SplitOptions};
pub use stream::{await_stream, Stream};
