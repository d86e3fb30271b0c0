pub mod memory;
pub mod recorder;

#[allow(unused_imports)]
pub use memory::MemoryStore;
#[allow(unused_imports)]
pub use recorder::{CompletionRecorder, failing_handler, recording_handler};

use muster_core::{PartId, RequestId};

/// Parse a request id that is known-valid in tests.
pub fn request_id(s: &str) -> RequestId {
    RequestId::parse(s).unwrap()
}

/// Parse part ids that are known-valid in tests.
pub fn part_ids(ids: &[&str]) -> Vec<PartId> {
    ids.iter().map(|s| PartId::parse(*s).unwrap()).collect()
}
