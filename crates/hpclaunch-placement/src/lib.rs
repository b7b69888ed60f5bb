//! hpclaunch-placement: multi-region anti-affinity placement.
//!
//! Places a batch of identical instances across a fixed, ordered set of
//! regions. Each region gets one anti-affinity group per *generation*;
//! when the provider reports that a region cannot place more instances
//! in its group, the region is marked exhausted and later attempts fail
//! over to the next region. Once every region of a generation is
//! exhausted, a fresh generation of groups is created.
//!
//! # Components
//!
//! - **`poll`**: bounded-time condition poller
//! - **`resolver`**: image/flavor/network name → id, per region
//! - **`groups`**: generation history and exhaustion flags
//! - **`provisioner`**: boot-from-volume create and floating address
//! - **`status`**: wait for an instance to reach a terminal status
//! - **`classifier`**: decides whether a fault means capacity exhaustion
//! - **`cleanup`**: best-effort deletes that log instead of failing
//! - **`allocator`**: the per-ordinal, per-region retry loop
//!
//! ```text
//! Allocator
//!   ├── GroupManager  (ensure_group / mark_exhausted)
//!   ├── Provisioner   (Resolver → create_server, floating address)
//!   ├── check_active  (poll_until on get_server)
//!   └── FaultClassifier
//! ```

pub mod allocator;
pub mod classifier;
pub mod cleanup;
pub mod error;
pub mod groups;
pub mod poll;
pub mod provisioner;
pub mod resolver;
pub mod status;

pub use allocator::{AllocationReport, Allocator, OrdinalRecord, OrdinalState};
pub use classifier::{FaultClassifier, MarkerClassifier};
pub use cleanup::CleanupOutcome;
pub use error::{PlacementError, PlacementResult};
pub use groups::{Generation, GroupManager, PlacementGroup, RegionGroup};
pub use poll::{PollPolicy, poll_until};
pub use provisioner::{AddressAssignment, Provisioner};
pub use resolver::{BootTargets, Resolver};
pub use status::{StatusReport, check_active};
