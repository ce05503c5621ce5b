//! Domain model (targets, options, sealed values, epochs, errors, ids).

pub mod epoch;
pub mod errors;
pub mod ids;
pub mod options;
pub mod sealed;
pub mod target;

pub use self::epoch::EpochOutcome;
pub use self::errors::{EffectError, TransportError, TrickleError};
pub use self::ids::{BatchId, ResolveId};
pub use self::options::{BindOptions, Placement, SubmitOptions};
pub use self::sealed::{
    BatchRequest, BatchResponseItem, ContentHash, LocationKey, ResolvedValue, SealedItem,
};
pub use self::target::{Target, TargetKey, TargetMark, TargetState, WorkItem};
