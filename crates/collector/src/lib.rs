pub mod collector;
pub mod lifecycle;
pub mod normalize;
pub mod query;
pub mod source;

pub use collector::Collector;
pub use lifecycle::LifecycleEngine;
pub use normalize::{NormalizeOutcome, Normalizer};
pub use query::{ListResult, QueryCacheTtls, QueryService};
pub use source::{AuthError, DateWindow, FetchArtifact, RawRow, RegtechSource, Session, Source};
