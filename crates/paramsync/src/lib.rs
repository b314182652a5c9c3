pub mod cache;
pub mod crypto;
pub mod decision;
pub mod error;
pub mod guard;
pub mod logging;
pub mod manifest;
pub mod model;
pub mod orphans;
pub mod promote;
pub mod replication;
pub mod restore;
pub mod settings;
pub mod store;
pub mod sync;
pub mod warmup;

pub use cache::{ClientRegistry, FileSnapshotStore, ParameterNameCache};
pub use crypto::{resolve_key_material, KeyRing, KeyRingError};
pub use decision::{Answer, Confirm, Decision, NewParameter, RestoreCandidate, ScriptedDecision};
pub use error::{CacheError, ManifestError, ParamSyncError, Result, SettingsError};
pub use guard::{DeleteOutcome, DeletionGuard, RefusalReason};
pub use manifest::{load_manifest, load_replication_file, DesiredConfigSpec, Manifest};
pub use model::{MappingSource, Parameter, ParameterType, PutParameter, ReplicationMapping, ReplicationType};
pub use orphans::{OrphanDetector, PruneReport, ValidationReport};
pub use promote::{promote, PromoteReport, PromoteRequest};
pub use replication::{share, NamespaceRules, ReplicationGraphValidator, ReplicationIndex, ShareRequest};
pub use restore::{parse_restore_time, PointInTimeRestorer, RestoreReport, VersionRestorer};
pub use settings::Settings;
pub use store::{InMemoryStore, RemoteStore, SqliteStore, StoreError};
pub use sync::{ReconciliationEngine, ReconciliationReport, ReplicationOnlyRun, SyncOptions};
pub use warmup::WarmupPool;
