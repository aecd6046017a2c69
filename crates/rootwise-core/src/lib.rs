//! RootWise Core Library
//!
//! Control logic for the RootWise plant-diagnosis client: reactive data
//! bindings used by every screen, and the capture → classify → confirm →
//! persist pipeline.

pub mod binding;
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod media;
pub mod models;
pub mod obs;
pub mod persistence;
pub mod pipeline;
pub mod profile;
pub mod query;
pub mod records;
pub mod telemetry;
pub mod urls;

pub use binding::{BindingOptions, Refresh, ResourceBinding, ResourceState};
pub use classify::{parse_classification, ClassificationClient, ClassificationResult, HttpClassifier};
pub use config::{AppConfig, CATALOGUE_LIMIT, LATEST_LIMIT};
pub use context::{AppContext, Backend, CatalogueBinding, RecordsBinding, UserBinding};
pub use error::{degrade_auth, CoreError, CoreResult};
pub use media::{
    infer_mime, FileMediaDevice, GalleryOptions, MediaCapture, MediaDevice, MediaSource, SourceKind,
};
pub use models::{CareAdvice, Disease, PlantDetail, PlantRecord};
pub use persistence::PersistenceClient;
pub use pipeline::{
    Action, Notice, PipelineController, PipelineError, PipelineResult, PipelineSnapshot, Stage,
};
pub use profile::{AvatarService, AVATAR_PREF};
pub use query::{FilterState, PlantFilter, QueryParameters, SortOrder, ALL_PLANTS};
pub use records::RecordService;
pub use telemetry::init_tracing;
pub use urls::{blob_id_from_url, StorageUrls};

pub use rootwise_store::UserIdentity;
