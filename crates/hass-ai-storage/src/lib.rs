//! Persistence for HASS AI
//!
//! Every record lives in its own JSON file under `<data dir>/.storage/`,
//! wrapped with a schema version and its key, in the same layout Home
//! Assistant uses for its own `.storage` files.

mod records;
mod store;

pub use records::{
    AiResultsData, EntityOverride, IntelligenceData, KEY_AI_RESULTS, KEY_ALERT_CONFIG,
    KEY_CORRELATIONS, KEY_INTELLIGENCE_DATA, STORAGE_VERSION,
};
pub use store::{Storable, Storage, StorageError, StorageFile, StorageResult};
