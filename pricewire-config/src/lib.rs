//! Configuration for the Pricewire pipeline.
//!
//! Settings come from an optional JSON/TOML file, overlaid with
//! `PRICEWIRE_`-prefixed environment variables (`__` separates nesting:
//! `PRICEWIRE_JOBS__WORKER_COUNT=8`), and are validated into the typed
//! [`Settings`] tree. Validation failures are fatal at startup by design.

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;

pub use env::{apply_env_overrides, apply_overrides_from, ENV_PREFIX};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{
    ApiSettings, EmailProvider, EmailSettings, JobsSettings, MailboxSettings,
    ObjectStoreSettings, PollingSettings, ServerSettings, Settings, SmtpSettings,
    StorageBackend,
};
