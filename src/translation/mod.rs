//! Translation with round-robin failover across provider accounts.

mod client;
mod credentials;
mod history;
mod languages;
mod provider;

pub use client::{TranslateError, Translation, TranslationClient, TranslationSettings};
pub use credentials::{Credential, CredentialPool};
pub use history::{record_detached, HistoryEntry, HistorySink, LogHistorySink};
pub use languages::{lookup_language, Language, SUPPORTED_LANGUAGES};
pub use provider::{CloudflareProvider, ProviderError, ProviderRequest, TranslationProvider};
