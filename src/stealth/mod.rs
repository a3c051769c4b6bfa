//! Stealth orchestration (spec components D-I): fingerprint generation,
//! proxy session management, human-behavior emulation, consent-dialog
//! dismissal, and anti-detection masking, applied to a browser context in
//! a fixed lifecycle order by [`StealthOrchestrator`].

pub mod behavior;
pub mod consent;
pub mod errors;
pub mod fingerprint;
pub mod masker;
pub mod orchestrator;
pub mod proxy;

pub use behavior::{BehaviorEmulator, BehaviorTimingProfile, TimingTuple};
pub use consent::{ConsentHandler, ConsentPattern};
pub use errors::{StealthError, StealthResult};
pub use fingerprint::{BrowserFingerprint, FingerprintNormalizer};
pub use masker::{AntiDetectionMasker, MaskerReport};
pub use orchestrator::{StealthOrchestrator, StealthProfile};
pub use proxy::{
    BrightDataProvider, MockProxyProvider, OxyLabsProvider, ProviderHealth, ProxyManager,
    ProxyProvider, ProxySession, ProxySessionStatus,
};
