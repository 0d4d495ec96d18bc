pub mod crawler;
pub mod driver;
pub mod error;
pub mod explorer;
pub mod fingerprint;
pub mod forms;
pub mod frontier;
pub mod harvest;
pub mod record;
pub mod replay;
pub mod result;
pub mod scope;
pub mod signature;

pub use crawler::{Crawler, ProgressCallback, ResultCallback};
pub use driver::{CallTimeouts, HttpPage, PageDriver, ScreenshotMode, TimedPage};
pub use error::ScanError;
pub use explorer::{ExplorationReport, Explorer, ExplorerConfig};
pub use frontier::{Frontier, FrontierConfig};
pub use record::{CallingContext, ResponseRecord, VisitRecord};
pub use replay::replay;
pub use result::{CrawlSummary, ScreenshotRecord, VisitedForm, VisitedPage};
pub use scope::ScopeFilter;
pub use signature::{ActionKind, SignatureHandle, SignatureSequence, StableSignature};
