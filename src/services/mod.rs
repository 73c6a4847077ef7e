#[cfg(test)]
pub mod canned_http;
pub mod guide_fetcher;
pub mod importer;
pub mod length_estimator;
pub mod rate_limiter;
pub mod steam;

pub use guide_fetcher::{FetchError, GuideFetcher, GuideSource, ParsedGuide};
pub use importer::{import_app, parse_app_ids, ImportOutcome, ImportStatus};
pub use length_estimator::{LengthEstimate, LengthEstimator, LengthLookup, LookupError};
pub use rate_limiter::{RateLimiter, Service};
pub use steam::{PlatformCatalog, SteamClient, SteamError};
