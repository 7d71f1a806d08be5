//! Zapping detector (spec.md §4.7): decides whether a blackscreen -> content
//! transition is a channel change, captures evidence, and records the
//! result.

mod banner;
mod detector;
mod store;
mod types;

pub use banner::{BannerAi, FakeBannerAi, NullBannerAi};
pub use detector::{ZapContext, ZapInput, ZappingDeps, detect_and_record_zapping};
pub use store::{NullZapResultStore, ZapIterationRecord, ZapResultStore};
pub use types::{
    BannerDetection, ChannelInfo, DetectionType, LastZappingSnapshot, TransitionImagePaths, TransitionImageUrls, TransitionImages,
    ZapActionInfo, ZapOutcome,
};
