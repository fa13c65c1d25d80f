//! Core types: credentials, bot jobs, transcripts, meetings, clock, tracing

pub mod links;
pub mod model;
pub mod time;
pub mod tracing;

pub use links::{MeetingPlatform, detect_platform, extract_meeting_url};
pub use model::{
    BotJob, BotStatus, Credential, Meeting, PostRecord, Provider, Transcript, UserSettings,
};
pub use time::{Clock, FixedClock, SystemClock, TimeWindow, expiry_from_now};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
