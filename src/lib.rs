// Slope tracker core
// Live route sessions (distance, speed, elevation, elapsed time) and
// app-wide inactivity alerts

pub mod api;
pub mod archive;
pub mod config;
pub mod credentials;
pub mod distance;
pub mod error;
pub mod inactivity;
pub mod live_status;
pub mod samples;
pub mod sensors;
pub mod session;
pub mod speed;
pub mod timer;

pub use api::{AlertPayload, AlertSink, ApiClient, RouteResolver, RunSubmitter, SubmissionPayload};
pub use config::TrackerConfig;
pub use credentials::{CredentialStore, FileCredentialStore, StaticCredentials};
pub use distance::DistanceAccumulator;
pub use error::{ResolutionError, SessionError, SessionResult, SubmissionError};
pub use inactivity::{InactivityDetector, InactivityMonitor, InactivityState};
pub use samples::{MotionSample, PositionSample};
pub use sensors::{MotionHub, MotionSource, PositionHub, PositionSource};
pub use session::{RouteSession, SessionController, SessionId, SessionMetrics, SessionSnapshot, SessionState};
pub use speed::{LocationMode, SpeedElevationTracker};
