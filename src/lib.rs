pub mod config;
pub mod error;
pub mod normalize;
pub mod session;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use normalize::{normalize, NormalizationFault, NormalizedStatus};
pub use session::{AuthenticatedSession, SessionManager, SessionState};
pub use types::{
    Credentials, DeviceDetails, ParsedStatus, RawStatusDocument, SessionHandle, StructureDetails,
};
