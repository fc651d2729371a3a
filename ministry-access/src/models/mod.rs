pub mod device;
pub mod event;
pub mod invite_code;
pub mod role;
pub mod session;
pub mod user;

pub use device::DeviceFingerprint;
pub use event::{
    CancelOutcome, Event, EventCategory, EventDetails, EventFilter, EventPatch,
    RegistrationStatus, RsvpStatus,
};
pub use invite_code::{CodeFilter, CodeRejection, InviteCode};
pub use role::{Role, RoleChange};
pub use session::{UserInfo, UserSession};
pub use user::UserProfile;
