//! Live meeting sessions: per-connection coordination, meeting membership,
//! and broadcast fan-out.

pub mod coordinator;
pub mod messages;
pub mod registry;

pub use coordinator::{Flow, SessionCoordinator, SessionDeps};
pub use messages::ClientMessage;
pub use registry::{MeetingRegistry, Member, ParticipantSender};
