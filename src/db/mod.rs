pub mod init;
pub mod meetings;
pub mod speakers;

pub use init::{now_rfc3339, Database};
pub use meetings::{MeetingRepository, MeetingRecord, NewMeeting, PublishTarget, Transition};
pub use speakers::{SpeakerMapping, SpeakerMappingRepository};
