pub mod answers;
pub mod ids;
pub mod selection;
pub mod song;

pub use answers::{FormAnswers, RequiredField, VoiceType, DETAILS_MIN_LEN, OTHER};
pub use ids::{SessionId, SongId};
pub use selection::{CheckoutSnapshot, Selection};
pub use song::{canonical_order, GenerationJob, JobStatus, SongPayload, SongRecord, SongRef, SongVersion};
