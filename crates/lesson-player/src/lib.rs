//! Progress-gated lesson player.
//!
//! Plays the video steps of a lesson sequence while enforcing the learning
//! rules around them: steps unlock in order, seeking past unwatched content
//! can be refused, timed quizzes interrupt playback, and watch progress is
//! mirrored to a local cache and a remote store.
//!
//! [`LessonPlayer`] is the synchronous controller; [`PlayerDriver`] runs it
//! on a tokio task and owns its timers. The media surface is abstracted by
//! [`MediaElement`].

pub mod config;
pub mod content;
pub mod driver;
pub mod element;
pub mod error;
pub mod events;
pub mod manifest;
pub mod model;
pub mod persistence;
pub mod player;
pub mod quality;
pub mod retry;
pub mod sequence;
pub mod session;

pub use config::{GlobalSettings, IncorrectAnswerPolicy, PlayerConfig, RemoteConfig};
pub use content::{ContentSource, HttpContentClient, StaticContent};
pub use driver::{PlayerDriver, PlayerHandle, PlayerInput};
pub use element::{ElementCommand, MediaElement, RecordingElement};
pub use error::{PlayerError, Result, SeekRejection};
pub use events::PlayerEvent;
pub use manifest::{ManifestLoader, PlayableSource, SourceKind, StreamMode};
pub use model::{CompletionSet, Lesson, ProgressRecord, Step, StepId, StepKind, VideoStep};
pub use persistence::{HttpProgressStore, LocalProgressCache, ProgressBridge, RemoteProgressStore};
pub use player::LessonPlayer;
pub use quality::{QualityVariant, VariantId};
pub use retry::RetryPolicy;
pub use sequence::{SequenceGate, StepStatus};
pub use session::{Generation, PlayerSession, QuizOutcome, QuizState, SeekMode};
