mod coordinator;
mod messages;
mod source;

pub use coordinator::Coordinator;
pub use coordinator::Progress;
pub use coordinator::Settings;
pub use coordinator::State;
pub use coordinator::TrackingError;
pub use messages::TrackingMessage;
pub use source::ChainSource;
pub use source::NodeSource;
pub use source::SourceError;
