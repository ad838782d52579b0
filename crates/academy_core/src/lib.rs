pub mod backoff;
pub mod content;
pub mod domain;
pub mod inbox;
pub mod ports;
pub mod prompts;
pub mod publisher;
pub mod queue;
pub mod schedule;
pub mod sheet;
pub mod subscription;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use content::{ContentStudio, ImageStrategy};
pub use domain::{AcademyData, BotConfig, BotConfigUpdate, Mood, PostSource, PostStatus, SheetRow};
pub use inbox::{InboundEvent, InboxRouter};
pub use ports::{
    HeadlineSource, ImageHost, PagePublisher, PortError, PortResult, ReplySender, SheetStore, SubscriptionStore,
    TextGenerationService,
};
pub use publisher::{AutoPostReport, Publisher, PublisherSettings, TickReport};
pub use queue::BufferQueue;
