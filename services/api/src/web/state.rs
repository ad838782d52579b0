//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::AcademyFile;
use crate::config::Config;
use academy_core::content::ContentStudio;
use academy_core::domain::{AcademyData, BotConfig};
use academy_core::inbox::InboxRouter;
use academy_core::ports::{
    HeadlineSource, ImageHost, PagePublisher, ReplySender, SheetStore, SubscriptionStore, TextGenerationService,
};
use academy_core::publisher::Publisher;
use academy_core::queue::BufferQueue;
use serde::Serialize;
use std::sync::Arc;
use teloxide::Bot;
use tokio::sync::RwLock;

//=========================================================================================
// Port Bundle
//=========================================================================================

/// Every outbound port the handlers need. The binary fills it with the real
/// adapters; tests fill it with the in-memory fakes.
#[derive(Clone)]
pub struct Ports {
    pub sheet: Arc<dyn SheetStore>,
    pub llm: Arc<dyn TextGenerationService>,
    pub page: Arc<dyn PagePublisher>,
    pub replies: Arc<dyn ReplySender>,
    pub headlines: Arc<dyn HeadlineSource>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub images: Arc<dyn ImageHost>,
}

/// Which integrations have credentials, reported by `/self-test`.
#[derive(Debug, Clone, Copy, Default, Serialize, utoipa::ToSchema)]
pub struct Integrations {
    pub llm: bool,
    pub facebook: bool,
    pub whatsapp: bool,
    pub sheet: bool,
    pub telegram: bool,
    pub imgbb: bool,
}

impl Integrations {
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm: config.groq_api_key.is_some(),
            facebook: config.page_access_token.is_some(),
            whatsapp: config.whatsapp_token.is_some(),
            sheet: config.google_sheet_id.is_some() && config.google_service_account_json.is_some(),
            telegram: config.telegram_bot_token.is_some(),
            imgbb: config.imgbb_api_key.is_some(),
        }
    }
}

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub publisher: Arc<Publisher>,
    pub inbox: Arc<InboxRouter>,
    pub studio: ContentStudio,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub images: Arc<dyn ImageHost>,
    pub bot_config: Arc<RwLock<BotConfig>>,
    pub academy: Arc<RwLock<AcademyData>>,
    pub academy_file: AcademyFile,
    pub telegram: Option<Bot>,
    pub integrations: Integrations,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        ports: Ports,
        academy: AcademyData,
        academy_file: AcademyFile,
        telegram: Option<Bot>,
    ) -> Self {
        let bot_config = Arc::new(RwLock::new(BotConfig {
            active_hours: config.active_hours.clone(),
            rss_feeds: config.rss_feeds.clone(),
            ..BotConfig::default()
        }));
        let academy = Arc::new(RwLock::new(academy));
        let studio = ContentStudio::new(ports.llm.clone(), config.image_provider);

        let publisher = Arc::new(Publisher::new(
            BufferQueue::new(ports.sheet.clone()),
            studio.clone(),
            ports.page.clone(),
            ports.headlines.clone(),
            config.publisher_settings(),
            bot_config.clone(),
            academy.clone(),
        ));
        let inbox = Arc::new(InboxRouter::new(
            studio.clone(),
            ports.replies.clone(),
            bot_config.clone(),
            academy.clone(),
        ));

        Self {
            integrations: Integrations::from_config(&config),
            config,
            publisher,
            inbox,
            studio,
            subscriptions: ports.subscriptions,
            images: ports.images,
            bot_config,
            academy,
            academy_file,
            telegram,
        }
    }

    pub fn queue(&self) -> &BufferQueue {
        self.publisher.queue()
    }
}
