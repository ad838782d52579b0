//! crates/academy_core/src/content.rs
//!
//! Turns prompt templates into finished content through the text generation port:
//! marketing posts, captions and replies to inbound messages.

use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{AcademyData, GeneratedPost, Mood};
use crate::ports::{ChatPrompt, PortError, PortResult, TextGenerationService};
use crate::prompts::{self, PostTheme, Scenario, SCENARIOS};

/// Stock photos used when image generation is switched off.
pub const FALLBACK_IMAGES: [&str; 11] = [
    "https://i.ibb.co/xKGpF5sQ/469991854-122136396014386621-3832266993418146234-n.jpg",
    "https://images.unsplash.com/photo-1555597673-b21d5c935865?fm=jpg",
    "https://images.unsplash.com/photo-1516684991026-4c3032a2b4fd?fm=jpg",
    "https://images.unsplash.com/photo-1607031767898-5f319512ff1e?fm=jpg",
    "https://images.unsplash.com/photo-1738835935023-ebff4a85bc7e?fm=jpg",
    "https://images.unsplash.com/photo-1617627590804-1de3424fbf04?fm=jpg",
    "https://images.unsplash.com/photo-1764622078672-20f2cf5fcbc1?fm=jpg",
    "https://images.unsplash.com/photo-1711825044889-371d0cdf5fe1?fm=jpg",
    "https://images.unsplash.com/photo-1699464676033-150f72c9f030?fm=jpg",
    "https://images.unsplash.com/photo-1616447285757-3d0084ebd43b?fm=jpg",
    "https://images.unsplash.com/photo-1764622078439-245a43822a5c?fm=jpg",
];

const POLLINATIONS_BASE: &str = "https://image.pollinations.ai/prompt/";

/// How a generated post gets its picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageStrategy {
    /// A Pollinations URL rendering the English image prompt on first fetch.
    #[default]
    Pollinations,
    /// A random stock photo.
    Fallback,
}

impl ImageStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pollinations" => Some(ImageStrategy::Pollinations),
            "fallback" => Some(ImageStrategy::Fallback),
            _ => None,
        }
    }

    pub fn image_url(&self, prompt: &str) -> String {
        match self {
            ImageStrategy::Pollinations => pollinations_url(prompt, rand::random::<u32>()),
            ImageStrategy::Fallback => random_fallback_image().to_string(),
        }
    }
}

pub fn pollinations_url(prompt: &str, seed: u32) -> String {
    let Ok(mut url) = Url::parse(POLLINATIONS_BASE) else {
        return random_fallback_image().to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(prompt);
    }
    url.query_pairs_mut()
        .append_pair("width", "1024")
        .append_pair("height", "1024")
        .append_pair("nologo", "true")
        .append_pair("seed", &seed.to_string());
    url.to_string()
}

fn random_fallback_image() -> &'static str {
    FALLBACK_IMAGES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FALLBACK_IMAGES[0])
}

//=========================================================================================
// The Content Studio
//=========================================================================================

#[derive(Clone)]
pub struct ContentStudio {
    llm: Arc<dyn TextGenerationService>,
    images: ImageStrategy,
}

impl ContentStudio {
    pub fn new(llm: Arc<dyn TextGenerationService>, images: ImageStrategy) -> Self {
        Self { llm, images }
    }

    /// A scenario post about `sport`, with a matching image.
    pub async fn scenario_post(
        &self,
        data: &AcademyData,
        mood: Mood,
        scenario: &Scenario,
        sport: &str,
        include_cta: bool,
    ) -> PortResult<GeneratedPost> {
        let prompt = ChatPrompt {
            system: Some(prompts::system_prompt(data, mood)),
            user: prompts::scenario_post_prompt(scenario, sport, data, include_cta),
            max_tokens: 1024,
            temperature: 0.7,
        };
        let caption = self.non_empty(&prompt).await?;
        let image_prompt = prompts::scenario_image_prompt(scenario, sport);
        debug!(scenario = scenario.key, sport, "generated scenario post");
        Ok(GeneratedPost {
            caption,
            image_url: self.images.image_url(&image_prompt),
            image_prompt,
        })
    }

    /// A scenario post with random scenario and sport, used to prefill the queue.
    pub async fn random_post(&self, data: &AcademyData, mood: Mood) -> PortResult<GeneratedPost> {
        let (scenario, sport) = {
            let mut rng = rand::rng();
            let scenario = SCENARIOS.choose(&mut rng).copied().unwrap_or(SCENARIOS[0]);
            let sport = data
                .sports()
                .choose(&mut rng)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "كاراتيه".to_string());
            (scenario, sport)
        };
        self.scenario_post(data, mood, &scenario, &sport, true).await
    }

    pub async fn themed_post(
        &self,
        data: &AcademyData,
        mood: Mood,
        theme: PostTheme,
        headline: Option<&str>,
    ) -> PortResult<GeneratedPost> {
        let prompt = ChatPrompt {
            system: Some(prompts::system_prompt(data, mood)),
            user: prompts::themed_post_prompt(theme, headline),
            max_tokens: 1024,
            temperature: 0.8,
        };
        let caption = self.non_empty(&prompt).await?;
        let image_prompt = theme.image_prompt().to_string();
        Ok(GeneratedPost {
            caption,
            image_url: self.images.image_url(&image_prompt),
            image_prompt,
        })
    }

    /// Caption for an uploaded training photo. Without an LLM configured the
    /// stock caption is used.
    pub async fn caption_for_image(&self, image_url: &str) -> PortResult<String> {
        let prompt = ChatPrompt {
            system: None,
            user: prompts::image_caption_prompt(image_url),
            max_tokens: 250,
            temperature: 0.8,
        };
        match self.non_empty(&prompt).await {
            Err(PortError::Unavailable(_)) => Ok(prompts::FALLBACK_IMAGE_CAPTION.to_string()),
            other => other,
        }
    }

    /// Caption written from an operator's free-text idea.
    pub async fn caption_from_prompt(&self, data: &AcademyData, mood: Mood, idea: &str) -> PortResult<String> {
        let prompt = ChatPrompt {
            system: Some(prompts::system_prompt(data, mood)),
            user: prompts::caption_from_text_prompt(idea),
            max_tokens: 400,
            temperature: 0.8,
        };
        self.non_empty(&prompt).await
    }

    /// The coach's reply to an inbound message or comment. Never fails: if the
    /// LLM is unreachable the contact details are returned instead.
    pub async fn reply(&self, data: &AcademyData, mood: Mood, message: &str) -> String {
        let prompt = ChatPrompt {
            system: Some(prompts::system_prompt(data, mood)),
            user: message.to_string(),
            max_tokens: 800,
            temperature: 0.7,
        };
        match self.llm.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => prompts::fallback_reply(data),
            Err(e) => {
                warn!(error = %e, "reply generation failed, sending contact details");
                prompts::fallback_reply(data)
            }
        }
    }

    async fn non_empty(&self, prompt: &ChatPrompt) -> PortResult<String> {
        let text = prompts::clean_caption(&self.llm.complete(prompt).await?);
        if text.is_empty() {
            return Err(PortError::Upstream("the model returned an empty text".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedText;

    #[test]
    fn pollinations_url_is_encoded() {
        let url = pollinations_url("kids doing karate, warm light", 7);
        assert!(url.starts_with("https://image.pollinations.ai/prompt/kids%20doing%20karate,%20warm%20light?"));
        assert!(url.ends_with("width=1024&height=1024&nologo=true&seed=7"));
    }

    #[test]
    fn fallback_strategy_uses_stock_photos() {
        let url = ImageStrategy::Fallback.image_url("anything");
        assert!(FALLBACK_IMAGES.contains(&url.as_str()));
        assert_eq!(ImageStrategy::parse("Fallback"), Some(ImageStrategy::Fallback));
        assert_eq!(ImageStrategy::parse("dalle"), None);
    }

    #[tokio::test]
    async fn reply_falls_back_to_contact_details() {
        let llm = Arc::new(ScriptedText::failing(PortError::Upstream("503".into())));
        let studio = ContentStudio::new(llm, ImageStrategy::Fallback);
        let data = AcademyData::default();
        let reply = studio.reply(&data, Mood::Balanced, "كام السعر؟").await;
        assert!(reply.contains("01004945997"));
    }

    #[tokio::test]
    async fn scenario_post_sends_persona_and_cleans_caption() {
        let llm = Arc::new(ScriptedText::always("\"بوست جاهز 🥋\""));
        let studio = ContentStudio::new(llm.clone(), ImageStrategy::Fallback);
        let data = AcademyData::default();
        let post = studio
            .scenario_post(&data, Mood::Formal, &SCENARIOS[0], "كاراتيه", false)
            .await
            .unwrap();
        assert_eq!(post.caption, "بوست جاهز 🥋");
        assert!(post.image_prompt.contains("karate coach"));

        let sent = llm.prompts();
        let system = sent[0].system.as_deref().unwrap();
        assert!(system.contains("كابتن عز غريب"));
        assert!(system.contains(prompts::mood_instruction(Mood::Formal)));
    }

    #[tokio::test]
    async fn image_caption_without_llm_uses_stock_caption() {
        let llm = Arc::new(ScriptedText::failing(PortError::Unavailable("no key".into())));
        let studio = ContentStudio::new(llm, ImageStrategy::Fallback);
        assert_eq!(
            studio.caption_for_image("https://i.ibb.co/x.jpg").await.unwrap(),
            prompts::FALLBACK_IMAGE_CAPTION
        );
    }
}
