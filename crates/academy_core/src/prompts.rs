//! crates/academy_core/src/prompts.rs
//!
//! Prompt templates for the coach persona: the academy context block, the post
//! scenarios, hour-of-day themes, caption prompts and the canned fallbacks used
//! when the LLM is unreachable.

use crate::domain::{AcademyData, Mood};

pub const COACH_SYSTEM_PROMPT: &str = r#"أنت "كابتن عز غريب" - مدير ومدرب أكاديمية أبطال أكتوبر للفنون القتالية والجمباز.

شخصيتك:
🥋 مدرب محترف وخبير في الرياضات القتالية
💪 حماسي ومشجع، تحب تحفز الناس
😊 ودود ومرحب، بتتعامل مع الآباء باحترام
🎯 محترف ودقيق في المعلومات

أسلوبك في الكلام:
- تتحدث بالعربية المصرية العامية
- تستخدم إيموجي بشكل معتدل ومناسب
- تبدأ الرد بتحية ودودة
- تختم بدعوة للتواصل أو التسجيل
- تذكر العروض الحالية عند المناسبة

مهمتك:
1. الرد على استفسارات الآباء والمهتمين
2. تشجيع التسجيل في الأكاديمية
3. إبراز فوائد الرياضة للأطفال
4. تقديم معلومات دقيقة عن المواعيد والأسعار
5. الترويج للعروض الحالية

ملاحظات مهمة:
- دائماً اذكر رقم التواصل عند السؤال عن التسجيل
- شجع على زيارة الأكاديمية للتجربة
- أكد على أهمية الرياضة في بناء شخصية الطفل
- اذكر أن التدريب مناسب لجميع الأعمار من 4 سنوات"#;

/// The academy facts block appended to the persona.
pub fn academy_context(data: &AcademyData) -> String {
    let mut context = format!(
        "\n📍 معلومات الأكاديمية:\n- الاسم: {}\n- المدير: {}\n- العنوان: {}\n- خريطة جوجل: {}\n- فيسبوك: {}\n- الهاتف: {}\n\n📅 المواعيد:\n",
        data.academy_name,
        data.manager,
        data.location,
        data.map_link,
        data.facebook,
        data.phones(),
    );
    for (sport, times) in &data.schedules {
        context.push_str(&format!("\n- {}: {}", sport, times.join(", ")));
    }
    context.push_str("\n\n💰 الأسعار:\n");
    for (sport, price) in &data.pricing {
        context.push_str(&format!("- {}: {}\n", sport, price));
    }
    context.push_str("\n🎁 العروض الحالية:\n");
    for offer in &data.offers {
        context.push_str(&format!("- {}\n", offer));
    }
    context
}

/// Persona + academy facts + tone.
pub fn system_prompt(data: &AcademyData, mood: Mood) -> String {
    format!(
        "{}\n\n{}\n{}",
        COACH_SYSTEM_PROMPT,
        academy_context(data),
        mood_instruction(mood)
    )
}

pub fn mood_instruction(mood: Mood) -> &'static str {
    match mood {
        Mood::Formal => "🎭 النبرة المطلوبة: رسمية ومهنية، بدون مبالغة وبإيموجي قليل جداً.",
        Mood::Balanced => "🎭 النبرة المطلوبة: متوازنة، ودودة ومهنية في نفس الوقت.",
        Mood::Enthusiastic => "🎭 النبرة المطلوبة: حماسية جداً ومليانة طاقة وتحفيز! 🔥",
    }
}

/// Said when the LLM cannot be reached for an inbound message.
pub fn fallback_reply(data: &AcademyData) -> String {
    format!(
        "أهلاً! 🥋\n\nللاستفسار عن الأكاديمية، تواصل معنا:\n📞 {}\n📍 {}",
        data.phones(),
        data.location
    )
}

pub const FALLBACK_IMAGE_CAPTION: &str = "🥋 جاهزين للتمرين؟ احجز مكانك دلوقتي! 📞";

//=========================================================================================
// Post Scenarios
//=========================================================================================

/// A kind of marketing post: an Arabic writing brief and an English image brief.
/// Both contain a `{sport}` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub key: &'static str,
    pub title: &'static str,
    pub prompt: &'static str,
    pub image_prompt: &'static str,
}

pub const SCENARIOS: [Scenario; 8] = [
    Scenario {
        key: "training_tip",
        title: "💡 نصيحة تدريبية",
        image_prompt: "Professional photo of a {sport} coach teaching young students in a martial arts gym, warm lighting, motivational atmosphere",
        prompt: "اكتب نصيحة تدريبية قصيرة ومفيدة عن رياضة {sport}.\nالنصيحة يجب أن تكون:\n- عملية وقابلة للتطبيق\n- مناسبة للمبتدئين والمتقدمين\n- تشجع على الاستمرار في التدريب\nاختم بتشجيع بسيط ودعوة للتدريب في الأكاديمية.",
    },
    Scenario {
        key: "success_story",
        title: "🏆 قصة نجاح",
        image_prompt: "Happy young child wearing {sport} uniform holding a trophy, proud parents in background, celebration scene",
        prompt: "اكتب قصة نجاح ملهمة (خيالية) عن طفل بدأ التدريب في رياضة {sport}.\nالقصة يجب أن تبرز:\n- التحول في شخصيته (الثقة، الانضباط)\n- الفوائد الصحية والنفسية\n- دور الأكاديمية في تطويره\nاجعلها عاطفية ومحفزة للآباء للتسجيل.",
    },
    Scenario {
        key: "did_you_know",
        title: "❓ هل تعلم",
        image_prompt: "Artistic infographic style image about {sport}, educational theme, colorful and engaging",
        prompt: "اكتب معلومة مثيرة من نوع \"هل تعلم\" عن رياضة {sport}.\nالمعلومة يجب أن تكون:\n- مفاجئة وجديدة\n- علمية أو تاريخية\n- تبرز فوائد الرياضة\nاختم بسؤال تفاعلي يشجع على التعليق.",
    },
    Scenario {
        key: "offer",
        title: "📢 إعلان عرض",
        image_prompt: "Professional sports academy promotional banner, modern design, {sport} theme, sale announcement style",
        prompt: "اكتب إعلان جذاب عن العروض الحالية للأكاديمية.\nالإعلان يجب أن يكون:\n- واضح ومباشر\n- يخلق إحساس بالعجلة (عرض محدود)\n- يتضمن السعر والموعد ورقم التواصل\nاستخدم إيموجي بشكل جذاب.",
    },
    Scenario {
        key: "call_to_register",
        title: "🎯 دعوة للتسجيل",
        image_prompt: "Group of happy children in {sport} uniforms practicing together in a modern gym, welcoming atmosphere",
        prompt: "اكتب دعوة قوية للتسجيل في الأكاديمية لرياضة {sport}.\nالدعوة يجب أن تتضمن:\n- فوائد الرياضة للطفل\n- الموعد والسعر\n- أرقام التواصل والعنوان\nاجعلها مقنعة للآباء المترددين.",
    },
    Scenario {
        key: "health_benefits",
        title: "🧘 فوائد صحية",
        image_prompt: "Healthy fit child doing {sport} stretching exercises, bright clean gym, wellness theme",
        prompt: "اكتب عن الفوائد الصحية والنفسية لرياضة {sport} للأطفال.\nتحدث عن:\n- الفوائد البدنية (القوة، المرونة، التنسيق)\n- الفوائد النفسية (الثقة، التركيز، الانضباط)\n- الفوائد الاجتماعية (العمل الجماعي، الاحترام)\nاختم بدعوة للاشتراك.",
    },
    Scenario {
        key: "parents_advice",
        title: "👨‍👩‍👧 نصيحة للآباء",
        image_prompt: "Parent and child at {sport} practice, supportive family moment, encouraging atmosphere",
        prompt: "اكتب نصيحة للآباء عن كيفية دعم طفلهم في ممارسة رياضة {sport}.\nالنصيحة يجب أن تشمل:\n- كيفية تشجيع الطفل\n- أهمية الصبر والاستمرارية\n- دور الأسرة في النجاح الرياضي\nاجعلها ودودة ومفيدة.",
    },
    Scenario {
        key: "schedule_reminder",
        title: "📅 تذكير بالمواعيد",
        image_prompt: "Modern sports academy schedule board, {sport} icons, clean calendar design",
        prompt: "اكتب تذكير ودي بمواعيد تدريب رياضة {sport} هذا الأسبوع.\nالتذكير يجب أن يكون:\n- واضح وسهل القراءة\n- يشجع على الالتزام\n- يتضمن معلومات التواصل للاستفسار\nاجعله حماسي ومشجع.",
    },
];

pub fn scenario_by_key(key: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.key == key || s.title == key)
}

/// Arabic sport name → English term for image prompts.
pub fn sport_in_english(sport: &str) -> &'static str {
    match sport {
        "كاراتيه" => "karate",
        "كونغ فو" => "kung fu",
        "كيك بوكسينج" => "kickboxing",
        "جمباز" => "gymnastics",
        "ملاكمة" => "boxing",
        "تايكوندو" => "taekwondo",
        _ => "martial arts",
    }
}

/// The full user turn for a scenario post about `sport`.
pub fn scenario_post_prompt(scenario: &Scenario, sport: &str, data: &AcademyData, include_cta: bool) -> String {
    let base = scenario.prompt.replace("{sport}", sport);
    let schedule = data
        .schedules
        .get(sport)
        .and_then(|times| times.first())
        .map(String::as_str)
        .unwrap_or("غير محدد");
    let price = data.pricing.get(sport).map(String::as_str).unwrap_or("غير محدد");
    let offers = bullet_list(&data.offers);

    let cta = if include_cta {
        format!(
            "\n\nفي نهاية المنشور، أضف دعوة للتواصل:\n- رقم التواصل: {} أو {}\n- العنوان: {}\n",
            data.phone, data.phone_alt, data.location
        )
    } else {
        String::new()
    };

    format!(
        "{base}\n\nمعلومات الرياضة:\n- الموعد: {schedule}\n- السعر: {price}\n\nالعروض الحالية:\n{offers}{cta}\n\nاكتب المنشور باللغة العربية المصرية، استخدم إيموجي بشكل جذاب.\n4-6 جمل فقط."
    )
}

pub fn scenario_image_prompt(scenario: &Scenario, sport: &str) -> String {
    scenario.image_prompt.replace("{sport}", sport_in_english(sport))
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

//=========================================================================================
// Hour-of-day Themes
//=========================================================================================

/// Theme of an automatic post, chosen by local hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTheme {
    MorningMotivation,
    HealthNutrition,
    KidsTips,
    TrainingTechnique,
    OffersEvening,
}

impl PostTheme {
    /// `None` between midnight and 06:00: the coach is asleep.
    pub fn for_hour(hour: u32) -> Option<Self> {
        match hour {
            6..=10 => Some(PostTheme::MorningMotivation),
            11..=13 => Some(PostTheme::HealthNutrition),
            14..=16 => Some(PostTheme::KidsTips),
            17..=19 => Some(PostTheme::TrainingTechnique),
            20..=23 => Some(PostTheme::OffersEvening),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostTheme::MorningMotivation => "🌞 صباحي (تحفيز)",
            PostTheme::HealthNutrition => "🍎 صحة وتغذية",
            PostTheme::KidsTips => "👶 أطفال ونصائح",
            PostTheme::TrainingTechnique => "🥋 تمرين وفنيات",
            PostTheme::OffersEvening => "🌙 عروض وليل",
        }
    }

    pub fn image_prompt(&self) -> &'static str {
        match self {
            PostTheme::MorningMotivation => "Sunrise over a martial arts dojo, energetic young athletes warming up, motivational morning atmosphere",
            PostTheme::HealthNutrition => "Healthy colorful meal next to a karate belt and water bottle, sports nutrition theme, bright lighting",
            PostTheme::KidsTips => "Happy kids in martial arts uniforms learning with a friendly coach, playful and safe gym environment",
            PostTheme::TrainingTechnique => "Martial arts athlete performing a precise kick in a modern gym, dynamic action shot, dramatic lighting",
            PostTheme::OffersEvening => "Sports academy promotional poster at night, neon accents, special offer announcement style",
        }
    }
}

/// User turn for an automatic themed post, optionally inspired by a headline.
pub fn themed_post_prompt(theme: PostTheme, headline: Option<&str>) -> String {
    let mut prompt = format!("اكتب بوست فيسبوك عن {}", theme.label());
    if let Some(title) = headline.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push_str(&format!(" مستوحي من خبر بعنوان: {}", title));
    }
    prompt.push_str("\nاكتب المنشور باللغة العربية المصرية، 4-6 جمل، مع إيموجي مناسبة ودعوة للحجز.");
    prompt
}

//=========================================================================================
// Captions
//=========================================================================================

pub fn image_caption_prompt(image_url: &str) -> String {
    format!(
        "اكتب كابشن فيسبوك عربي مصري (عامية) عن صورة تدريب في أكاديمية رياضية (فنون قتالية/جمباز). \
         الكابشن يكون قصير ومقسّم 2-4 سطور، فيه تحفيز + CTA للحجز + إيموجيز مناسبة. \
         لا تذكر أنك لم ترَ الصورة. رابط الصورة (للسياق فقط): {}",
        image_url
    )
}

pub fn caption_from_text_prompt(text: &str) -> String {
    format!(
        "حوّل الفكرة التالية إلى كابشن فيسبوك عربي مصري (عامية) لأكاديمية رياضية. \
         الكابشن يكون 2-5 سطور، فيه تحفيز + CTA للحجز + إيموجيز مناسبة. \
         اكتب الكابشن فقط بدون أي شرح.\n\nالفكرة: {}",
        text.trim()
    )
}

/// Strips the wrapping the model sometimes adds around a caption: code fences,
/// a leading "Caption:"/"الكابشن:" label and surrounding quotes.
pub fn clean_caption(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(inner) = text.strip_prefix("```").and_then(|t| t.strip_suffix("```")) {
        text = inner.trim();
    }
    for label in ["Caption:", "caption:", "الكابشن:", "كابشن:"] {
        if let Some(rest) = text.strip_prefix(label) {
            text = rest.trim();
        }
    }
    let quotes: &[char] = &['"', '“', '”', '«', '»'];
    if text.starts_with(quotes) && text.ends_with(quotes) && text.chars().count() >= 2 {
        text = text.trim_matches(quotes).trim();
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_lists_every_sport_and_offer() {
        let data = AcademyData::default();
        let ctx = academy_context(&data);
        for sport in data.sports() {
            assert!(ctx.contains(sport), "missing {sport}");
        }
        for offer in &data.offers {
            assert!(ctx.contains(offer.as_str()));
        }
        assert!(ctx.contains("01004945997 أو 01033111786"));
    }

    #[test]
    fn scenario_prompt_fills_sport_facts() {
        let data = AcademyData::default();
        let scenario = scenario_by_key("training_tip").unwrap();
        let prompt = scenario_post_prompt(scenario, "جمباز", &data, true);
        assert!(prompt.contains("رياضة جمباز"));
        assert!(prompt.contains("600 جنيه/شهر"));
        assert!(prompt.contains("الاثنين والخميس - 3:00 م (مبتدئين)"));
        assert!(prompt.contains("رقم التواصل"));

        let without_cta = scenario_post_prompt(scenario, "رياضة مجهولة", &data, false);
        assert!(without_cta.contains("غير محدد"));
        assert!(!without_cta.contains("رقم التواصل"));
    }

    #[test]
    fn image_prompt_uses_english_sport() {
        let scenario = scenario_by_key("🏆 قصة نجاح").unwrap();
        assert!(scenario_image_prompt(scenario, "تايكوندو").contains("taekwondo uniform"));
        assert!(scenario_image_prompt(scenario, "يوجا").contains("martial arts uniform"));
    }

    #[test]
    fn themes_follow_hour_bands() {
        assert_eq!(PostTheme::for_hour(3), None);
        assert_eq!(PostTheme::for_hour(9), Some(PostTheme::MorningMotivation));
        assert_eq!(PostTheme::for_hour(13), Some(PostTheme::HealthNutrition));
        assert_eq!(PostTheme::for_hour(22), Some(PostTheme::OffersEvening));
    }

    #[test]
    fn themed_prompt_mentions_headline() {
        let p = themed_post_prompt(PostTheme::KidsTips, Some(" Benefits of morning exercise "));
        assert!(p.contains("مستوحي من خبر بعنوان: Benefits of morning exercise"));
        assert!(!themed_post_prompt(PostTheme::KidsTips, Some("  ")).contains("مستوحي"));
    }

    #[test]
    fn caption_cleanup() {
        assert_eq!(clean_caption("  \"يلا نتمرن 💪\"  "), "يلا نتمرن 💪");
        assert_eq!(clean_caption("Caption: يلا بينا"), "يلا بينا");
        assert_eq!(clean_caption("```\nسطر\n```"), "سطر");
        assert_eq!(clean_caption("عادي"), "عادي");
    }
}
