use crate::types::{DossierError, Result, Tone, ToneStore, DEFAULT_TONE};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// Built-in voice preset shipped with the engine.
#[derive(Debug, Clone, Copy)]
pub struct TonePreset {
    pub name: &'static str,
    pub style_prompt: &'static str,
    pub requires_unrestricted: bool,
}

pub const PROFESSIONAL_STYLE: &str = "Write in a clear, professional tone suitable for a business briefing. \
Be precise and neutral, favour short paragraphs, and avoid slang, hype and speculation.";

pub const SYSTEM_TONES: &[TonePreset] = &[
    TonePreset {
        name: DEFAULT_TONE,
        style_prompt: PROFESSIONAL_STYLE,
        requires_unrestricted: false,
    },
    TonePreset {
        name: "casual",
        style_prompt: "Write like you are catching up a friend over coffee. Relaxed, conversational, \
plain words, the occasional aside. Keep the facts straight.",
        requires_unrestricted: false,
    },
    TonePreset {
        name: "enthusiastic",
        style_prompt: "Write with energy and genuine excitement. Highlight what is new or surprising \
and keep the momentum up, without inventing anything.",
        requires_unrestricted: false,
    },
    TonePreset {
        name: "analytical",
        style_prompt: "Write as an analyst. Connect the stories, point out trends, causes and likely \
consequences, and separate what is reported from what is inferred.",
        requires_unrestricted: false,
    },
    TonePreset {
        name: "witty",
        style_prompt: "Write with dry humour and clever turns of phrase. Stay informative; the jokes \
should never obscure the news.",
        requires_unrestricted: false,
    },
    TonePreset {
        name: "unhinged",
        style_prompt: "Write with no filter: irreverent, profane when it fits, wildly opinionated and \
over the top. Every fact you mention must still be accurate.",
        requires_unrestricted: true,
    },
];

/// Which generation model a tone is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRoute {
    Standard,
    Unrestricted,
}

impl ModelRoute {
    pub fn for_tone(tone: &Tone) -> Self {
        if tone.requires_unrestricted {
            ModelRoute::Unrestricted
        } else {
            ModelRoute::Standard
        }
    }
}

/// Model names per route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub standard: String,
    pub unrestricted: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            standard: "llama3.1:8b".to_string(),
            unrestricted: "dolphin-llama3:8b".to_string(),
        }
    }
}

impl ModelSelection {
    pub fn model_for(&self, route: ModelRoute) -> &str {
        match route {
            ModelRoute::Standard => &self.standard,
            ModelRoute::Unrestricted => &self.unrestricted,
        }
    }
}

impl TonePreset {
    pub fn to_tone(&self) -> Tone {
        Tone {
            id: Uuid::new_v4(),
            name: self.name.to_string(),
            style_prompt: self.style_prompt.to_string(),
            is_system_default: true,
            requires_unrestricted: self.requires_unrestricted,
        }
    }
}

/// The professional style, used whenever a tone cannot be resolved.
pub fn fallback_tone() -> Tone {
    Tone {
        id: Uuid::nil(),
        name: DEFAULT_TONE.to_string(),
        style_prompt: PROFESSIONAL_STYLE.to_string(),
        is_system_default: true,
        requires_unrestricted: false,
    }
}

/// Look up `name`, falling back to the professional style. Never fails.
pub async fn resolve_tone(store: &dyn ToneStore, name: &str) -> Tone {
    let lookup = store.find_tone(name).await;
    match lookup {
        Ok(Some(tone)) => tone,
        Ok(None) => {
            let err = DossierError::ToneResolution { name: name.to_string() };
            warn!(tone = %name, error = %err, "Falling back to default tone");
            fallback_tone()
        }
        Err(e) => {
            warn!(tone = %name, error = %e, "Tone lookup failed, falling back to default tone");
            fallback_tone()
        }
    }
}

/// Insert the built-in presets. Existing names are left untouched.
pub async fn seed_system_tones(pool: &PgPool) -> Result<usize> {
    let mut inserted = 0;
    for preset in SYSTEM_TONES {
        let result = sqlx::query(
            r#"
            INSERT INTO tones (id, name, style_prompt, is_system_default, requires_unrestricted)
            VALUES ($1, $2, $3, TRUE, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(preset.name)
        .bind(preset.style_prompt)
        .bind(preset.requires_unrestricted)
        .execute(pool)
        .await?;

        inserted += result.rows_affected() as usize;
    }

    info!("Seeded {} system tones", inserted);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedTones(Vec<Tone>);

    #[async_trait]
    impl ToneStore for FixedTones {
        async fn find_tone(&self, name: &str) -> Result<Option<Tone>> {
            Ok(self.0.iter().find(|t| t.name == name).cloned())
        }

        async fn list_tones(&self) -> Result<Vec<Tone>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTones;

    #[async_trait]
    impl ToneStore for BrokenTones {
        async fn find_tone(&self, _name: &str) -> Result<Option<Tone>> {
            Err(DossierError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn list_tones(&self) -> Result<Vec<Tone>> {
            Err(DossierError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn presets() -> FixedTones {
        FixedTones(SYSTEM_TONES.iter().map(TonePreset::to_tone).collect())
    }

    #[test]
    fn only_unhinged_needs_the_unrestricted_model() {
        let selection = ModelSelection::default();
        for preset in SYSTEM_TONES {
            let route = ModelRoute::for_tone(&preset.to_tone());
            if preset.name == "unhinged" {
                assert_eq!(route, ModelRoute::Unrestricted);
                assert_eq!(selection.model_for(route), selection.unrestricted);
            } else {
                assert_eq!(route, ModelRoute::Standard);
                assert_eq!(selection.model_for(route), selection.standard);
            }
        }
    }

    #[test]
    fn custom_tone_flag_drives_the_route() {
        let mut tone = fallback_tone();
        tone.name = "pirate".to_string();
        tone.is_system_default = false;
        tone.requires_unrestricted = true;
        assert_eq!(ModelRoute::for_tone(&tone), ModelRoute::Unrestricted);
    }

    #[tokio::test]
    async fn resolves_known_tone() {
        let tone = resolve_tone(&presets(), "witty").await;
        assert_eq!(tone.name, "witty");
        assert!(tone.style_prompt.contains("humour"));
    }

    #[tokio::test]
    async fn unknown_tone_falls_back_to_professional() {
        let tone = resolve_tone(&presets(), "shakespearean").await;
        assert_eq!(tone.name, DEFAULT_TONE);
        assert_eq!(tone.style_prompt, PROFESSIONAL_STYLE);
        assert!(!tone.requires_unrestricted);
    }

    #[tokio::test]
    async fn lookup_error_falls_back_too() {
        let tone = resolve_tone(&BrokenTones, "witty").await;
        assert_eq!(tone.style_prompt, PROFESSIONAL_STYLE);
    }

    #[test]
    fn preset_names_are_unique() {
        let mut names: Vec<_> = SYSTEM_TONES.iter().map(|p| p.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SYSTEM_TONES.len());
    }
}
