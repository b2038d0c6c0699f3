use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    error::with_timeout,
    sources::{ImageGenerator, ImageSize},
    types::Emotion,
};

/// Served when generation fails.
pub(crate) static FALLBACK_IMAGE_URL: &str = "static/images/calm-lake-at-dawn.jpg";

const HISTORY_PREFIX: &str = "image:";

pub(crate) struct Scene {
    pub slug: &'static str,
    pub prompt: &'static str,
}

static SAD_SCENES: [Scene; 3] = [
    Scene {
        slug: "sunrise-meadow",
        prompt: "A soft sunrise over a quiet meadow of wildflowers, warm golden light, \
                 gentle mist, hopeful and comforting atmosphere, painterly style",
    },
    Scene {
        slug: "cozy-window",
        prompt: "A cozy window seat with a warm blanket and a cup of tea, rain outside, \
                 soft lamplight, peaceful and safe feeling, watercolor illustration",
    },
    Scene {
        slug: "lantern-lake",
        prompt: "Floating paper lanterns over a still lake at dusk, reflections on calm water, \
                 tender and uplifting mood, soft pastel colors",
    },
];

static FEAR_SCENES: [Scene; 3] = [
    Scene {
        slug: "sheltered-cabin",
        prompt: "A small lit cabin sheltered in a calm snowy forest, smoke from the chimney, \
                 feeling of safety and warmth, gentle digital painting",
    },
    Scene {
        slug: "harbor-lighthouse",
        prompt: "A steady lighthouse guiding boats into a calm harbor at twilight, \
                 reassuring glow, serene sea, soft illustration",
    },
    Scene {
        slug: "garden-path",
        prompt: "A wide sunlit garden path lined with lavender, clear open sky, \
                 grounded and secure mood, soft impressionist style",
    },
];

static CALM_SCENES: [Scene; 2] = [
    Scene {
        slug: "zen-stones",
        prompt: "Balanced zen stones beside a slow stream, soft morning light, \
                 tranquil and restorative mood, minimal photography style",
    },
    Scene {
        slug: "ocean-horizon",
        prompt: "A calm ocean horizon at golden hour with gentle waves, wide open space, \
                 deep sense of peace, soft focus",
    },
];

pub(crate) fn scenes_for(emotion: &Emotion) -> &'static [Scene] {
    match emotion {
        Emotion::Sadness | Emotion::Depression => &SAD_SCENES,
        Emotion::Fear | Emotion::Anxiety => &FEAR_SCENES,
        _ => &CALM_SCENES,
    }
}

pub(crate) fn history_id(scene: &Scene) -> String {
    format!("{}{}", HISTORY_PREFIX, scene.slug)
}

/// First scene not generated recently; the first one when all were.
pub(crate) fn pick_scene(emotion: &Emotion, recent: &HashSet<String>) -> &'static Scene {
    let scenes = scenes_for(emotion);
    scenes
        .iter()
        .find(|scene| !recent.contains(&history_id(scene)))
        .unwrap_or(&scenes[0])
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TherapeuticImage {
    pub history_id: String,
    pub prompt: String,
    pub url: String,
    pub fallback: bool,
}

pub(crate) struct ImageCurator {
    generator: Arc<dyn ImageGenerator>,
    timeout: Duration,
}

impl ImageCurator {
    pub(crate) fn new(generator: Arc<dyn ImageGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub(crate) async fn create(&self, emotion: &Emotion, recent: &HashSet<String>) -> TherapeuticImage {
        let scene = pick_scene(emotion, recent);
        let generated = with_timeout(
            self.timeout,
            self.generator.generate(scene.prompt, ImageSize::Landscape),
        )
        .await;
        let (url, fallback) = match generated {
            Ok(url) => (url, false),
            Err(err) => {
                log::warn!("image generation for {} fell back: {}", scene.slug, err);
                (FALLBACK_IMAGE_URL.to_string(), true)
            }
        };
        TherapeuticImage {
            history_id: history_id(scene),
            prompt: scene.prompt.to_string(),
            url,
            fallback,
        }
    }
}
