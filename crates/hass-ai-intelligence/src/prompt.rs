//! Prompt rendering for importance scans
//!
//! Four templates (full/compact × English/Italian) are compiled once. Every
//! prompt is an instruction block followed by one line per entity:
//! `entity_id (domain, state, name)`. Compact prompts use a shorter rubric
//! and truncate names to [`COMPACT_NAME_CHARS`] characters; full prompts cap
//! them at [`FULL_NAME_CHARS`].

use hass_ai_core::{EntitySnapshot, Language};
use minijinja::{context, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::error::PromptError;

/// Friendly names are cut to this many characters in compact prompts
pub const COMPACT_NAME_CHARS: usize = 20;

/// Upper bound on friendly-name length in full prompts
pub const FULL_NAME_CHARS: usize = 60;

const FULL_EN: &str = r#"You are a Home Assistant expert. Analyze the following {{ count }} entities and rate how important each one is for home automation on a scale from 0 to 5:
0 = ignore, 1 = very low, 2 = low, 3 = medium, 4 = high, 5 = critical.

Assign one or more categories to each entity:
- DATA: provides readings or information (sensors, statuses, measurements)
- CONTROL: can be operated (lights, switches, climate, covers, locks)
- ALERTS: worth monitoring for problems (offline devices, low battery, leaks, abnormal temperature or health values)
- SERVICE: managed by integrations, automations or the system rather than by people

Set management_type to USER for entities people interact with directly and SERVICE for entities managed by the system.

Respond ONLY with a JSON array and no other text, one object per entity:
[{"entity_id": "...", "rating": 0-5, "reason": "one short sentence", "category": ["DATA"], "management_type": "USER"}]
Write every reason in English.

Entities:
{% for e in entities %}{{ e.id }} ({{ e.domain }}, {{ e.state }}, {{ e.name }})
{% endfor %}"#;

const FULL_IT: &str = r#"Sei un esperto di Home Assistant. Analizza le seguenti {{ count }} entità e valuta quanto è importante ciascuna per l'automazione domestica su una scala da 0 a 5:
0 = ignora, 1 = molto bassa, 2 = bassa, 3 = media, 4 = alta, 5 = critica.

Assegna una o più categorie a ogni entità:
- DATA: fornisce letture o informazioni (sensori, stati, misure)
- CONTROL: può essere comandata (luci, interruttori, clima, tapparelle, serrature)
- ALERTS: da monitorare per problemi (dispositivi offline, batteria scarica, perdite, temperatura o valori di salute anomali)
- SERVICE: gestita da integrazioni, automazioni o dal sistema invece che dalle persone

Imposta management_type a USER per le entità usate direttamente dalle persone e SERVICE per quelle gestite dal sistema.

Rispondi SOLO con un array JSON e nessun altro testo, un oggetto per entità:
[{"entity_id": "...", "rating": 0-5, "reason": "una frase breve", "category": ["DATA"], "management_type": "USER"}]
Scrivi ogni reason in italiano.

Entità:
{% for e in entities %}{{ e.id }} ({{ e.domain }}, {{ e.state }}, {{ e.name }})
{% endfor %}"#;

const COMPACT_EN: &str = r#"Analyze {{ count }} HA entities. Importance 0-5:
0=Ignore, 1=Very low, 2=Low, 3=Medium, 4=High, 5=Critical
Categories: DATA (sensors), CONTROL (controls), ALERTS (problems/offline/battery<20%), SERVICE (system-managed)
JSON: [{"entity_id":"...","rating":0-5,"reason":"brief","category":"DATA/CONTROL/ALERTS/SERVICE","management_type":"USER/SERVICE"}]
REASON IN ENGLISH.

{% for e in entities %}{{ e.id }} ({{ e.domain }}, {{ e.state }}, {{ e.name }})
{% endfor %}"#;

const COMPACT_IT: &str = r#"Analizza {{ count }} entità HA. Importanza 0-5:
0=Ignora, 1=Molto bassa, 2=Bassa, 3=Media, 4=Alta, 5=Critica
Categorie: DATA (sensori), CONTROL (controlli), ALERTS (problemi/offline/batteria<20%), SERVICE (gestite dal sistema)
JSON: [{"entity_id":"...","rating":0-5,"reason":"breve","category":"DATA/CONTROL/ALERTS/SERVICE","management_type":"USER/SERVICE"}]
REASON IN ITALIANO.

{% for e in entities %}{{ e.id }} ({{ e.domain }}, {{ e.state }}, {{ e.name }})
{% endfor %}"#;

#[derive(Serialize)]
struct PromptEntity<'a> {
    id: &'a str,
    domain: &'a str,
    state: String,
    name: String,
}

/// Renders scan prompts
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        for (name, source) in [
            ("full_en", FULL_EN),
            ("full_it", FULL_IT),
            ("compact_en", COMPACT_EN),
            ("compact_it", COMPACT_IT),
        ] {
            env.add_template(name, source)
                .map_err(|e| PromptError::Compile {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(Self { env })
    }

    fn template_name(language: Language, compact: bool) -> &'static str {
        match (compact, language) {
            (false, Language::En) => "full_en",
            (false, Language::It) => "full_it",
            (true, Language::En) => "compact_en",
            (true, Language::It) => "compact_it",
        }
    }

    /// Render the prompt for one batch
    pub fn build(
        &self,
        entities: &[EntitySnapshot],
        language: Language,
        compact: bool,
    ) -> Result<String, PromptError> {
        let name = Self::template_name(language, compact);
        let rows: Vec<PromptEntity<'_>> = entities
            .iter()
            .map(|e| PromptEntity {
                id: e.entity_id.as_str(),
                domain: &e.domain,
                state: display_state(e),
                name: truncate_chars(
                    &e.friendly_name,
                    if compact { COMPACT_NAME_CHARS } else { FULL_NAME_CHARS },
                ),
            })
            .collect();

        let template = self
            .env
            .get_template(name)
            .map_err(|e| PromptError::render(name, e))?;
        let rendered = template
            .render(context! { count => rows.len(), entities => rows })
            .map_err(|e| PromptError::render(name, e))?;
        Ok(rendered.trim_end().to_string())
    }
}

/// Rough token count used for logging: one token per four characters
pub fn estimate_tokens(prompt: &str) -> usize {
    prompt.chars().count() / 4
}

fn display_state(entity: &EntitySnapshot) -> String {
    match entity.unit() {
        Some("%") => format!("{}%", entity.state),
        Some(unit) if !unit.is_empty() && entity.numeric_state().is_some() => {
            format!("{} {}", entity.state, unit)
        }
        _ => entity.state.clone(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
