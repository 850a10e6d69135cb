//! Notification text for a set of triggered alerts
//!
//! The conversation agent writes the message from one of four prompts
//! (friendly or concise, English or Italian). When no agent is available or
//! the call fails, [`fallback_message`] summarizes the alerts by severity.

use hass_ai_core::Language;
use minijinja::{context, Environment};
use serde::Serialize;

use crate::AlertLevel;

const FRIENDLY_EN: &str = r#"Create a friendly, informal smart home alert message.

ALERTS ({{ alerts | length }}):
{% for a in alerts %}• {{ a.level }} - {{ a.name }}: {{ a.value }}{{ a.unit }}
{% endfor %}
STYLE:
- Friendly and reassuring tone
- Use fun emojis 😊
- Like talking to a friend
- Max 200 characters
- Avoid alarmist language
- Suggest simple solutions

FORMAT: [friendly emoji] [reassuring message] + [practical suggestion]"#;

const FRIENDLY_IT: &str = r#"Crea un messaggio informale e amichevole per allerte casa intelligente.

ALLERTE ({{ alerts | length }}):
{% for a in alerts %}• {{ a.level }} - {{ a.name }}: {{ a.value }}{{ a.unit }}
{% endfor %}
STILE:
- Tono amichevole e rassicurante
- Usa emoji divertenti 😊
- Come se parlassi con un amico
- Max 200 caratteri
- Evita allarmismi
- Suggerisci soluzioni semplici

FORMATO: [emoji amichevole] [messaggio rassicurante] + [suggerimento pratico]"#;

const CONCISE_EN: &str = r#"Create a concise smart home alert message.

ACTIVE ALERTS ({{ alerts | length }}):
{% for a in alerts %}• {{ a.level }} - {{ a.name }}: {{ a.value }}{{ a.unit }} (weight {{ a.weight }})
{% endfor %}
RULES:
- Message max 200 characters
- Use appropriate emojis for level
- Priority to CRITICAL/ALERT
- Group similar alerts
- Suggest action if needed

FORMAT: [emoji] [critical status] + [main detail] + [recommended action]"#;

const CONCISE_IT: &str = r#"Crea un messaggio di allerta conciso per la casa intelligente.

ALLERTE ATTIVE ({{ alerts | length }}):
{% for a in alerts %}• {{ a.level }} - {{ a.name }}: {{ a.value }}{{ a.unit }} (peso {{ a.weight }})
{% endfor %}
REGOLE:
- Messaggio max 200 caratteri
- Usa emoji appropriate per livello
- Priorità agli alert CRITICAL/ALERT
- Raggruppa alert simili
- Suggerisci azione se necessario

FORMATO: [emoji] [stato critico] + [dettaglio principale] + [azione consigliata]"#;

/// One triggered alert as shown to the agent and the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDetail {
    pub entity_id: String,
    pub name: String,
    pub level: AlertLevel,
    pub value: String,
    pub unit: String,
    pub weight: u8,
}

/// Most severe first, heavier entities first within a level
pub fn sort_by_priority(details: &mut [AlertDetail]) {
    details.sort_by(|a, b| b.level.cmp(&a.level).then(b.weight.cmp(&a.weight)));
}

pub struct MessagePrompts {
    env: Environment<'static>,
}

impl MessagePrompts {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("friendly_en", FRIENDLY_EN)?;
        env.add_template("friendly_it", FRIENDLY_IT)?;
        env.add_template("concise_en", CONCISE_EN)?;
        env.add_template("concise_it", CONCISE_IT)?;
        Ok(Self { env })
    }

    pub fn render(
        &self,
        alerts: &[AlertDetail],
        language: Language,
        friendly: bool,
    ) -> Result<String, minijinja::Error> {
        let name = match (friendly, language) {
            (true, Language::En) => "friendly_en",
            (true, Language::It) => "friendly_it",
            (false, Language::En) => "concise_en",
            (false, Language::It) => "concise_it",
        };
        self.env
            .get_template(name)?
            .render(context! { alerts => alerts })
    }
}

/// Deterministic summary used when the agent cannot write the message
pub fn fallback_message(alerts: &[AlertDetail], language: Language) -> String {
    let count = |level| alerts.iter().filter(|a| a.level == level).count();
    let critical = count(AlertLevel::Critical);
    let alert = count(AlertLevel::Alert);
    let warning = count(AlertLevel::Warning);

    match language {
        Language::En if critical > 0 => {
            format!("🔥 {critical} CRITICAL alerts detected! Check your home immediately.")
        }
        Language::En if alert > 0 => {
            format!("🚨 {alert} alerts require attention in your smart home.")
        }
        Language::En => format!("⚠️ {warning} warnings detected in your home system."),
        Language::It if critical > 0 => {
            format!("🔥 {critical} allerte CRITICHE rilevate! Controlla subito la casa.")
        }
        Language::It if alert > 0 => {
            format!("🚨 {alert} allerte richiedono attenzione in casa.")
        }
        Language::It => format!("⚠️ {warning} avvisi rilevati nel sistema di casa."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(id: &str, level: AlertLevel, weight: u8) -> AlertDetail {
        AlertDetail {
            entity_id: id.to_string(),
            name: id.to_string(),
            level,
            value: "12".to_string(),
            unit: "%".to_string(),
            weight,
        }
    }

    #[test]
    fn test_priority_sort() {
        let mut details = vec![
            detail("sensor.a", AlertLevel::Warning, 5),
            detail("sensor.b", AlertLevel::Critical, 3),
            detail("sensor.c", AlertLevel::Warning, 4),
            detail("sensor.d", AlertLevel::Critical, 5),
        ];
        sort_by_priority(&mut details);
        let ids: Vec<&str> = details.iter().map(|d| d.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["sensor.d", "sensor.b", "sensor.a", "sensor.c"]);
    }

    #[test]
    fn test_prompts_list_every_alert() {
        let prompts = MessagePrompts::new().unwrap();
        let details = vec![detail("sensor.battery_1", AlertLevel::Alert, 4)];

        let concise = prompts.render(&details, Language::En, false).unwrap();
        assert!(concise.contains("ACTIVE ALERTS (1):"));
        assert!(concise.contains("• ALERT - sensor.battery_1: 12% (weight 4)"));

        let friendly = prompts.render(&details, Language::It, true).unwrap();
        assert!(friendly.contains("ALLERTE (1):"));
        assert!(friendly.contains("• ALERT - sensor.battery_1: 12%"));
    }

    #[test]
    fn test_fallback_message_by_severity() {
        let critical = vec![
            detail("a.a", AlertLevel::Critical, 5),
            detail("b.b", AlertLevel::Warning, 1),
        ];
        assert!(fallback_message(&critical, Language::En).starts_with("🔥 1 CRITICAL"));
        let alerts = vec![detail("a.a", AlertLevel::Alert, 5)];
        assert!(fallback_message(&alerts, Language::En).starts_with("🚨 1 alerts"));
        let warnings = vec![detail("a.a", AlertLevel::Warning, 5)];
        assert!(fallback_message(&warnings, Language::It).starts_with("⚠️ 1 avvisi"));
    }
}
