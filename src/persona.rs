use std::collections::BTreeMap;
use std::path::Path;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::server::AppState;

// ─── Catalogue ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    pub id: &'static str,
    pub name: &'static str,
    pub focus: &'static str,
}

const CATALOGUE: &[Persona] = &[
    Persona { id: "marketing", name: "Alfa", focus: "digital marketing: campaigns, content, tracking, A/B tests, sales funnels" },
    Persona { id: "sales", name: "Vizi", focus: "sales: closing deals, CRM hygiene, value propositions, objection handling" },
    Persona { id: "finance", name: "Cortex", focus: "finance: budgets, cash flow, KPI reporting" },
    Persona { id: "support", name: "Lex", focus: "customer service: SLAs, reply templates, CSAT, escalation" },
    Persona { id: "operations", name: "Octo", focus: "operations: SOPs, automation, workflow improvement" },
    Persona { id: "analytics", name: "Mina", focus: "data analysis: dashboards, KPIs, actionable insights" },
    Persona { id: "projects", name: "Bolt", focus: "project management: scope, time, cost, risk, plans and schedules" },
    Persona { id: "budgeting", name: "Rex", focus: "operational finance: department budgets, cost control" },
    Persona { id: "pr", name: "Buddy", focus: "public relations: messaging, press releases, reputation" },
    Persona { id: "crm", name: "Rover", focus: "customer relationships: loyalty, segmentation, customer journeys" },
    Persona { id: "ecommerce", name: "Valor", focus: "e-commerce: conversion rate, inventory, checkout experience" },
    Persona { id: "product", name: "Zenith", focus: "innovation and product: roadmap, competitors, MVP" },
];

const BASE_INSTRUCTION_EN: &str = "You are a professional business advisor. Answer clearly and precisely, \
focus on results and execution, and use concise headings and bullet points when useful. No filler.";

const BASE_INSTRUCTION_AR: &str = "أنت مساعد محترف يجيب بالعربية بوضوح ودقة، يركز على النتائج والتنفيذ، \
ويستخدم تنسيقًا موجزًا بعناوين ونقاط عند الحاجة.";

pub fn catalogue() -> &'static [Persona] {
    CATALOGUE
}

/// Looks a persona up by id or display name, ignoring case.
pub fn find(key: &str) -> Option<&'static Persona> {
    let key = key.trim();
    CATALOGUE
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(key) || p.name.eq_ignore_ascii_case(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    En,
    Ar,
}

impl Lang {
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|l| l.trim().to_lowercase()) {
            Some(l) if l == "ar" || l.starts_with("ar-") => Lang::Ar,
            _ => Lang::En,
        }
    }
}

// ─── Directives ─────────────────────────────────────────────────────────────

/// Rule lists may be written as one string or as a list; blank entries are
/// dropped and anything else that is not text is skipped.
fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(texts(Value::deserialize(deserializer)?))
}

/// Probing questions per topic. Topics whose value is not a list are skipped.
fn probing_lists<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, Vec<String>>, D::Error> {
    let lists = match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .filter(|(_, v)| v.is_array())
            .map(|(k, v)| (k, texts(v)))
            .collect(),
        _ => BTreeMap::new(),
    };
    Ok(lists)
}

fn texts(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LanguagePolicy {
    #[serde(default)]
    pub mirror_user_language: bool,
    #[serde(default, deserialize_with = "string_or_list")]
    pub primary: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub fallback_order: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DefaultDirectives {
    #[serde(default)]
    pub language_policy: LanguagePolicy,
    #[serde(default, deserialize_with = "string_or_list")]
    pub hard_rules: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub soft_rules: Vec<String>,
    #[serde(default, deserialize_with = "probing_lists")]
    pub probing: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub kpis: Vec<String>,
    pub tone: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PersonaDirectives {
    pub tone: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub hard_rules: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub soft_rules: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub kpis: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub plan_snippets: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub probing_priority: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Directives {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub default: DefaultDirectives,
    #[serde(default)]
    pub personas: BTreeMap<String, PersonaDirectives>,
}

impl Directives {
    /// Missing file gives empty directives; a broken file is logged and ignored.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no directives file, using built-in personas");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read directives file");
                return Self::default();
            }
        };
        match serde_json::from_str::<Directives>(&raw) {
            Ok(d) => {
                info!(
                    path = %path.display(),
                    personas = d.personas.len(),
                    "directives loaded"
                );
                d
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid directives file, ignoring");
                Self::default()
            }
        }
    }

    /// Directives entry for a persona, matched by key, id or display name.
    fn entry(&self, persona: &str) -> Option<(&str, &PersonaDirectives)> {
        let key = persona.trim();
        if key.is_empty() {
            return None;
        }
        if let Some((k, d)) = self.personas.get_key_value(key) {
            return Some((k.as_str(), d));
        }
        let known = find(key);
        self.personas
            .iter()
            .find(|(k, _)| {
                k.eq_ignore_ascii_case(key)
                    || known.is_some_and(|p| k.eq_ignore_ascii_case(p.id) || k.eq_ignore_ascii_case(p.name))
            })
            .map(|(k, d)| (k.as_str(), d))
    }
}

// ─── Prompt Building ────────────────────────────────────────────────────────

fn numbered(title: &str, rules: &[&String]) -> String {
    let mut lines = vec![format!("{}:", title)];
    lines.extend(rules.iter().enumerate().map(|(i, r)| format!("{}. {}", i + 1, r)));
    lines.join("\n")
}

fn structured_prompt(
    directives: &Directives,
    name: &str,
    persona: &PersonaDirectives,
    lang: Lang,
) -> String {
    let base = &directives.default;

    let header = match lang {
        Lang::Ar => "أنت مساعد خبير ضمن فريق استشاري. اتبع قواعد الشخصية بدقة، وأجب دائمًا بلغة المستخدم الحالية.",
        Lang::En => "You are an expert assistant within an advisory team. Strictly follow the persona rules and always reply in the user's current language.",
    };

    let policy = &base.language_policy;
    let lang_block = [
        "LANG_POLICY:".to_string(),
        format!("- mirror_user_language: {}", policy.mirror_user_language),
        format!("- primary: {}", policy.primary.join(", ")),
        format!("- fallback_order: {}", policy.fallback_order.join(", ")),
    ]
    .join("\n");

    let tone = persona
        .tone
        .as_deref()
        .or(base.tone.as_deref())
        .unwrap_or("professional / consultative");
    let style = base.style.as_deref().unwrap_or("direct, precise, organised, practical");
    let kpis = if persona.kpis.is_empty() { &base.kpis } else { &persona.kpis };

    let mut persona_block = vec![
        format!("PERSONA: {}", name),
        format!("TONE: {}", tone),
        format!("STYLE: {}", style),
    ];
    if !kpis.is_empty() {
        persona_block.push(format!("KPIs: {}", kpis.join(", ")));
    }
    if !persona.plan_snippets.is_empty() {
        let hints: Vec<String> = persona.plan_snippets.iter().map(|s| format!("• {}", s)).collect();
        persona_block.push(format!("PLAN_HINTS: {}", hints.join("\n")));
    }

    let hard: Vec<&String> = base.hard_rules.iter().chain(&persona.hard_rules).collect();
    let mut hard_block = numbered("HARD_RULES", &hard);
    hard_block.push_str(
        "\n- Ask probing questions first when information is missing, then give a lean plan tied to KPIs.\
         \n- Tie every recommendation to a clear reason and a trackable metric.\
         \n- No filler and no generalities.",
    );

    let soft: Vec<&String> = base.soft_rules.iter().chain(&persona.soft_rules).collect();
    let soft_block = if soft.is_empty() { String::new() } else { numbered("SOFT_RULES", &soft) };

    let mut probing: Vec<String> = base
        .probing
        .iter()
        .filter(|(_, qs)| !qs.is_empty())
        .map(|(k, qs)| format!("• {}: {}", k, qs.join(" | ")))
        .collect();
    if !persona.probing_priority.is_empty() {
        probing.push(format!("PRIORITY: {}", persona.probing_priority.join(" → ")));
    }
    let probing_block = if probing.is_empty() {
        String::new()
    } else {
        format!("PROBING:\n{}", probing.join("\n"))
    };

    [
        header.to_string(),
        lang_block,
        persona_block.join("\n"),
        hard_block,
        soft_block,
        probing_block,
        "OUTPUT FORMAT: Markdown with clear headings and short lists.".to_string(),
    ]
    .into_iter()
    .filter(|b| !b.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// System prompt for a persona. A directives entry wins over the built-in
/// catalogue; an unknown persona gets the base instruction only.
pub fn system_prompt(directives: &Directives, persona: &str, lang: Lang) -> String {
    if let Some((name, entry)) = directives.entry(persona) {
        return structured_prompt(directives, name, entry, lang);
    }

    let base = match lang {
        Lang::Ar => BASE_INSTRUCTION_AR,
        Lang::En => BASE_INSTRUCTION_EN,
    };
    match find(persona) {
        Some(p) => format!("{}\nYour role: {} ({}).", base, p.name, p.focus),
        None => base.to_string(),
    }
}

// ─── Personas Endpoint ──────────────────────────────────────────────────────

pub async fn list_personas(state: web::Data<AppState>) -> HttpResponse {
    let with_directives: Vec<&str> = catalogue()
        .iter()
        .filter(|p| state.directives.entry(p.id).is_some())
        .map(|p| p.id)
        .collect();
    HttpResponse::Ok().json(serde_json::json!({
        "personas": catalogue(),
        "with_directives": with_directives,
    }))
}
