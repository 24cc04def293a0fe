//! Parent-contact message drafting.
//!
//! The generator itself is an outside service. This module builds the prompt,
//! talks to the service through [`MessageGenerator`], and runs one draft per
//! worker thread so the request loop is never blocked on the network.

use crate::config::GenerationConfig;
use crate::model::{present, Student};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Shown when the service answered but produced no text.
pub const EMPTY_DRAFT_MESSAGE: &str = "Mesaj oluşturulamadı.";
/// Shown in place of the draft when generation failed.
pub const DRAFT_FAILED_MESSAGE: &str =
    "Erreur : Impossible de créer le message. Veuillez réessayer.";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("generation service returned no text")]
    EmptyResponse,
}

impl GenerationError {
    /// Localized text the UI shows instead of a draft.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            GenerationError::EmptyResponse => EMPTY_DRAFT_MESSAGE,
            _ => DRAFT_FAILED_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftRequest {
    pub student_name: String,
    pub parent_name: String,
    pub topic: String,
}

impl DraftRequest {
    pub fn new(student_name: &str, parent_name: &str, topic: &str) -> Result<Self, GenerationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(GenerationError::EmptyTopic);
        }
        Ok(Self {
            student_name: student_name.trim().to_string(),
            parent_name: parent_name.trim().to_string(),
            topic: topic.to_string(),
        })
    }
}

/// Turkish prompt asking for a short message to the parent.
pub fn build_prompt(req: &DraftRequest) -> String {
    format!(
        "Sen yardımcı bir asistan öğretmensin. Aşağıdaki bilgilere dayanarak bir öğrenci velisine \
göndermek üzere nazik, profesyonel ve kısa bir Türkçe WhatsApp mesajı taslağı oluştur.\n\
\n\
Öğrenci Adı: {student}\n\
Veli Adı: {parent}\n\
Konu/Durum: {topic}\n\
\n\
Mesaj doğrudan veliye hitaben yazılmalı (\"Sayın [Veli Adı], ...\").\n\
İmza kısmına \"[Öğretmen Adı]\" yaz.\n\
Sadece mesaj içeriğini döndür, başka açıklama ekleme.",
        student = req.student_name,
        parent = req.parent_name,
        topic = req.topic,
    )
}

pub trait MessageGenerator: Send + Sync {
    fn generate(&self, req: &DraftRequest) -> Result<String, GenerationError>;
}

/// Blocking client for the Generative Language `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

impl GeminiGenerator {
    /// `Ok(None)` when no API key is configured.
    pub fn from_config(cfg: &GenerationConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(cfg.timeout)
            .build()?;
        Ok(Some(Self {
            client,
            base_url: cfg.base_url.clone(),
            model: cfg.model.clone(),
            api_key,
        }))
    }
}

impl MessageGenerator for GeminiGenerator {
    fn generate(&self, req: &DraftRequest) -> Result<String, GenerationError> {
        let prompt = build_prompt(req);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: GenerateResponse = response.json()?;
        parsed.text().ok_or(GenerationError::EmptyResponse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Mother,
    Father,
}

impl Recipient {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "mother" => Some(Recipient::Mother),
            "father" => Some(Recipient::Father),
            _ => None,
        }
    }

    /// Mother when named, otherwise father when named.
    pub fn default_for(student: &Student) -> Option<Self> {
        if present(&student.mother_name).is_some() {
            Some(Recipient::Mother)
        } else if present(&student.father_name).is_some() {
            Some(Recipient::Father)
        } else {
            None
        }
    }

    /// `(name, phone)` of the chosen parent. A parent without a name cannot be
    /// addressed.
    pub fn contact(self, student: &Student) -> Option<(&str, Option<&str>)> {
        let (name, phone) = match self {
            Recipient::Mother => (&student.mother_name, &student.mother_phone),
            Recipient::Father => (&student.father_name, &student.father_phone),
        };
        present(name).map(|n| (n, present(phone)))
    }
}

pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// `wa.me` deep link with the draft pre-filled. `None` when the phone has no
/// digits.
pub fn whatsapp_link(phone: &str, text: &str) -> Option<String> {
    let digits = normalize_phone(phone);
    if digits.is_empty() {
        return None;
    }
    let url = reqwest::Url::parse_with_params(&format!("https://wa.me/{digits}"), &[("text", text)])
        .ok()?;
    // Form encoding writes spaces as `+` and a literal `+` as `%2B`.
    Some(String::from(url).replace('+', "%20"))
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("message generation is not configured (no API key)")]
    NotConfigured,
    #[error("a draft for this request is already in progress")]
    InProgress,
    #[error("failed to start draft worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs drafts off the request loop. One in-flight draft per distinct
/// request; a resubmission while it is pending is refused.
#[derive(Clone)]
pub struct DraftDispatcher {
    generator: Option<Arc<dyn MessageGenerator>>,
    in_flight: Arc<Mutex<HashSet<DraftRequest>>>,
    // Workers that have not finished their callback yet.
    running: Arc<(Mutex<usize>, Condvar)>,
}

impl DraftDispatcher {
    pub fn new(generator: Option<Arc<dyn MessageGenerator>>) -> Self {
        Self {
            generator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    pub fn pending(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Blocks until every started worker has delivered its result, or `limit`
    /// has passed. Returns whether the dispatcher went idle.
    pub fn wait_idle(&self, limit: Duration) -> bool {
        let (count, idle) = &*self.running;
        let guard = count.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = idle
            .wait_timeout_while(guard, limit, |n| *n > 0)
            .unwrap_or_else(|p| p.into_inner());
        *guard == 0
    }

    /// Starts a draft. `on_done` runs on the worker thread once the in-flight
    /// slot has been released.
    pub fn submit<F>(&self, req: DraftRequest, on_done: F) -> Result<JoinHandle<()>, DispatchError>
    where
        F: FnOnce(Result<String, GenerationError>) + Send + 'static,
    {
        let Some(generator) = self.generator.clone() else {
            return Err(DispatchError::NotConfigured);
        };
        {
            let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            if !set.insert(req.clone()) {
                return Err(DispatchError::InProgress);
            }
        }

        let in_flight = Arc::clone(&self.in_flight);
        let running = Arc::clone(&self.running);
        worker_started(&running);
        let key = req.clone();
        let spawned = std::thread::Builder::new()
            .name("rosterd-draft".into())
            .spawn(move || {
                debug!(student = %req.student_name, "generating draft");
                let result = generator.generate(&req);
                if let Err(e) = &result {
                    warn!(error = %e, "draft generation failed");
                }
                in_flight
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&req);
                on_done(result);
                worker_finished(&running);
            });
        match spawned {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.in_flight
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(&key);
                worker_finished(&self.running);
                Err(DispatchError::Spawn(e))
            }
        }
    }
}

fn worker_started(running: &(Mutex<usize>, Condvar)) {
    *running.0.lock().unwrap_or_else(|p| p.into_inner()) += 1;
}

fn worker_finished(running: &(Mutex<usize>, Condvar)) {
    let mut n = running.0.lock().unwrap_or_else(|p| p.into_inner());
    *n = n.saturating_sub(1);
    if *n == 0 {
        running.1.notify_all();
    }
}
