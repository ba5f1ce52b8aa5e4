//! Static capability profiles.
//!
//! A profile describes what a backend is good at before any traffic has been
//! observed: per-task-type scores, language coverage, and quality/reliability
//! baselines. Runtime behavior only adjusts the rolling metrics, never the
//! profile itself.

use serde::{Deserialize, Serialize};

/// The task classes the analyzer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Reasoning,
    Code,
    Math,
    Creative,
    Analysis,
    Multilingual,
    General,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Reasoning => "reasoning",
            TaskType::Code => "code",
            TaskType::Math => "math",
            TaskType::Creative => "creative",
            TaskType::Analysis => "analysis",
            TaskType::Multilingual => "multilingual",
            TaskType::General => "general",
        }
    }
}

/// Per-task capability scores in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskScores {
    pub reasoning: f64,
    pub code: f64,
    pub math: f64,
    pub creative: f64,
    pub analysis: f64,
    pub multilingual: f64,
    pub general: f64,
}

impl TaskScores {
    pub fn get(&self, task: TaskType) -> f64 {
        match task {
            TaskType::Reasoning => self.reasoning,
            TaskType::Code => self.code,
            TaskType::Math => self.math,
            TaskType::Creative => self.creative,
            TaskType::Analysis => self.analysis,
            TaskType::Multilingual => self.multilingual,
            TaskType::General => self.general,
        }
    }
}

/// Static description of a backend's strengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub tasks: TaskScores,
    /// Languages the backend handles well, lowercase ISO codes.
    pub languages: Vec<String>,
    /// A language the backend is specialized for, if any.
    pub specialization: Option<String>,
    /// Baseline expected latency before any observation.
    pub avg_latency_ms: u64,
    /// Output quality baseline in `[0, 1]`.
    pub quality: f64,
    /// Reliability baseline in `[0, 1]`, used for score tie-breaks.
    pub reliability: f64,
}

impl CapabilityProfile {
    /// Capability score for a task type.
    pub fn task_score(&self, task: TaskType) -> f64 {
        self.tasks.get(task)
    }

    /// Whether the backend lists the language at all.
    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }

    /// Whether the backend is specialized for the language.
    pub fn specialized_for(&self, language: &str) -> bool {
        self.specialization.as_deref() == Some(language)
    }

    /// Profile for OpenAI-style hosted endpoints.
    pub fn openai() -> Self {
        Self {
            tasks: TaskScores {
                reasoning: 0.85,
                code: 0.90,
                math: 0.82,
                creative: 0.85,
                analysis: 0.85,
                multilingual: 0.75,
                general: 0.85,
            },
            languages: vec!["en".into(), "es".into(), "fr".into(), "de".into()],
            specialization: None,
            avg_latency_ms: 2_000,
            quality: 0.90,
            reliability: 0.95,
        }
    }

    /// Profile for the Anthropic messages API.
    pub fn anthropic() -> Self {
        Self {
            tasks: TaskScores {
                reasoning: 0.95,
                code: 0.88,
                math: 0.85,
                creative: 0.90,
                analysis: 0.92,
                multilingual: 0.78,
                general: 0.88,
            },
            languages: vec!["en".into(), "es".into(), "fr".into(), "de".into()],
            specialization: None,
            avg_latency_ms: 2_500,
            quality: 0.95,
            reliability: 0.95,
        }
    }

    /// Profile for Qwen-compatible endpoints, specialized for Chinese.
    pub fn qwen() -> Self {
        Self {
            tasks: TaskScores {
                reasoning: 0.82,
                code: 0.92,
                math: 0.85,
                creative: 0.78,
                analysis: 0.82,
                multilingual: 0.95,
                general: 0.82,
            },
            languages: vec!["zh".into(), "en".into()],
            specialization: Some("zh".into()),
            avg_latency_ms: 2_200,
            quality: 0.85,
            reliability: 0.90,
        }
    }

    /// Profile for a local Ollama daemon.
    pub fn ollama() -> Self {
        Self {
            tasks: TaskScores {
                reasoning: 0.65,
                code: 0.70,
                math: 0.60,
                creative: 0.68,
                analysis: 0.65,
                multilingual: 0.55,
                general: 0.70,
            },
            languages: vec!["en".into()],
            specialization: None,
            avg_latency_ms: 5_000,
            quality: 0.70,
            reliability: 0.80,
        }
    }
}
