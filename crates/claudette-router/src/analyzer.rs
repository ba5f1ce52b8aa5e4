//! Prompt analysis: task classification, complexity, language, and urgency.

use claudette_backend::TaskType;
use claudette_core::ChatRequest;
use serde::{Deserialize, Serialize};

/// How soon the caller needs an answer, derived from the request deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

/// The analyzer's verdict on one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task_type: TaskType,
    /// Difficulty estimate in `[0, 1]`.
    pub complexity: f64,
    /// Dominant prompt language as a lowercase ISO code.
    pub language: String,
    pub estimated_tokens: u32,
    pub urgency: Urgency,
    /// How much quality should weigh for this request, in `[0, 1]`.
    pub quality_priority: f64,
}

const CODE_KEYWORDS: &[&str] = &[
    "code", "function", "implement", "debug", "compile", "refactor", "bug", "script", "python",
    "rust", "javascript", "typescript", "java ", "sql", "regex", "api", "函数", "代码", "编程",
];

const MATH_KEYWORDS: &[&str] = &[
    "calculate",
    "equation",
    "integral",
    "derivative",
    "prove",
    "theorem",
    "probability",
    "solve for",
    "arithmetic",
];

const REASONING_KEYWORDS: &[&str] = &[
    "why",
    "explain",
    "reason",
    "step by step",
    "logic",
    "deduce",
    "infer",
    "think through",
];

const ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze",
    "analyse",
    "analysis",
    "compare",
    "evaluate",
    "summarize",
    "summarise",
    "review",
    "assess",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "story", "poem", "song", "creative", "imagine", "fiction", "brainstorm", "slogan",
];

const MULTILINGUAL_KEYWORDS: &[&str] = &["translate", "translation", "翻译"];

/// Classifies a request for the scorer.
pub fn analyze(request: &ChatRequest) -> TaskAnalysis {
    let prompt = &request.prompt;
    let task_type = classify_task(prompt);
    let complexity = complexity(request, task_type);
    TaskAnalysis {
        task_type,
        complexity,
        language: sniff_language(prompt),
        estimated_tokens: request.estimated_tokens(),
        urgency: urgency(request.options.timeout().as_millis() as u64),
        quality_priority: (complexity + 0.3).min(1.0),
    }
}

fn classify_task(prompt: &str) -> TaskType {
    let lower = prompt.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if contains_any(MULTILINGUAL_KEYWORDS) {
        TaskType::Multilingual
    } else if contains_any(CODE_KEYWORDS) || looks_like_code(prompt) {
        TaskType::Code
    } else if contains_any(MATH_KEYWORDS) {
        TaskType::Math
    } else if contains_any(REASONING_KEYWORDS) {
        TaskType::Reasoning
    } else if contains_any(ANALYSIS_KEYWORDS) {
        TaskType::Analysis
    } else if contains_any(CREATIVE_KEYWORDS) {
        TaskType::Creative
    } else {
        TaskType::General
    }
}

/// Structural hints that keyword lists miss: fenced blocks and common
/// definition forms.
fn looks_like_code(prompt: &str) -> bool {
    prompt.contains("```")
        || prompt.contains("fn ")
        || prompt.contains("def ")
        || prompt.contains("class ")
        || prompt.contains("#include")
}

fn complexity(request: &ChatRequest, task_type: TaskType) -> f64 {
    let mut score: f64 = 0.3;
    let len = request.prompt.len();
    if len > 1000 {
        score += 0.2;
    }
    if len > 2000 {
        score += 0.2;
    }
    score += (request.files.len() as f64 * 0.1).min(0.3);
    if matches!(task_type, TaskType::Reasoning | TaskType::Analysis) {
        score += 0.2;
    }
    if task_type == TaskType::Code && request.prompt.to_lowercase().contains("algorithm") {
        score += 0.2;
    }
    score.min(1.0)
}

fn urgency(timeout_ms: u64) -> Urgency {
    if timeout_ms < 30_000 {
        Urgency::High
    } else if timeout_ms < 60_000 {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

/// Unicode-range sniff of the dominant prompt language.
///
/// Kana outranks unified CJK so Japanese prose with kanji still maps to
/// `ja`; everything unrecognized falls back to `en`.
fn sniff_language(prompt: &str) -> String {
    let mut cjk = 0usize;
    let mut kana = 0usize;
    let mut hangul = 0usize;
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;

    for c in prompt.chars() {
        match c as u32 {
            0x4E00..=0x9FFF | 0x3400..=0x4DBF => cjk += 1,
            0x3040..=0x30FF => kana += 1,
            0xAC00..=0xD7AF => hangul += 1,
            0x0400..=0x04FF => cyrillic += 1,
            0x0600..=0x06FF | 0x0750..=0x077F => arabic += 1,
            _ => {}
        }
    }

    let threshold = 3;
    if kana >= threshold {
        "ja".into()
    } else if hangul >= threshold {
        "ko".into()
    } else if cjk >= threshold {
        "zh".into()
    } else if cyrillic >= threshold {
        "ru".into()
    } else if arabic >= threshold {
        "ar".into()
    } else {
        "en".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claudette_core::RequestOptions;

    fn request(prompt: &str) -> ChatRequest {
        ChatRequest::new(prompt)
    }

    #[test]
    fn chinese_code_prompt_is_code_in_zh() {
        let analysis = analyze(&request("写一个 Python 函数反转字符串"));
        assert_eq!(analysis.task_type, TaskType::Code);
        assert_eq!(analysis.language, "zh");
    }

    #[test]
    fn translation_prompts_are_multilingual() {
        let analysis = analyze(&request("Translate this paragraph into French"));
        assert_eq!(analysis.task_type, TaskType::Multilingual);
    }

    #[test]
    fn japanese_kana_beats_kanji() {
        let analysis = analyze(&request("この文章を要約してください。漢字も混ざっています。"));
        assert_eq!(analysis.language, "ja");
    }

    #[test]
    fn russian_is_detected() {
        let analysis = analyze(&request("Объясни, как работает кэш"));
        assert_eq!(analysis.language, "ru");
    }

    #[test]
    fn plain_prompts_default_to_general_english() {
        let analysis = analyze(&request("hello there"));
        assert_eq!(analysis.task_type, TaskType::General);
        assert_eq!(analysis.language, "en");
    }

    #[test]
    fn complexity_grows_with_length_files_and_task() {
        let short = analyze(&request("hello there"));
        assert!((short.complexity - 0.3).abs() < 1e-9);

        let mut long = request(&"x ".repeat(1100));
        long.files.push(claudette_core::FileContext {
            path: "a.rs".into(),
            content: "fn main() {}".into(),
        });
        let analysis = analyze(&long);
        // 0.3 base + 0.2 (>1000) + 0.2 (>2000) + 0.1 (one file)
        assert!((analysis.complexity - 0.8).abs() < 1e-9);

        // 0.3 base + 0.2 for code mentioning "algorithm"
        let algo = analyze(&request("implement a sorting algorithm in Rust"));
        assert!((algo.complexity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn complexity_clamps_at_one() {
        let mut req = request(&format!("analyze this {}", "y".repeat(2500)));
        for i in 0..5 {
            req.files.push(claudette_core::FileContext {
                path: format!("f{i}"),
                content: String::new(),
            });
        }
        let analysis = analyze(&req);
        assert_eq!(analysis.complexity, 1.0);
        assert_eq!(analysis.quality_priority, 1.0);
    }

    #[test]
    fn urgency_from_timeout() {
        let mut req = request("hi");
        req.options = RequestOptions {
            timeout_ms: Some(10_000),
            ..Default::default()
        };
        assert_eq!(analyze(&req).urgency, Urgency::High);

        req.options.timeout_ms = Some(45_000);
        assert_eq!(analyze(&req).urgency, Urgency::Medium);

        req.options.timeout_ms = Some(120_000);
        assert_eq!(analyze(&req).urgency, Urgency::Low);
    }
}
