//! Response-Uniqueness Filter (C5, spec §4.5).
//!
//! Grounded on `advanced_anti_repetition.py`: SHA-256 content signatures,
//! a 7-slot per-user ring, an adaptive similarity threshold, and a lazy
//! cleanup sweep. Realized as the `SimilarityEngine` capability interface
//! (spec §9 redesign note) with one real implementation and a no-op stub,
//! the same trait-with-a-stub pattern the teacher uses for swappable
//! caching backends in `cache.rs`.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

const RING_CAPACITY: usize = 7;
const RECENT_WINDOW: usize = 3;
const BASE_THRESHOLD: f64 = 0.75;
const MAX_THRESHOLD: f64 = 0.85;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);
const INACTIVE_TIMEOUT: Duration = Duration::from_secs(3600);
const MAX_SIGNATURE_CACHE: usize = 1000;
const MAX_VOCABULARY: usize = 100;

#[derive(Debug, Clone)]
pub struct ResponseSignature {
    pub content_hash: String,
    pub word_set: HashSet<String>,
    pub key_phrases: Vec<(String, String)>,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone)]
struct ConversationContext {
    topic_keywords: HashSet<String>,
    sentiment: Sentiment,
    complexity: f64,
}

#[derive(Debug, Clone)]
struct UserPatterns {
    avg_response_length: f64,
    preferred_vocabulary: Vec<String>,
    interaction_frequency: f64,
    last_interaction: Option<Instant>,
}

impl Default for UserPatterns {
    fn default() -> Self {
        Self {
            avg_response_length: 50.0,
            preferred_vocabulary: Vec::new(),
            interaction_frequency: 0.0,
            last_interaction: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub should_enhance: bool,
    pub reason: &'static str,
    pub hints: Vec<&'static str>,
}

impl Decision {
    fn no() -> Self {
        Self::default()
    }

    fn yes(reason: &'static str, hints: &[&'static str]) -> Self {
        Self {
            should_enhance: true,
            reason,
            hints: hints.to_vec(),
        }
    }
}

/// Capability interface so the router/assembler can be built against either
/// the real algorithm or a stand-in with no behavior (spec §9).
pub trait SimilarityEngine: Send + Sync {
    fn should_enhance(&self, user_id: &str, candidate_text: &str) -> Decision;
    fn enhance_system_prompt(&self, user_id: &str, base_prompt: &str) -> String;
    fn record_response(&self, user_id: &str, reply_text: &str);
}

/// Stands in for the legacy engine referenced but absent from the source
/// material: always reports uniqueness and never touches the prompt.
pub struct NoopSimilarityEngine;

impl SimilarityEngine for NoopSimilarityEngine {
    fn should_enhance(&self, _user_id: &str, _candidate_text: &str) -> Decision {
        Decision::no()
    }

    fn enhance_system_prompt(&self, _user_id: &str, base_prompt: &str) -> String {
        base_prompt.to_string()
    }

    fn record_response(&self, _user_id: &str, _reply_text: &str) {}
}

struct PerUserState {
    signatures: VecDeque<ResponseSignature>,
    context: Option<ConversationContext>,
    patterns: UserPatterns,
}

impl Default for PerUserState {
    fn default() -> Self {
        Self {
            signatures: VecDeque::with_capacity(RING_CAPACITY),
            context: None,
            patterns: UserPatterns::default(),
        }
    }
}

/// The real algorithm, grounded on `AdvancedAntiRepetitionManager`.
pub struct AdvancedSimilarityEngine {
    state: std::sync::Mutex<Inner>,
}

struct Inner {
    users: HashMap<String, PerUserState>,
    signature_cache: HashMap<String, ResponseSignature>,
    last_cleanup: Instant,
}

impl Default for AdvancedSimilarityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvancedSimilarityEngine {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(Inner {
                users: HashMap::new(),
                signature_cache: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }
}

fn tokenize(content: &str) -> Vec<String> {
    content
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

fn create_signature(content: &str) -> ResponseSignature {
    let content_hash = format!("{:x}", Sha256::digest(content.as_bytes()));
    let tokens = tokenize(content);
    let word_set: HashSet<String> = tokens.iter().cloned().collect();

    let mut words: Vec<&String> = word_set.iter().collect();
    words.sort();
    let mut phrases: HashSet<(String, String)> = HashSet::new();
    if words.len() >= 2 {
        for i in 0..std::cmp::min(5, words.len() - 1) {
            let mut pair = [words[i].clone(), words[i + 1].clone()];
            pair.sort();
            let [a, b] = pair;
            phrases.insert((a, b));
        }
    }
    let key_phrases: Vec<(String, String)> = phrases.into_iter().take(5).collect();

    ResponseSignature {
        content_hash,
        word_set,
        key_phrases,
        length: content.split_whitespace().count(),
    }
}

fn semantic_similarity(a: &ResponseSignature, b: &ResponseSignature) -> f64 {
    let intersection = a.word_set.intersection(&b.word_set).count() as f64;
    let union = a.word_set.union(&b.word_set).count() as f64;
    let word_similarity = if union > 0.0 { intersection / union } else { 0.0 };

    let phrase_bonus = if !a.key_phrases.is_empty() && !b.key_phrases.is_empty() {
        let a_phrases: HashSet<&(String, String)> = a.key_phrases.iter().collect();
        let b_phrases: HashSet<&(String, String)> = b.key_phrases.iter().collect();
        let overlap = a_phrases.intersection(&b_phrases).count() as f64;
        let denom = std::cmp::max(a.key_phrases.len(), b.key_phrases.len()) as f64;
        (overlap / denom) * 0.2
    } else {
        0.0
    };

    let max_len = std::cmp::max(std::cmp::max(a.length, b.length), 1) as f64;
    let length_diff = (a.length as f64 - b.length as f64).abs() / max_len;
    let length_bonus = (1.0 - length_diff) * 0.1;

    (word_similarity + phrase_bonus + length_bonus).min(1.0)
}

const POSITIVE_WORDS: &[&str] = &["good", "great", "awesome", "nice", "love", "happy", "excellent"];
const NEGATIVE_WORDS: &[&str] = &["bad", "terrible", "hate", "awful", "sad", "angry", "worst"];

fn detect_sentiment(tokens: &HashSet<String>) -> Sentiment {
    if POSITIVE_WORDS.iter().any(|w| tokens.contains(*w)) {
        Sentiment::Positive
    } else if NEGATIVE_WORDS.iter().any(|w| tokens.contains(*w)) {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

impl Inner {
    fn cleanup_if_needed(&mut self) {
        if self.last_cleanup.elapsed() < CLEANUP_INTERVAL {
            return;
        }

        if self.signature_cache.len() > MAX_SIGNATURE_CACHE {
            let live_hashes: HashSet<String> = self
                .users
                .values()
                .flat_map(|u| u.signatures.iter().map(|s| s.content_hash.clone()))
                .collect();
            self.signature_cache.retain(|h, _| live_hashes.contains(h));
        }

        self.users
            .retain(|_, u| match u.patterns.last_interaction {
                Some(t) => t.elapsed() < INACTIVE_TIMEOUT,
                None => true,
            });

        self.last_cleanup = Instant::now();
    }
}

impl SimilarityEngine for AdvancedSimilarityEngine {
    fn should_enhance(&self, user_id: &str, candidate_text: &str) -> Decision {
        if candidate_text.trim().split_whitespace().count() < 4 {
            return Decision::no();
        }

        let mut inner = self.state.lock().unwrap();
        let signature = inner
            .signature_cache
            .entry(format!("{:x}", Sha256::digest(candidate_text.as_bytes())))
            .or_insert_with(|| create_signature(candidate_text))
            .clone();

        let user = inner.users.entry(user_id.to_string()).or_default();

        if user
            .signatures
            .iter()
            .any(|s| s.content_hash == signature.content_hash)
        {
            return Decision::yes(
                "exact repetition",
                &["Vary phrasing completely", "Use different vocabulary"],
            );
        }

        let threshold = adaptive_threshold(user);
        let recent: Vec<&ResponseSignature> = user
            .signatures
            .iter()
            .rev()
            .take(RECENT_WINDOW)
            .collect();

        let mut max_similarity = 0.0f64;
        for recent_sig in &recent {
            let similarity = semantic_similarity(&signature, recent_sig);
            if similarity > max_similarity {
                max_similarity = similarity;
            }
            if similarity >= threshold {
                return Decision::yes(
                    "semantic similarity",
                    &[
                        "Introduce new concepts",
                        "Change sentence structure",
                        "Use different examples",
                    ],
                );
            }
        }

        if user.context.is_some() {
            let topic_keywords: HashSet<String> = signature
                .word_set
                .iter()
                .filter(|w| w.len() > 3)
                .cloned()
                .collect();
            for recent_sig in &recent {
                if topic_keywords.is_empty() {
                    continue;
                }
                let overlap = topic_keywords.intersection(&recent_sig.word_set).count() as f64
                    / topic_keywords.len().max(1) as f64;
                if overlap > 0.4
                    && signature.length == recent_sig.length
                    && semantic_similarity(&signature, recent_sig) > 0.65
                {
                    return Decision::yes(
                        "conceptual repetition",
                        &["Shift focus slightly", "Add new perspective", "Introduce contrast"],
                    );
                }
            }
        }

        Decision::no()
    }

    fn enhance_system_prompt(&self, user_id: &str, base_prompt: &str) -> String {
        let inner = self.state.lock().unwrap();
        let Some(user) = inner.users.get(user_id) else {
            return base_prompt.to_string();
        };

        let has_vocabulary = user.patterns.preferred_vocabulary.len() >= 10;
        let has_length_signal = user.patterns.avg_response_length >= 20.0;
        let has_sentiment = user
            .context
            .as_ref()
            .is_some_and(|c| c.sentiment != Sentiment::Neutral);
        let has_history = user.signatures.len() >= 3;

        if !has_vocabulary && !has_length_signal && !has_sentiment && !has_history {
            return base_prompt.to_string();
        }

        let mut hints = Vec::new();
        if has_vocabulary {
            let sample: Vec<&str> = user
                .patterns
                .preferred_vocabulary
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            hints.push(format!(
                "Consider using varied vocabulary beyond: {}",
                sample.join(", ")
            ));
        }
        if has_length_signal {
            hints.push(format!(
                "Vary response length from your usual {:.0} words",
                user.patterns.avg_response_length
            ));
        }
        if let Some(context) = &user.context {
            if context.sentiment != Sentiment::Neutral {
                let tone = match context.sentiment {
                    Sentiment::Positive => "positive",
                    Sentiment::Negative => "negative",
                    Sentiment::Neutral => unreachable!(),
                };
                hints.push(format!("Vary your {tone} tone with fresh perspectives"));
            }
            if context.complexity > 0.7 {
                hints.push("Introduce simpler concepts alongside complex ones".to_string());
            }
        }
        if has_history {
            hints.push("Bring fresh insights to this ongoing conversation".to_string());
        }

        if hints.is_empty() {
            return base_prompt.to_string();
        }

        let guidance: String = hints.iter().map(|h| format!("- {h}\n")).collect();
        format!("{base_prompt}\n\n**Internal Guidance:**\n{}", guidance.trim_end())
    }

    fn record_response(&self, user_id: &str, reply_text: &str) {
        let mut inner = self.state.lock().unwrap();
        let signature = create_signature(reply_text);
        inner
            .signature_cache
            .insert(signature.content_hash.clone(), signature.clone());

        let tokens: HashSet<String> = tokenize(reply_text).into_iter().collect();
        let sentiment = detect_sentiment(&tokens);
        let meaningful: HashSet<String> = tokens.iter().filter(|w| w.len() > 3).cloned().collect();
        let total_words = reply_text.split_whitespace().count().max(1);
        let complexity = (meaningful.len() as f64 / total_words as f64).min(1.0);
        let topic_keywords: HashSet<String> = meaningful.iter().take(10).cloned().collect();

        let user = inner.users.entry(user_id.to_string()).or_default();

        if user.signatures.len() >= RING_CAPACITY {
            user.signatures.pop_front();
        }
        user.signatures.push_back(signature);

        user.context = Some(ConversationContext {
            topic_keywords,
            sentiment,
            complexity,
        });

        let response_length = reply_text.split_whitespace().count() as f64;
        user.patterns.avg_response_length =
            user.patterns.avg_response_length * 0.8 + response_length * 0.2;

        let new_vocab: HashSet<String> = tokens.into_iter().filter(|w| w.len() > 4).collect();
        for word in new_vocab {
            if !user.patterns.preferred_vocabulary.contains(&word) {
                user.patterns.preferred_vocabulary.push(word);
            }
        }
        if user.patterns.preferred_vocabulary.len() > MAX_VOCABULARY {
            let overflow = user.patterns.preferred_vocabulary.len() - MAX_VOCABULARY;
            user.patterns.preferred_vocabulary.drain(0..overflow);
        }

        if let Some(last) = user.patterns.last_interaction {
            let time_diff = last.elapsed().as_secs_f64().max(1.0);
            user.patterns.interaction_frequency =
                user.patterns.interaction_frequency * 0.9 + (1.0 / time_diff) * 0.1;
        }
        user.patterns.last_interaction = Some(Instant::now());

        inner.cleanup_if_needed();
    }
}

fn adaptive_threshold(user: &PerUserState) -> f64 {
    let mut threshold = BASE_THRESHOLD;
    if user.patterns.interaction_frequency > 0.1 {
        threshold += 0.05;
    }
    if let Some(context) = &user.context {
        if context.complexity > 0.7 {
            threshold += 0.05;
        }
    }
    if user.patterns.preferred_vocabulary.len() > 50 {
        threshold += 0.03;
    }
    threshold.min(MAX_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_candidates_are_never_flagged() {
        let engine = AdvancedSimilarityEngine::new();
        let decision = engine.should_enhance("u1", "ok sure");
        assert!(!decision.should_enhance);
    }

    #[test]
    fn exact_repeat_is_flagged() {
        let engine = AdvancedSimilarityEngine::new();
        let text = "the quick brown fox jumps over the lazy dog";
        engine.record_response("u1", text);
        let decision = engine.should_enhance("u1", text);
        assert!(decision.should_enhance);
        assert_eq!(decision.reason, "exact repetition");
    }

    #[test]
    fn distinct_replies_are_not_flagged() {
        let engine = AdvancedSimilarityEngine::new();
        engine.record_response("u1", "the weather today is sunny and warm outside");
        let decision =
            engine.should_enhance("u1", "quantum computing relies on superposition and entanglement");
        assert!(!decision.should_enhance);
    }

    #[test]
    fn noop_engine_never_flags_and_passes_prompt_through() {
        let engine = NoopSimilarityEngine;
        engine.record_response("u1", "anything at all here");
        let decision = engine.should_enhance("u1", "anything at all here");
        assert!(!decision.should_enhance);
        assert_eq!(engine.enhance_system_prompt("u1", "base"), "base");
    }

    #[test]
    fn enhance_system_prompt_is_unchanged_without_history() {
        let engine = AdvancedSimilarityEngine::new();
        assert_eq!(engine.enhance_system_prompt("new-user", "base prompt"), "base prompt");
    }
}
