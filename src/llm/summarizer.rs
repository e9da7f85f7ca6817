//! Extractive summarization under a token budget.
//!
//! Sentences are scored by the average document frequency of their content
//! words, the best ones are kept until the budget is spent, and the survivors
//! are emitted in their original order.

use std::collections::HashMap;

use serde::Serialize;

use super::token_counter::TokenCounter;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "i", "if", "in", "into", "is", "it", "its", "of", "on", "or", "our", "she",
    "so", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "was",
    "we", "were", "which", "while", "will", "with", "you", "your",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub text: String,
    pub sentences_used: usize,
    pub token_count: usize,
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, documents: &[&str], token_budget: usize) -> Summary;
}

pub struct ExtractiveSummarizer<C> {
    counter: C,
}

impl<C: TokenCounter> ExtractiveSummarizer<C> {
    pub fn new(counter: C) -> Self {
        Self { counter }
    }
}

/// Split on sentence terminators and newlines, dropping fragments of one char.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.chars().count() > 1 {
        out.push(trimmed.to_string());
    }
    current.clear();
}

fn content_words(sentence: &str) -> impl Iterator<Item = String> + '_ {
    crate::embedding::hashing::tokens(sentence).filter(|w| !STOPWORDS.contains(&w.as_str()))
}

impl<C: TokenCounter> Summarizer for ExtractiveSummarizer<C> {
    fn summarize(&self, documents: &[&str], token_budget: usize) -> Summary {
        let sentences: Vec<String> = documents.iter().flat_map(|d| split_sentences(d)).collect();
        if sentences.is_empty() || token_budget == 0 {
            return Summary::default();
        }

        let mut freq: HashMap<String, usize> = HashMap::new();
        for s in &sentences {
            for w in content_words(s) {
                *freq.entry(w).or_default() += 1;
            }
        }

        let mut scored: Vec<(usize, f64)> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let words: Vec<String> = content_words(s).collect();
                let score = if words.is_empty() {
                    0.0
                } else {
                    words.iter().map(|w| freq[w] as f64).sum::<f64>() / words.len() as f64
                };
                (i, score)
            })
            .collect();
        // Highest score first; earlier sentences win ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut chosen: Vec<usize> = Vec::new();
        let mut spent = 0usize;
        for (i, _) in scored {
            // Charge the joining space too so the joined text stays in budget.
            let cost = self.counter.count(&format!("{} ", sentences[i]));
            if spent + cost <= token_budget {
                spent += cost;
                chosen.push(i);
            }
        }
        chosen.sort_unstable();

        let text = chosen
            .iter()
            .map(|&i| sentences[i].as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Summary {
            token_count: self.counter.count(&text),
            sentences_used: chosen.len(),
            text,
        }
    }
}
