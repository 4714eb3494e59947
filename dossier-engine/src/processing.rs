//! Prompt construction and response cleanup for the summarization stages.
//!
//! Everything here is pure; the pipeline owns the inference calls.

use crate::types::{Article, SummaryRequest, Tone};
use html2text::render::text_renderer::TrivialDecorator;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::LazyLock;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Longest article text handed to a single extraction call.
const MAX_EXTRACTION_INPUT_CHARS: usize = 4000;
/// Snippet length shown per candidate in the selection prompt.
const SELECTION_SNIPPET_CHARS: usize = 200;
/// html2text line width; output is collapsed to one line anyway.
const RENDER_WIDTH: usize = 2000;

pub const SELECTION_SYSTEM: &str = "You are a news editor choosing which stories make it into a digest. \
Answer only with the numbers of the chosen articles, separated by commas.";

pub const EXTRACTION_SYSTEM: &str = "You extract facts from news articles. Reply with two or three plain \
sentences stating only what happened. No markup, no marketing language, no opinion.";

pub const GENERATION_SYSTEM: &str = "You write email news digests. Your output is inserted directly into \
an HTML email body.";

/// Parse a selection reply into 0-based indices.
///
/// Any separators are accepted. Non-numeric and negative tokens are ignored,
/// 0 and values above `count` are dropped, and repeats keep their first
/// position.
pub fn parse_selection_indices(response: &str, count: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    INTEGER
        .find_iter(response)
        .filter(|m| !m.as_str().starts_with('-'))
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= count)
        .map(|n| n - 1)
        .filter(|&i| seen.insert(i))
        .collect()
}

/// Render HTML to plain text and collapse it onto one line.
pub fn strip_html(text: &str) -> String {
    let rendered = html2text::from_read_with_decorator(text.as_bytes(), RENDER_WIDTH, TrivialDecorator::new());
    WHITESPACE.replace_all(&rendered, " ").trim().to_string()
}

/// Trim the reply and remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    // Opening fence line may carry a language tag such as ```html
    let body = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => return String::new(),
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn selection_prompt(articles: &[Article], pick: usize) -> String {
    let mut prompt = format!(
        "Choose the {} most important articles from the list below. Prefer a diverse mix of topics \
over several stories about the same event.\n\n",
        pick
    );
    for (i, article) in articles.iter().enumerate() {
        let snippet = strip_html(article.best_text());
        let _ = writeln!(
            prompt,
            "{}. {} ({})\n   {}",
            i + 1,
            article.title,
            article.source,
            truncate_chars(&snippet, SELECTION_SNIPPET_CHARS)
        );
    }
    let _ = write!(
        prompt,
        "\nReply with exactly {} numbers between 1 and {}, separated by commas.",
        pick,
        articles.len()
    );
    prompt
}

pub fn extraction_prompt(article: &Article) -> String {
    let body = strip_html(if article.content.trim().is_empty() {
        &article.description
    } else {
        &article.content
    });
    format!(
        "Title: {}\n\nArticle:\n{}\n\nState the key facts of this article in two or three plain sentences.",
        article.title,
        truncate_chars(&body, MAX_EXTRACTION_INPUT_CHARS)
    )
}

/// Per-article material fed into the generation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleFacts {
    pub title: String,
    pub link: String,
    pub source: String,
    pub facts: String,
}

impl ArticleFacts {
    pub fn new(article: &Article, facts: String) -> Self {
        Self {
            title: article.title.clone(),
            link: article.link.clone(),
            source: article.source.clone(),
            facts,
        }
    }

    /// Extraction fallback: the article's own text, verbatim.
    pub fn from_raw(article: &Article) -> Self {
        Self::new(article, article.best_text().to_string())
    }
}

pub fn generation_prompt(tone: &Tone, request: &SummaryRequest, facts: &[ArticleFacts]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Style: {}\n", tone.style_prompt);

    if let Some(language) = &request.language {
        let _ = writeln!(prompt, "Write the entire digest in {}.\n", language);
    }
    if let Some(instructions) = &request.special_instructions {
        let _ = writeln!(prompt, "Reader's instructions: {}\n", instructions);
    }

    prompt.push_str("Today's stories:\n\n");
    for (i, item) in facts.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. {}\n   Link: {}\n   Source: {}\n   Facts: {}\n",
            i + 1,
            item.title,
            item.link,
            item.source,
            item.facts
        );
    }

    prompt.push_str(
        "Write the digest as flowing prose in a few paragraphs, not as a bulleted list. \
Link each story inline with <a href=\"...\">...</a> using the links above. \
Output HTML-safe text only: paragraphs in <p> tags, no <html>, <head> or <body>, no Markdown.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tones::fallback_tone;
    use chrono::Utc;
    use uuid::Uuid;

    fn article(title: &str, description: &str, content: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            source: "https://news.example.com/rss".to_string(),
            title: title.to_string(),
            link: format!("https://news.example.com/{}", title.to_lowercase().replace(' ', "-")),
            description: description.to_string(),
            content: content.to_string(),
            author: String::new(),
            published_at: Utc::now(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn selection_parser_converts_to_zero_based() {
        assert_eq!(parse_selection_indices("1, 3, 5", 10), vec![0, 2, 4]);
        assert_eq!(parse_selection_indices("[2 4\n6;8]", 10), vec![1, 3, 5, 7]);
    }

    #[test]
    fn selection_parser_handles_empty_input() {
        assert!(parse_selection_indices("", 10).is_empty());
        assert!(parse_selection_indices("   ", 10).is_empty());
        assert!(parse_selection_indices("1, 2, 3", 0).is_empty());
    }

    #[test]
    fn selection_parser_drops_out_of_range_and_zero() {
        assert_eq!(parse_selection_indices("0, 1, 11, 10, 999999", 10), vec![0, 9]);
        assert_eq!(parse_selection_indices("99999999999999999999999", 10), Vec::<usize>::new());
    }

    #[test]
    fn selection_parser_ignores_non_numeric_and_negative() {
        assert_eq!(parse_selection_indices("I pick article three and -2, then 4.", 10), vec![3]);
        assert!(parse_selection_indices("none of these", 10).is_empty());
        assert_eq!(parse_selection_indices("-1 -5 2", 10), vec![1]);
    }

    #[test]
    fn selection_parser_removes_duplicates_in_order() {
        assert_eq!(parse_selection_indices("3, 1, 3, 2, 1", 5), vec![2, 0, 1]);
    }

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            strip_html("<p>Rust&nbsp;1.80 &amp; <b>LazyLock</b></p>\n\n<br/>"),
            "Rust 1.80 & LazyLock"
        );
        assert_eq!(strip_html("plain"), "plain");
        assert_eq!(
            strip_html("<p>It&#8217;s official &mdash; <i>rates</i> rise</p>"),
            "It\u{2019}s official \u{2014} rates rise"
        );
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fences("```html\n<p>Hi</p>\n```"), "<p>Hi</p>");
        assert_eq!(strip_code_fences("```\n<p>Hi</p>```  "), "<p>Hi</p>");
        assert_eq!(strip_code_fences("  <p>Hi</p>\n"), "<p>Hi</p>");
        assert_eq!(strip_code_fences("```"), "");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn raw_facts_prefer_description() {
        let a = article("First", "Short description", "<p>Long content</p>");
        assert_eq!(ArticleFacts::from_raw(&a).facts, "Short description");

        let b = article("Second", "", "Only content");
        assert_eq!(ArticleFacts::from_raw(&b).facts, "Only content");
    }

    #[test]
    fn selection_prompt_numbers_from_one() {
        let articles = vec![article("Alpha", "a", ""), article("Beta", "b", "")];
        let prompt = selection_prompt(&articles, 1);
        assert!(prompt.contains("1. Alpha"));
        assert!(prompt.contains("2. Beta"));
        assert!(prompt.contains("between 1 and 2"));
    }

    #[test]
    fn generation_prompt_includes_optional_directives() {
        let tone = fallback_tone();
        let facts = vec![ArticleFacts::from_raw(&article("Alpha", "Something happened", ""))];

        let request = SummaryRequest {
            tone: tone.name.clone(),
            language: Some("German".to_string()),
            special_instructions: Some("Skip sports".to_string()),
        };
        let prompt = generation_prompt(&tone, &request, &facts);
        assert!(prompt.contains(&tone.style_prompt));
        assert!(prompt.contains("Write the entire digest in German."));
        assert!(prompt.contains("Skip sports"));
        assert!(prompt.contains("https://news.example.com/alpha"));

        let bare = SummaryRequest {
            tone: tone.name.clone(),
            language: None,
            special_instructions: None,
        };
        let prompt = generation_prompt(&tone, &bare, &facts);
        assert!(!prompt.contains("Write the entire digest in"));
        assert!(!prompt.contains("Reader's instructions"));
    }
}
