//! Renders a generated summary and its articles into one email.

use chrono::{DateTime, Utc};
use html2text::render::text_renderer::TrivialDecorator;
use interfaces::defs::{DigestMessage, DossierConfig, Summary};
use interfaces::{DossierError, Result};
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;
use url::Url;

/// Card descriptions are cut to this many characters.
pub const DESCRIPTION_LIMIT: usize = 300;
pub const TEST_SUBJECT_PREFIX: &str = "[TEST] ";
/// Line width handed to html2text. Wide enough that URLs are never wrapped.
const PLAIN_TEXT_WIDTH: usize = 2000;

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Regular,
    /// Manual preview: subject carries the test marker.
    Test,
}

/// Build subject, HTML and plain-text bodies for one digest.
///
/// `summary.text` is trusted model output and is embedded as-is; everything
/// taken from feeds or the configuration is escaped. The header names the
/// tone the summary was actually written in.
pub fn compose_digest(
    config: &DossierConfig,
    summary: &Summary,
    generated_at: DateTime<Utc>,
    mode: DeliveryMode,
) -> Result<DigestMessage> {
    if summary.text.trim().is_empty() {
        return Err(DossierError::Template("summary is empty".to_string()));
    }

    let subject = subject_line(config, generated_at, mode);
    let html = render_html(config, summary, generated_at)
        .map_err(|e| DossierError::Template(format!("html body: {}", e)))?;
    let text = render_text(config, summary, generated_at)
        .map_err(|e| DossierError::Template(format!("text body: {}", e)))?;

    Ok(DigestMessage {
        recipient: config.recipient.clone(),
        subject,
        html,
        text,
    })
}

pub fn subject_line(config: &DossierConfig, generated_at: DateTime<Utc>, mode: DeliveryMode) -> String {
    let date = generated_at.with_timezone(&config.timezone).format("%B %-d, %Y");
    let subject = format!("{} - {}", config.title, date);
    match mode {
        DeliveryMode::Regular => subject,
        DeliveryMode::Test => format!("{}{}", TEST_SUBJECT_PREFIX, subject),
    }
}

struct Header {
    generated: String,
    article_count: usize,
    tone: String,
    language: String,
}

impl Header {
    fn new(config: &DossierConfig, summary: &Summary, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated: generated_at
                .with_timezone(&config.timezone)
                .format("%B %-d, %Y at %H:%M %Z")
                .to_string(),
            article_count: summary.articles.len(),
            tone: summary.tone.clone(),
            language: config.language.clone().unwrap_or_else(|| "English".to_string()),
        }
    }
}

fn render_html(
    config: &DossierConfig,
    summary: &Summary,
    generated_at: DateTime<Utc>,
) -> std::result::Result<String, std::fmt::Error> {
    let header = Header::new(config, summary, generated_at);
    let articles = &summary.articles;
    let summary = summary.text.trim();
    let mut out = String::with_capacity(summary.len() + articles.len() * 512 + 2048);

    write!(
        out,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
<body style=\"margin:0;padding:0;background:#f4f4f5;font-family:Georgia,serif;color:#1f2933;\">\n\
<div style=\"max-width:640px;margin:0 auto;padding:24px;background:#ffffff;\">\n\
<h1 style=\"margin:0 0 8px;font-size:26px;\">{title}</h1>\n\
<p style=\"margin:0 0 16px;font-size:13px;color:#6b7280;\">{generated} &middot; {count} articles &middot; Tone: {tone} &middot; Language: {language}</p>\n",
        title = escape_html(&config.title),
        generated = escape_html(&header.generated),
        count = header.article_count,
        tone = escape_html(&header.tone),
        language = escape_html(&header.language),
    )?;

    if let Some(instructions) = &config.special_instructions {
        write!(
            out,
            "<p style=\"margin:0 0 16px;padding:8px 12px;background:#fef9c3;font-size:13px;\">Special instructions: {}</p>\n",
            escape_html(instructions)
        )?;
    }

    write!(out, "<div style=\"font-size:16px;line-height:1.6;\">\n{}\n</div>\n", summary)?;

    if !articles.is_empty() {
        out.push_str("<h2 style=\"margin:32px 0 12px;font-size:18px;\">Sources</h2>\n");
    }
    for article in articles {
        write!(
            out,
            "<div style=\"margin:0 0 12px;padding:12px;border:1px solid #e5e7eb;border-radius:6px;\">\n\
<a href=\"{link}\" style=\"font-weight:bold;color:#1d4ed8;text-decoration:none;\">{title}</a>\n\
<p style=\"margin:4px 0;font-size:12px;color:#6b7280;\">{domain} &middot; {published}</p>\n",
            link = escape_html(&article.link),
            title = escape_html(&article.title),
            domain = escape_html(&source_domain(&article.link)),
            published = article.published_at.with_timezone(&config.timezone).format("%b %-d, %Y"),
        )?;

        let description = card_description(article.best_text());
        if !description.is_empty() {
            write!(out, "<p style=\"margin:4px 0 0;font-size:14px;\">{}</p>\n", escape_html(&description))?;
        }
        out.push_str("</div>\n");
    }

    out.push_str("</div>\n</body>\n</html>\n");
    Ok(out)
}

fn render_text(
    config: &DossierConfig,
    summary: &Summary,
    generated_at: DateTime<Utc>,
) -> std::result::Result<String, std::fmt::Error> {
    let header = Header::new(config, summary, generated_at);
    let articles = &summary.articles;
    let mut out = String::new();

    writeln!(out, "{}", config.title)?;
    writeln!(out, "{}", "=".repeat(config.title.chars().count()))?;
    writeln!(
        out,
        "{} | {} articles | Tone: {} | Language: {}",
        header.generated, header.article_count, header.tone, header.language
    )?;
    if let Some(instructions) = &config.special_instructions {
        writeln!(out, "Special instructions: {}", instructions)?;
    }
    writeln!(out)?;
    writeln!(out, "{}", html_to_text(&summary.text))?;

    if !articles.is_empty() {
        writeln!(out, "\nSources\n-------")?;
    }
    for article in articles {
        writeln!(out, "\n* {}", article.title)?;
        writeln!(
            out,
            "  {} | {}",
            source_domain(&article.link),
            article.published_at.with_timezone(&config.timezone).format("%b %-d, %Y")
        )?;
        writeln!(out, "  {}", article.link)?;
        let description = card_description(article.best_text());
        if !description.is_empty() {
            writeln!(out, "  {}", description)?;
        }
    }

    Ok(out)
}

/// Host of `link` without scheme, path or a leading `www.`.
pub fn source_domain(link: &str) -> String {
    let host = match Url::parse(link) {
        Ok(url) => url.host_str().map(str::to_string),
        Err(_) => None,
    };
    let host = host.unwrap_or_else(|| {
        let without_scheme = link.split_once("://").map(|(_, rest)| rest).unwrap_or(link);
        without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_string()
    });
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Plain description for an article card: rendered to text, whitespace
/// collapsed, cut at `DESCRIPTION_LIMIT` characters.
pub fn card_description(raw: &str) -> String {
    let plain = plain_text(raw);
    let collapsed = WHITESPACE.replace_all(&plain, " ").trim().to_string();
    match collapsed.char_indices().nth(DESCRIPTION_LIMIT) {
        Some((idx, _)) => format!("{}...", collapsed[..idx].trim_end()),
        None => collapsed,
    }
}

/// Plain-text rendering of the generated summary. Links become `text (url)`.
pub fn html_to_text(html: &str) -> String {
    let linked = LINK.replace_all(html, "$2 ($1)");
    plain_text(&linked)
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn plain_text(html: &str) -> String {
    html2text::from_read_with_decorator(html.as_bytes(), PLAIN_TEXT_WIDTH, TrivialDecorator::new())
        .replace('\u{a0}', " ")
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use interfaces::defs::{Article, Frequency};
    use uuid::Uuid;

    fn config() -> DossierConfig {
        DossierConfig {
            id: Uuid::new_v4(),
            title: "Tech & Markets".to_string(),
            recipient: "reader@example.com".to_string(),
            feed_urls: vec!["https://www.example.com/rss".to_string()],
            target_count: 10,
            frequency: Frequency::Daily,
            delivery_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            timezone: chrono_tz::America::New_York,
            tone: "witty".to_string(),
            language: None,
            special_instructions: Some("No <crypto> please".to_string()),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn article(title: &str, link: &str, description: &str) -> Article {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        Article {
            id: Uuid::new_v4(),
            source: "https://www.example.com/rss".to_string(),
            title: title.to_string(),
            link: link.to_string(),
            description: description.to_string(),
            content: String::new(),
            author: String::new(),
            published_at: at,
            fetched_at: at,
        }
    }

    fn summary(text: &str, articles: Vec<Article>) -> Summary {
        Summary {
            text: text.to_string(),
            articles,
            model: "llama3.1:8b".to_string(),
            tone: "witty".to_string(),
        }
    }

    fn generated_at() -> DateTime<Utc> {
        // 2024-03-05 02:30 UTC is still March 4 in New York.
        Utc.with_ymd_and_hms(2024, 3, 5, 2, 30, 0).unwrap()
    }

    #[test]
    fn subject_uses_config_timezone_date() {
        let c = config();
        assert_eq!(subject_line(&c, generated_at(), DeliveryMode::Regular), "Tech & Markets - March 4, 2024");
        assert_eq!(
            subject_line(&c, generated_at(), DeliveryMode::Test),
            "[TEST] Tech & Markets - March 4, 2024"
        );
    }

    #[test]
    fn composes_both_parts() {
        let articles = vec![article(
            "Chips <up>",
            "https://www.news.example.org/markets/chips?id=1",
            "<p>Shares   rose\nsharply.</p>",
        )];
        let text = "<p>Markets rallied, see <a href=\"https://news.example.org/a\">the report</a>.</p>";
        let message =
            compose_digest(&config(), &summary(text, articles), generated_at(), DeliveryMode::Regular).unwrap();

        assert_eq!(message.recipient, "reader@example.com");
        assert!(message.html.contains(text));
        assert!(message.html.contains("Tech &amp; Markets"));
        assert!(message.html.contains("Chips &lt;up&gt;"));
        assert!(message.html.contains("No &lt;crypto&gt; please"));
        assert!(message.html.contains("news.example.org &middot; Mar 4, 2024"));
        assert!(message.html.contains("Shares rose sharply."));
        assert!(message.html.contains("1 articles"));
        assert!(message.html.contains("Language: English"));

        assert!(message.text.contains("Markets rallied, see the report (https://news.example.org/a)."));
        assert!(message.text.contains("* Chips <up>"));
        assert!(!message.text.contains("<p>"));
    }

    #[test]
    fn empty_summary_is_a_template_error() {
        let err = compose_digest(&config(), &summary("  \n ", vec![]), generated_at(), DeliveryMode::Regular)
            .unwrap_err();
        assert!(matches!(err, DossierError::Template(_)));
    }

    #[test]
    fn header_names_the_tone_actually_used() {
        let mut c = config();
        c.tone = "no-such-tone".to_string();
        let mut s = summary("<p>Quiet day.</p>", vec![]);
        s.tone = "professional".to_string();

        let message = compose_digest(&c, &s, generated_at(), DeliveryMode::Regular).unwrap();
        assert!(message.html.contains("Tone: professional"));
        assert!(message.text.contains("Tone: professional"));
        assert!(!message.html.contains("no-such-tone"));
    }

    #[test]
    fn feed_entities_are_decoded_once() {
        let raw = "<p>It&#8217;s official &mdash; rates rise</p>";
        assert_eq!(card_description(raw), "It\u{2019}s official \u{2014} rates rise");

        let articles = vec![article("Rates", "https://example.com/rates", raw)];
        let message = compose_digest(
            &config(),
            &summary("<p>Rates &amp; bonds moved.</p>", articles),
            generated_at(),
            DeliveryMode::Regular,
        )
        .unwrap();

        assert!(message.html.contains("It\u{2019}s official \u{2014} rates rise"));
        assert!(!message.html.contains("&amp;#8217;"));
        assert!(!message.html.contains("&amp;mdash;"));
        assert!(message.text.contains("It\u{2019}s official \u{2014} rates rise"));
        assert!(message.text.contains("Rates & bonds moved."));
    }

    #[test]
    fn domain_drops_scheme_www_and_path() {
        assert_eq!(source_domain("https://www.bbc.co.uk/news/world-123"), "bbc.co.uk");
        assert_eq!(source_domain("http://example.com"), "example.com");
        assert_eq!(source_domain("https://blog.example.com:8443/x"), "blog.example.com");
        assert_eq!(source_domain("www.example.net/path"), "example.net");
    }

    #[test]
    fn description_is_truncated_on_char_boundary() {
        let long = "é".repeat(400);
        let cut = card_description(&long);
        assert_eq!(cut.chars().count(), DESCRIPTION_LIMIT + 3);
        assert!(cut.ends_with("..."));

        assert_eq!(card_description("<b>short</b>  text"), "short text");
        assert_eq!(card_description("AT&T&nbsp;shares"), "AT&T shares");
    }

    #[test]
    fn html_to_text_keeps_paragraphs_and_links() {
        let text = html_to_text(
            "<p>First <a class=\"x\" href='https://a.example.com'>story</a>.</p>\n<p>Second&nbsp;line<br>third &amp; last</p>",
        );
        assert_eq!(text, "First story (https://a.example.com).\n\nSecond line\nthird & last");
    }

    #[test]
    fn escapes_all_special_characters() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
