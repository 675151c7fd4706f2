//! Digest rendering — combine events for one subscription into one message
//!
//! Pure and stateless: the same input yields identical output, except for
//! the per-call MIME boundary. Empty input produces a degenerate but valid
//! document so dry-run inspection always has something to show.

use crate::types::{AggregationMethod, Event, EventType};

/// Excerpt length when an event has no subject line
const EXCERPT_LEN: usize = 60;

/// A rendered digest ready for a delivery provider
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Default subject; callers may override with the subscription's
    /// `aggregated_message_subject`
    pub subject: String,

    pub body: String,

    /// Full MIME content-type line (for MIME bodies this carries the
    /// boundary parameter)
    pub content_type: String,
}

/// Render `events` for `user_id` in the requested format
pub fn render(user_id: &str, events: &[Event], method: AggregationMethod) -> Rendered {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });

    let subject = format!("Event Summary for User {}", user_id);

    match method {
        AggregationMethod::Plain => Rendered {
            subject,
            body: render_plain(user_id, &sorted),
            content_type: "text/plain; charset=utf-8".to_string(),
        },
        AggregationMethod::Html => Rendered {
            subject,
            body: render_html(user_id, &sorted),
            content_type: "text/html; charset=utf-8".to_string(),
        },
        AggregationMethod::Mime => {
            let boundary = format!("=_herald_{}", uuid::Uuid::new_v4().simple());
            Rendered {
                subject,
                body: render_mime(user_id, &sorted, &boundary),
                content_type: format!("multipart/mixed; boundary=\"{}\"", boundary),
            }
        }
    }
}

/// One-line listing entry: `HH:MM - <subject or message excerpt>`
fn listing_line(event: &Event) -> String {
    let label = if event.subject.is_empty() {
        let mut excerpt: String = event.message.chars().take(EXCERPT_LEN).collect();
        if event.message.chars().count() > EXCERPT_LEN {
            excerpt.push_str("...");
        }
        excerpt
    } else {
        event.subject.clone()
    };
    format!("{} - {}", event.timestamp.format("%H:%M"), label)
}

/// Events of one type, in input (already sorted) order
fn of_type<'a>(sorted: &[&'a Event], event_type: EventType) -> Vec<&'a Event> {
    sorted
        .iter()
        .filter(|e| e.event_type == event_type)
        .copied()
        .collect()
}

fn date_range(sorted: &[&Event]) -> String {
    match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => format!(
            "{} to {} UTC",
            first.timestamp.format("%Y-%m-%d %H:%M"),
            last.timestamp.format("%Y-%m-%d %H:%M")
        ),
        _ => "(none)".to_string(),
    }
}

fn render_plain(user_id: &str, sorted: &[&Event]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Event Summary for User {}\n", user_id));
    out.push_str(&format!("Date range: {}\n", date_range(sorted)));
    out.push_str(&format!("Total events: {}\n", sorted.len()));

    for event_type in EventType::ALL {
        let group = of_type(sorted, event_type);
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{} ({}):\n", event_type, group.len()));
        for event in group {
            out.push_str(&format!("  {}\n", listing_line(event)));
        }
    }

    out
}

/// Minimal HTML escaping for untrusted event fields
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn render_html(user_id: &str, sorted: &[&Event]) -> String {
    let mut rows = String::new();
    for event in sorted {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            event.timestamp.format("%Y-%m-%dT%H:%MZ"),
            escape(&event.event_id),
            event.event_type,
            escape(&event.subject),
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n\
         table {{ border-collapse: collapse; }}\n\
         th, td {{ border: 1px solid #999; padding: 4px 8px; text-align: left; }}\n\
         </style>\n</head>\n<body>\n\
         <h2>Event Summary for User {}</h2>\n\
         <p>Total events: {}</p>\n\
         <table>\n<tr><th>Timestamp</th><th>Event ID</th><th>Type</th><th>Subject</th></tr>\n\
         {}</table>\n</body>\n</html>\n",
        escape(user_id),
        sorted.len(),
        rows,
    )
}

fn render_mime(user_id: &str, sorted: &[&Event], boundary: &str) -> String {
    let mut out = String::new();

    // Part 1: plain-text summary
    out.push_str(&format!("--{}\r\n", boundary));
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Disposition: inline\r\n\r\n");
    out.push_str(&render_plain(user_id, sorted).replace('\n', "\r\n"));
    out.push_str("\r\n");

    // Parts 2..N: one attachment per populated event type
    for event_type in EventType::ALL {
        let group = of_type(sorted, event_type);
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        out.push_str(&format!(
            "Content-Disposition: inline; filename=\"{}_events.txt\"\r\n\r\n",
            event_type
        ));
        for event in group {
            out.push_str(&listing_line(event));
            out.push_str("\r\n");
        }
    }

    out.push_str(&format!("--{}--\r\n", boundary));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event_at(id: &str, secs: i64, event_type: EventType, subject: &str) -> Event {
        Event {
            event_id: id.to_string(),
            user_id: "u1".to_string(),
            event_type,
            message: "a longer message body that describes what happened in detail".to_string(),
            sender: "svc@example.com".to_string(),
            subject: subject.to_string(),
            timestamp: Utc.timestamp_opt(1_714_557_600 + secs, 0).unwrap(), // 2024-05-01 10:00 UTC
            metadata: Default::default(),
        }
    }

    fn sample() -> Vec<Event> {
        vec![
            event_at("e2", 300, EventType::Alert, "Disk almost full"),
            event_at("e1", 0, EventType::Alert, "CPU high"),
            event_at("e3", 600, EventType::Info, "Deploy finished"),
        ]
    }

    #[test]
    fn test_plain_structure() {
        let rendered = render("u1", &sample(), AggregationMethod::Plain);

        assert_eq!(rendered.subject, "Event Summary for User u1");
        assert_eq!(rendered.content_type, "text/plain; charset=utf-8");
        assert!(rendered.body.starts_with("Event Summary for User u1\n"));
        assert!(rendered.body.contains("Total events: 3"));
        assert!(rendered.body.contains("Date range: 2024-05-01 10:00 to 2024-05-01 10:10 UTC"));
        assert!(rendered.body.contains("ALERT (2):"));
        assert!(rendered.body.contains("INFO (1):"));
        assert!(rendered.body.contains("10:00 - CPU high"));
        assert!(rendered.body.contains("10:05 - Disk almost full"));
    }

    #[test]
    fn test_plain_orders_within_type() {
        let rendered = render("u1", &sample(), AggregationMethod::Plain);
        let cpu = rendered.body.find("CPU high").unwrap();
        let disk = rendered.body.find("Disk almost full").unwrap();
        assert!(cpu < disk);
    }

    #[test]
    fn test_plain_excerpt_when_no_subject() {
        let events = vec![event_at("e1", 0, EventType::Info, "")];
        let rendered = render("u1", &events, AggregationMethod::Plain);
        assert!(rendered.body.contains("10:00 - a longer message body"));
    }

    #[test]
    fn test_plain_is_deterministic() {
        let events = sample();
        let a = render("u1", &events, AggregationMethod::Plain);
        let b = render("u1", &events, AggregationMethod::Plain);
        assert_eq!(a.body, b.body);
        assert_eq!(a.subject, b.subject);
    }

    #[test]
    fn test_plain_empty_input() {
        let rendered = render("u1", &[], AggregationMethod::Plain);
        assert!(rendered.body.contains("Total events: 0"));
        assert!(rendered.body.contains("Date range: (none)"));
    }

    #[test]
    fn test_html_table_and_determinism() {
        let events = sample();
        let rendered = render("u1", &events, AggregationMethod::Html);

        assert_eq!(rendered.content_type, "text/html; charset=utf-8");
        assert!(rendered.body.contains("<table>"));
        assert!(rendered.body.contains("<th>Timestamp</th><th>Event ID</th><th>Type</th><th>Subject</th>"));
        assert!(rendered.body.contains("2024-05-01T10:00Z"));

        let again = render("u1", &events, AggregationMethod::Html);
        assert_eq!(rendered.body, again.body);
    }

    #[test]
    fn test_html_escapes_event_fields() {
        let mut event = event_at("e1", 0, EventType::Info, "<script>alert('x')</script>");
        event.event_id = "id&<>".to_string();
        let rendered = render("u<1>", &[event], AggregationMethod::Html);

        assert!(!rendered.body.contains("<script>"));
        assert!(rendered.body.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(rendered.body.contains("id&amp;&lt;&gt;"));
        assert!(rendered.body.contains("Event Summary for User u&lt;1&gt;"));
    }

    #[test]
    fn test_html_empty_input_is_valid_document() {
        let rendered = render("u1", &[], AggregationMethod::Html);
        assert!(rendered.body.contains("<!DOCTYPE html>"));
        assert!(rendered.body.contains("Total events: 0"));
        assert!(rendered.body.contains("</html>"));
    }

    #[test]
    fn test_mime_parts_and_boundary() {
        let rendered = render("u1", &sample(), AggregationMethod::Mime);

        let boundary = rendered
            .content_type
            .split("boundary=\"")
            .nth(1)
            .and_then(|s| s.strip_suffix('"'))
            .unwrap()
            .to_string();

        assert!(rendered.content_type.starts_with("multipart/mixed"));
        // Summary part plus one part per populated type, then terminator
        assert_eq!(rendered.body.matches(&format!("--{}\r\n", boundary)).count(), 3);
        assert!(rendered.body.ends_with(&format!("--{}--\r\n", boundary)));
        assert!(rendered
            .body
            .contains("Content-Disposition: inline; filename=\"ALERT_events.txt\""));
        assert!(rendered
            .body
            .contains("Content-Disposition: inline; filename=\"INFO_events.txt\""));
    }

    #[test]
    fn test_mime_boundary_unique_per_call() {
        let events = sample();
        let a = render("u1", &events, AggregationMethod::Mime);
        let b = render("u1", &events, AggregationMethod::Mime);
        assert_ne!(a.content_type, b.content_type);
    }

    #[test]
    fn test_mime_empty_input() {
        let rendered = render("u1", &[], AggregationMethod::Mime);
        assert!(rendered.body.contains("Total events: 0"));
        assert!(rendered.body.contains("--"));
    }
}
