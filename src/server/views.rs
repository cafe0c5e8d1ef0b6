//! Server-rendered dashboard page. Expand/collapse uses native `<details>`.

use std::fmt::Write;

use crate::catalog::{CatalogTitle, CatalogUnit};
use crate::classify::TypeCounts;
use crate::paths::UnitKind;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;background:#fafafa;color:#222}\
.cards{display:flex;gap:1rem;margin-bottom:2rem}\
.card{background:#fff;border:1px solid #ddd;border-radius:8px;padding:1rem 1.5rem;min-width:10rem}\
.card b{display:block;font-size:2rem}\
details{background:#fff;border:1px solid #ddd;border-radius:8px;margin:.5rem 0;padding:.5rem 1rem}\
details details{border-color:#eee}\
summary{cursor:pointer;font-weight:600}\
img.cover{max-height:160px}img.banner{max-width:100%;max-height:120px}img.preview{max-height:100px}\
.genre{display:inline-block;background:#eef;border-radius:4px;padding:0 .4rem;margin-right:.3rem}";

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

fn render_image(out: &mut String, class: &str, url: &str, alt: &str) {
    if url.is_empty() {
        return;
    }
    let _ = write!(
        out,
        "<img class=\"{}\" src=\"{}\" alt=\"{}\" loading=\"lazy\">",
        class,
        escape_html(url),
        escape_html(alt)
    );
}

fn render_unit(out: &mut String, unit: &CatalogUnit, kind: UnitKind) {
    let _ = write!(
        out,
        "<details><summary>{} {}: {}</summary>",
        kind.label(),
        unit.record.number,
        escape_html(&unit.record.title)
    );
    render_image(out, "preview", &unit.record.preview_image, &unit.record.title);
    let _ = write!(out, "<p>{} images</p></details>", unit.record.images.len());
}

fn render_title(out: &mut String, title: &CatalogTitle, kind: UnitKind) {
    let record = &title.record;
    let _ = write!(
        out,
        "<details><summary>{}</summary>",
        escape_html(title.display_title())
    );
    render_image(out, "cover", &record.cover_image, "cover");

    let _ = write!(out, "<p>Author: {}</p><p>", escape_html(&record.author));
    for genre in &record.genres {
        let _ = write!(out, "<span class=\"genre\">{}</span>", escape_html(genre));
    }
    out.push_str("</p>");
    render_image(out, "banner", &record.banner_image, "banner");

    if title.units.is_empty() {
        let _ = write!(out, "<p>No {} yet</p>", kind.collection());
    }
    for unit in &title.units {
        render_unit(out, unit, kind);
    }
    out.push_str("</details>");
}

/// Full dashboard page: stat cards followed by the collapsible catalog tree
pub fn render_dashboard(counts: &TypeCounts, catalog: &[CatalogTitle], kind: UnitKind) -> String {
    let mut out = String::with_capacity(4096);
    let _ = write!(
        out,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Comicdesk</title><style>{}</style></head><body>",
        STYLE
    );
    out.push_str("<h1>Dashboard</h1><div class=\"cards\">");
    let _ = write!(out, "<div class=\"card\"><b>{}</b>Comics</div>", counts.comics);
    let _ = write!(out, "<div class=\"card\"><b>{}</b>Webnovels</div>", counts.webnovels);
    out.push_str("</div><h2>Catalog</h2>");

    if catalog.is_empty() {
        out.push_str("<p>No titles yet.</p>");
    }
    for title in catalog {
        render_title(&mut out, title, kind);
    }

    out.push_str("</body></html>");
    out
}
