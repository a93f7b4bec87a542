//! HTML for the index page and the rate limit page.

use crate::date::{first_apod_date, format_date};
use crate::models::ApodResult;
use askama::Template;
use chrono::Local;
use tracing::error;

const RENDER_FAILED: &str = "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<title>Astronomy Picture of the Day</title></head>\
<body><p>The page could not be rendered.</p></body></html>";

#[derive(Template)]
#[template(path = "index.html")]
struct IndexPage<'a> {
    first_date: String,
    today: String,
    selected: String,
    error: Option<&'a str>,
    entry: Option<EntryView<'a>>,
}

#[derive(Template)]
#[template(path = "rate_limited.html")]
struct RateLimitedPage<'a> {
    message: &'a str,
}

/// What the template needs from one entry, with the media choice made up front.
struct EntryView<'a> {
    title: &'a str,
    date: Option<&'a str>,
    video_url: Option<&'a str>,
    image: Option<ImageLink<'a>>,
    media_link: Option<&'a str>,
    explanation: Option<&'a str>,
    copyright: Option<&'a str>,
}

struct ImageLink<'a> {
    src: &'a str,
    link: &'a str,
}

impl<'a> From<&'a ApodResult> for EntryView<'a> {
    fn from(apod: &'a ApodResult) -> Self {
        let (video_url, image, media_link) = if apod.is_video() {
            (apod.url.as_deref(), None, None)
        } else if apod.is_image() {
            let image = apod.display_url().map(|src| ImageLink {
                src,
                link: apod.remote_media_url().unwrap_or(src),
            });
            (None, image, None)
        } else {
            (None, None, apod.url.as_deref())
        };

        Self {
            title: apod.title.as_deref().unwrap_or("Untitled"),
            date: apod.date.as_deref(),
            video_url,
            image,
            media_link,
            explanation: apod.explanation.as_deref(),
            copyright: apod.copyright.as_deref(),
        }
    }
}

pub fn render_index(result: Option<&ApodResult>, error: Option<&str>) -> String {
    let today = format_date(Local::now().date_naive());
    let selected = result
        .and_then(|r| r.date.clone())
        .unwrap_or_else(|| today.clone());

    let page = IndexPage {
        first_date: format_date(first_apod_date()),
        today,
        selected,
        error,
        entry: result.map(EntryView::from),
    };
    render(&page)
}

pub fn render_rate_limited(message: &str) -> String {
    render(&RateLimitedPage { message })
}

fn render(page: &impl Template) -> String {
    page.render().unwrap_or_else(|e| {
        error!("Failed to render page: {}", e);
        RENDER_FAILED.to_string()
    })
}
