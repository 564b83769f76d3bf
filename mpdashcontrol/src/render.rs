//! HTML rendering of dashboard pages.
//!
//! Every page carries the chrome: transport buttons, the search box and the navigation
//! bar. Buttons are plain forms posting a hidden `data` field holding JSON to the API.

use htmlescape::encode_minimal;
use serde_json::{Value, json};

use crate::model::{PlayState, PlaybackOption, Track};
use crate::resolver::{Facet, Shape, encode_path};
use crate::views::{Page, PageBody, QueueItem, StatusPanel, TrackItem, MIN_SEARCH_LEN};

const VOLUME_STEPS: [i32; 6] = [-10, -5, -1, 1, 5, 10];

/// Page header and navigation, parametrised by the mount prefix.
pub struct Chrome<'a> {
    pub prefix: &'a str,
    /// Playback state, `None` when the daemon could not be asked.
    pub state: Option<PlayState>,
}

impl Chrome<'_> {
    fn href(&self, segments: &[&str]) -> String {
        format!("{}{}", self.prefix, encode_path(segments, Shape::Collection))
    }

    fn api(&self, action: &str) -> String {
        format!("{}/api/{}", self.prefix, action)
    }

    fn open(&self, out: &mut String, title: &str) {
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset='UTF-8'>\n");
        out.push_str(
            "<meta name='viewport' content='width=device-width, initial-scale=1.0'>\n",
        );
        out.push_str(&format!("<title>{} - MPDash</title>\n", encode_minimal(title)));
        out.push_str(&format!(
            "<link rel='stylesheet' href='{}'>\n",
            encode_minimal(&format!("{}/assets/style.css", self.prefix))
        ));
        out.push_str(&format!(
            "<link rel='icon' href='{}'>\n",
            encode_minimal(&format!("{}/assets/favicon.svg", self.prefix))
        ));
        out.push_str("</head>\n<body>\n");

        out.push_str("<div class='transport'>\n");
        let toggle = if self.state == Some(PlayState::Play) {
            "Pause"
        } else {
            "Play"
        };
        out.push_str(&form_button(&self.api("pause"), &json!({}), toggle));
        out.push_str(&form_button(&self.api("previous"), &json!({}), "Prev"));
        out.push_str(&form_button(&self.api("next"), &json!({}), "Next"));
        out.push_str(&format!(
            "<form action='{}'><input name='s' minlength='{}'/> <input type='submit' value='Search' /></form>\n",
            encode_minimal(&format!("{}/search", self.prefix)),
            MIN_SEARCH_LEN
        ));
        out.push_str("</div>\n");

        let mut nav = vec![
            link(&format!("{}/status", self.prefix), "Status"),
            link(&format!("{}#current", self.href(&["queue"])), "Queue"),
        ];
        for facet in [Facet::AlbumArtists, Facet::Artists] {
            nav.push(link(&self.href(&[facet.segment()]), facet.label()));
        }
        nav.push(link(&self.href(&["albums"]), "Albums"));
        for facet in [Facet::Genres, Facet::Dates, Facet::Labels] {
            nav.push(link(&self.href(&[facet.segment()]), facet.label()));
        }
        nav.push(link(&self.href(&["tracks"]), "Tracks"));
        nav.push(link(&self.href(&["playlists"]), "Playlists"));
        out.push_str(&format!("<nav>{}</nav>\n", nav.join(" | ")));
    }

    fn close(&self, out: &mut String) {
        out.push_str("</body>\n</html>\n");
    }

    /// Full HTML document for a page.
    pub fn page(&self, page: &Page) -> String {
        let mut out = String::new();
        self.open(&mut out, &page.title);

        if page.breadcrumbs.len() > 1 {
            let crumbs: Vec<String> = page
                .breadcrumbs
                .iter()
                .map(|c| match &c.href {
                    Some(href) => link(href, &c.label),
                    None => encode_minimal(&c.label),
                })
                .collect();
            out.push_str(&format!("<h1>{}</h1>\n", crumbs.join(" / ")));
        } else {
            out.push_str(&format!("<h1>{}</h1>\n", encode_minimal(&page.title)));
        }

        if let Some(selection) = &page.selection {
            let data = serde_json::to_value(selection).unwrap_or(Value::Null);
            out.push_str("<p class='selection'>\n");
            out.push_str(&form_button(&self.api("insert"), &data, "Add after current"));
            out.push_str(&form_button(&self.api("append"), &data, "Append to queue"));
            out.push_str("</p>\n");
        }

        match &page.body {
            PageBody::Links(links) => {
                out.push_str("<ul>\n");
                for l in links {
                    out.push_str(&format!("<li>{}</li>\n", link(&l.href, &l.label)));
                }
                out.push_str("</ul>\n");
            }
            PageBody::Tracks { ordered, tracks } => self.tracks(&mut out, *ordered, tracks),
            PageBody::Queue(items) => self.queue(&mut out, items),
            PageBody::Properties(props) => {
                out.push_str("<table class='properties'>\n");
                for p in props {
                    let value = match &p.href {
                        Some(href) => link(href, &p.value),
                        None => encode_minimal(&p.value),
                    };
                    out.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td></tr>\n",
                        encode_minimal(&p.key),
                        value
                    ));
                }
                out.push_str("</table>\n");
            }
            PageBody::Status(panel) => self.status(&mut out, panel),
            PageBody::Message(message) => {
                out.push_str(&format!("<p>{}</p>\n", encode_minimal(message)));
            }
        }

        self.close(&mut out);
        out
    }

    /// 404 page, chrome included.
    pub fn not_found(&self, path: &str) -> String {
        self.message("Not Found", &format!("Unrecognised request: {}", path))
    }

    /// Page with a title and a single paragraph.
    pub fn message(&self, title: &str, message: &str) -> String {
        let mut out = String::new();
        self.open(&mut out, title);
        out.push_str(&format!(
            "<h1>{}</h1>\n<p>{}</p>\n",
            encode_minimal(title),
            encode_minimal(message)
        ));
        self.close(&mut out);
        out
    }

    fn tracks(&self, out: &mut String, ordered: bool, tracks: &[TrackItem]) {
        let list = if ordered { "ol" } else { "ul" };
        out.push_str(&format!("<{}>\n", list));
        for item in tracks {
            let value = item
                .track
                .ordinal()
                .filter(|_| ordered)
                .map(|n| format!(" value='{}'", n))
                .unwrap_or_default();
            out.push_str(&format!(
                "<li{}>{}<br/>{}</li>\n",
                value,
                title_link(&item.track, item.href.as_deref()),
                encode_minimal(&subtitle(&item.track))
            ));
        }
        out.push_str(&format!("</{}>\n", list));
    }

    fn queue(&self, out: &mut String, items: &[QueueItem]) {
        out.push_str("<div class='queue-actions'>\n");
        out.push_str(&form_button(&self.api("clear"), &json!({}), "Clear queue"));
        out.push_str(&form_button(&self.api("shuffle"), &json!({}), "Shuffle"));
        out.push_str("</div>\n<ol start='0'>\n");
        for item in items {
            let entry = &item.entry;
            let id = if entry.current.is_some() {
                " id='current'"
            } else {
                ""
            };
            out.push_str(&format!(
                "<li{}>{} {} {}<br/>{}</li>\n",
                id,
                title_link(&entry.track, item.href.as_deref()),
                form_button(&self.api("play"), &json!({ "id": entry.pos }), "Play now"),
                form_button(&self.api("remove"), &json!({ "ids": [entry.id] }), "Remove"),
                encode_minimal(&subtitle(&entry.track))
            ));
        }
        out.push_str("</ol>\n");
    }

    fn status(&self, out: &mut String, panel: &StatusPanel) {
        let status = &panel.status;
        out.push_str("<table class='status'>\n");
        out.push_str(&format!(
            "<tr><td>State:</td><td>{}</td><td></td></tr>\n",
            status.state.as_str()
        ));

        if let Some(current) = &panel.current {
            out.push_str(&format!(
                "<tr><td>Current:</td><td>{}</td><td>{}</td></tr>\n",
                encode_minimal(current.display_title()),
                encode_minimal(&subtitle(current))
            ));
        }

        let volume = status
            .volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let buttons: String = VOLUME_STEPS
            .iter()
            .map(|step| {
                form_button(
                    &self.api("volume"),
                    &json!({ "volume": step }),
                    &format!("{:+}", step),
                )
            })
            .collect();
        out.push_str(&format!(
            "<tr><td>Volume:</td><td>{}</td><td>{}</td></tr>\n",
            volume, buttons
        ));

        for option in [
            PlaybackOption::Repeat,
            PlaybackOption::Random,
            PlaybackOption::Single,
            PlaybackOption::Consume,
        ] {
            let enabled = status.option(option);
            let mut name = option.as_str().to_string();
            if let Some(first) = name.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            out.push_str(&format!(
                "<tr><td>{} mode:</td><td>{}</td><td>{}</td></tr>\n",
                name,
                if enabled { "enabled" } else { "disabled" },
                form_button(
                    &self.api(option.as_str()),
                    &json!({ "enabled": if enabled { "0" } else { "1" } }),
                    if enabled { "disable" } else { "enable" },
                )
            ));
        }

        for output in &panel.outputs {
            let (action, label) = if output.outputenabled {
                ("disableoutput", "disable")
            } else {
                ("enableoutput", "enable")
            };
            out.push_str(&format!(
                "<tr><td>Output:</td><td>{} ({})</td><td>{}</td></tr>\n",
                encode_minimal(&output.outputname),
                if output.outputenabled { "enabled" } else { "disabled" },
                form_button(&self.api(action), &json!({ "outputid": output.outputid }), label)
            ));
        }

        let updating = status
            .updating_db
            .map(|job| format!("updating (job {})", job))
            .unwrap_or_default();
        out.push_str(&format!(
            "<tr><td>Database:</td><td>{}</td><td>{}</td></tr>\n",
            updating,
            form_button(&self.api("update"), &json!({}), "Update")
        ));
        out.push_str("</table>\n");
    }
}

fn link(href: &str, text: &str) -> String {
    format!(
        "<a href='{}'>{}</a>",
        encode_minimal(href),
        encode_minimal(text)
    )
}

fn title_link(track: &Track, href: Option<&str>) -> String {
    match href {
        Some(href) => link(href, track.display_title()),
        None => encode_minimal(track.display_title()),
    }
}

fn subtitle(track: &Track) -> String {
    let artist = track
        .albumartist
        .as_deref()
        .or(track.artist.as_deref())
        .unwrap_or_default();
    let album = track.album.as_deref().unwrap_or_default();
    match (artist.is_empty(), album.is_empty()) {
        (false, false) => format!("{} - {}", artist, album),
        (false, true) => artist.to_string(),
        (true, false) => album.to_string(),
        (true, true) => String::new(),
    }
}

/// A one-button form posting `data` as JSON in the `data` field.
pub fn form_button(action: &str, data: &Value, label: &str) -> String {
    format!(
        "<form method='post' action='{}'><input type='hidden' name='data' value='{}' /><input type='submit' value='{}' /></form>\n",
        encode_minimal(action),
        encode_minimal(&data.to_string()),
        encode_minimal(label)
    )
}
