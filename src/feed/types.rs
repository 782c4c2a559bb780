use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
    Json,
}

/// A single entry of a fetched feed, before date normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    /// Publish date exactly as it appeared in the payload. Empty when absent.
    pub pub_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedDocument {
    pub format: FeedFormat,
    pub title: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

impl FeedDocument {
    /// Decodes HTML entities left in channel and item text after XML decoding.
    pub fn unescape_html(&mut self) {
        unescape_in_place(&mut self.title);
        unescape_in_place(&mut self.description);

        for item in &mut self.items {
            unescape_in_place(&mut item.title);
            if let Some(description) = item.description.as_mut() {
                unescape_in_place(description);
            }
        }
    }
}

fn unescape_in_place(text: &mut String) {
    if !text.contains('&') {
        return;
    }
    let decoded = html_escape::decode_html_entities(text.as_str()).into_owned();
    *text = decoded;
}
