use feed_rs::model::{Entry, FeedType};

use super::types::{FeedDocument, FeedFormat, FeedItem};

#[derive(Debug, thiserror::Error)]
pub enum FeedParseError {
    #[error("feed payload is empty")]
    EmptyPayload,
    #[error("rss parse error: {0}")]
    Rss(#[from] rss::Error),
    #[error("unsupported feed payload: {0}")]
    Unsupported(#[from] feed_rs::parser::ParseFeedError),
}

/// Parses a raw payload into a [`FeedDocument`] and unescapes its text fields.
///
/// JSON Feed payloads go to `feed-rs`. Otherwise RSS is read first, and
/// well-formed XML with a non-RSS root (Atom, for instance) is handed to
/// `feed-rs`; malformed RSS is an error.
pub fn parse_feed_bytes(raw: &[u8]) -> Result<FeedDocument, FeedParseError> {
    let trimmed = trim_leading_ascii_whitespace(raw);
    if trimmed.is_empty() {
        return Err(FeedParseError::EmptyPayload);
    }

    let mut document = if trimmed.starts_with(b"{") {
        parse_generic_feed(trimmed)?
    } else {
        match rss::Channel::read_from(trimmed) {
            Ok(channel) => document_from_channel(&channel),
            Err(rss::Error::InvalidStartTag) => parse_generic_feed(trimmed)?,
            Err(error) => return Err(error.into()),
        }
    };
    document.unescape_html();
    Ok(document)
}

fn document_from_channel(channel: &rss::Channel) -> FeedDocument {
    let items = channel
        .items()
        .iter()
        .map(|item| FeedItem {
            title: item.title().unwrap_or_default().to_string(),
            link: item.link().unwrap_or_default().trim().to_string(),
            description: item.description().map(ToString::to_string),
            pub_date: item.pub_date().unwrap_or_default().to_string(),
        })
        .collect();

    FeedDocument {
        format: FeedFormat::Rss,
        title: channel.title().to_string(),
        description: channel.description().to_string(),
        items,
    }
}

fn parse_generic_feed(raw: &[u8]) -> Result<FeedDocument, FeedParseError> {
    let feed = feed_rs::parser::parse(raw)?;
    let format = match feed.feed_type {
        FeedType::Atom => FeedFormat::Atom,
        FeedType::JSON => FeedFormat::Json,
        FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => FeedFormat::Rss,
    };
    let title = feed
        .title
        .as_ref()
        .map(|text| text.content.clone())
        .unwrap_or_default();
    let description = feed
        .description
        .as_ref()
        .map(|text| text.content.clone())
        .unwrap_or_default();
    let items = feed.entries.iter().map(item_from_entry).collect();

    Ok(FeedDocument {
        format,
        title,
        description,
        items,
    })
}

fn item_from_entry(entry: &Entry) -> FeedItem {
    let title = entry
        .title
        .as_ref()
        .map(|text| text.content.clone())
        .unwrap_or_default();
    let link = entry
        .links
        .first()
        .map(|entry_link| entry_link.href.trim().to_string())
        .unwrap_or_default();
    let description = entry
        .summary
        .as_ref()
        .map(|text| text.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|content| content.body.clone()));
    // feed-rs has already parsed the date; RFC 3339 round-trips through the normalizer.
    let pub_date = entry
        .published
        .or(entry.updated)
        .map(|timestamp| timestamp.to_rfc3339())
        .unwrap_or_default();

    FeedItem {
        title,
        link,
        description,
        pub_date,
    }
}

fn trim_leading_ascii_whitespace(raw: &[u8]) -> &[u8] {
    let mut index = 0;
    while index < raw.len() && raw[index].is_ascii_whitespace() {
        index += 1;
    }
    &raw[index..]
}
