//! RSS 2.0 feed announcing new titles.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use scriptora_core::{Book, Settings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedChannel {
    pub title: String,
    /// Site root without a trailing slash; item links hang off it.
    pub link: String,
    pub description: String,
}

impl FeedChannel {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut settings = settings.clone();
        settings.normalize();
        Self {
            description: format!("New books on {}", settings.feed_title),
            title: settings.feed_title,
            link: settings.site_url,
        }
    }

    pub fn book_link(&self, book: &Book) -> String {
        format!("{}/book/{}", self.link, book.id)
    }
}

/// Newest books first, at most `limit` items when given.
pub fn render_rss(
    channel: &FeedChannel,
    books: &[Book],
    limit: Option<usize>,
) -> anyhow::Result<String> {
    let mut items: Vec<&Book> = books.iter().collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("rss").with_attributes([("version", "2.0")]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", &channel.title)?;
    text_element(&mut writer, "link", &channel.link)?;
    text_element(&mut writer, "description", &channel.description)?;
    if let Some(newest) = items.first().and_then(|book| rfc2822(book.created_at)) {
        text_element(&mut writer, "lastBuildDate", &newest)?;
    }

    for book in items {
        let link = channel.book_link(book);
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &book.title)?;
        text_element(&mut writer, "link", &link)?;
        writer.write_event(Event::Start(
            BytesStart::new("guid").with_attributes([("isPermaLink", "false")]),
        ))?;
        writer.write_event(Event::Text(BytesText::new(&book.id)))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;
        text_element(&mut writer, "description", &book.synopsis)?;
        text_element(&mut writer, "author", &book.author)?;
        if !book.genre.is_empty() {
            text_element(&mut writer, "category", &book.genre)?;
        }
        if let Some(date) = rfc2822(book.created_at) {
            text_element(&mut writer, "pubDate", &date)?;
        }
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(String::from_utf8(bytes)?)
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> anyhow::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn rfc2822(unix_millis: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(unix_millis).map(|date| date.to_rfc2822())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, title: &str, created_at: i64) -> Book {
        Book {
            id: id.to_string(),
            title: title.to_string(),
            author: "Ada North".to_string(),
            genre: "Fantasy".to_string(),
            synopsis: "Swords <and> sorcery".to_string(),
            cover_image: String::new(),
            total_chapters: 1,
            created_at,
            views: 0,
        }
    }

    fn channel() -> FeedChannel {
        FeedChannel {
            title: "Scriptora".to_string(),
            link: "https://books.example".to_string(),
            description: "New books".to_string(),
        }
    }

    #[test]
    fn channel_from_settings_normalizes() {
        let settings = Settings {
            site_url: "https://books.example/".to_string(),
            feed_title: "Shelf".to_string(),
            ..Settings::default()
        };
        let channel = FeedChannel::from_settings(&settings);
        assert_eq!(channel.link, "https://books.example");
        assert_eq!(channel.title, "Shelf");
        assert_eq!(channel.book_link(&book("b1", "T", 0)), "https://books.example/book/b1");
    }

    #[test]
    fn items_are_newest_first_and_escaped() -> anyhow::Result<()> {
        let books = vec![
            book("old", "Dune & Sons", 1_000),
            book("new", "Deep Field", 2_000_000),
        ];
        let xml = render_rss(&channel(), &books, None)?;

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<rss version=\"2.0\">"));
        assert!(xml.contains("<title>Dune &amp; Sons</title>"));
        assert!(xml.contains("Swords &lt;and&gt; sorcery"));
        assert!(xml.contains("<link>https://books.example/book/new</link>"));
        assert!(xml.contains("<category>Fantasy</category>"));

        let new_pos = xml.find("Deep Field").unwrap();
        let old_pos = xml.find("Dune &amp; Sons").unwrap();
        assert!(new_pos < old_pos);
        Ok(())
    }

    #[test]
    fn pub_date_is_rfc2822() -> anyhow::Result<()> {
        let xml = render_rss(&channel(), &[book("b", "T", 0)], None)?;
        assert!(xml.contains("<pubDate>Thu, "));
        assert!(xml.contains("Jan 1970 00:00:00 +0000</pubDate>"));
        Ok(())
    }

    #[test]
    fn limit_truncates_items() -> anyhow::Result<()> {
        let books: Vec<Book> = (0..5).map(|i| book(&format!("b{i}"), "T", i)).collect();
        let xml = render_rss(&channel(), &books, Some(2))?;
        assert_eq!(xml.matches("<item>").count(), 2);
        assert!(xml.contains("b4"));
        assert!(!xml.contains("b0"));
        Ok(())
    }

    #[test]
    fn empty_catalog_still_renders_channel() -> anyhow::Result<()> {
        let xml = render_rss(&channel(), &[], None)?;
        assert!(xml.contains("<channel>"));
        assert!(!xml.contains("<item>"));
        assert!(!xml.contains("lastBuildDate"));
        Ok(())
    }
}
