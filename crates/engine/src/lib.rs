//! Text rendering: chapter markup and the RSS feed.

pub mod feed;
pub mod markdown;

pub use feed::{FeedChannel, render_rss};
pub use markdown::{Emphasis, Segment, segments, to_html};
